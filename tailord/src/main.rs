use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenv::dotenv;
use tailor_api::status::StatusCode;
use tailor_db::{Db, DbConfig};
use tailor_index::tantivy::TantivyIndexEngine;
use tailor_index::{make_engine, IndexEngine};
use tailord::config::{HistoryBackend, PersonalizationConfig, ServerConfig};
use tailord::proto::http_like::{make_empty_response, read_request};
use tailord::storage::{HistoryStore, MemoryHistoryStore, PgHistoryStore};
use tailord::{router, Services};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server = ServerConfig::from_env().context("invalid server configuration")?;
    let personalization =
        PersonalizationConfig::from_env().context("invalid personalization configuration")?;

    let store = open_store(server.history_backend).await?;
    let engine = open_index(&server)?;
    info!(
        target: "tailord",
        store = store.backend(),
        index = engine.engine_name(),
        docs = engine.num_docs(),
        policy = ?personalization.record_policy,
        "services ready"
    );

    let services = Arc::new(Services::new(store, engine, personalization));
    for handle in &server.seed_users {
        services
            .ensure_user(handle)
            .await
            .with_context(|| format!("seeding user {handle:?}"))?;
    }

    let listener = TcpListener::bind(&server.addr)
        .await
        .with_context(|| format!("bind {}", server.addr))?;
    info!(target: "tailord", addr = %server.addr, "listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let services = Arc::clone(&services);
        tokio::spawn(async move {
            if let Err(err) = handle_conn(stream, peer, &services).await {
                warn!(target: "tailord", %peer, error = %err, "connection error");
            }
        });
    }
}

async fn open_store(backend: HistoryBackend) -> Result<Arc<dyn HistoryStore>> {
    match backend {
        HistoryBackend::Memory => {
            warn!(target: "tailord", "history kept in memory; it is lost on restart");
            Ok(Arc::new(MemoryHistoryStore::new()))
        }
        HistoryBackend::Postgres => {
            let cfg = DbConfig::from_env();
            let url = if cfg.database_url.is_some() { "<set>" } else { "<missing>" };
            info!(target: "tailord", url, "initializing database pool");
            let db = Db::new(cfg);
            db.init().await.context("database init failed")?;
            let pool = db
                .get_pool()
                .await
                .context("database pool acquisition failed")?
                .clone();
            Ok(Arc::new(PgHistoryStore::new(pool)))
        }
    }
}

fn open_index(server: &ServerConfig) -> Result<Arc<dyn IndexEngine>> {
    if server.index_engine == "tantivy" {
        if let Some(dir) = &server.index_dir {
            let engine = TantivyIndexEngine::open_or_create_in_dir(dir)
                .with_context(|| format!("open tantivy index at {dir}"))?;
            info!(target: "tailord", dir = %dir, "using on-disk tantivy index");
            return Ok(Arc::new(engine));
        }
    }
    let engine = make_engine(&server.index_engine)?;
    Ok(Arc::from(engine))
}

/// One request per connection.
async fn handle_conn(mut tcp: TcpStream, peer: SocketAddr, services: &Services) -> Result<()> {
    let req = match tokio::time::timeout(READ_TIMEOUT, read_request(&mut tcp)).await {
        Ok(Ok(req)) => req,
        Ok(Err(code)) => {
            tcp.write_all(&make_empty_response(code)).await?;
            return Ok(());
        }
        Err(_) => {
            warn!(target: "tailord", %peer, "request read timed out");
            tcp.write_all(&make_empty_response(StatusCode::BadRequest)).await?;
            return Ok(());
        }
    };
    let response = router::handle(req, services).await;
    tcp.write_all(&response.into_bytes()).await?;
    tcp.shutdown().await?;
    Ok(())
}
