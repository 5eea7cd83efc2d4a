use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub use sqlx::PgPool;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Hard ceiling for a single backoff sleep.
const MAX_BACKOFF_MS: u64 = 30_000;

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub database_url: Option<String>,

    pub min_connections: u32,            // 0
    pub max_connections: u32,            // 20
    pub connect_timeout_secs: u64,       // 5
    pub idle_timeout_secs: Option<u64>,  // None
    pub max_lifetime_secs: Option<u64>,  // None
    pub acquire_timeout_secs: u64,       // 5

    pub retry_max_attempts: u32,  // 5
    pub retry_base_backoff_ms: u64, // 200

    /// true: `init` fails when the DB cannot be reached after retries.
    /// false: `init` logs and continues; the first `get_pool` retries.
    pub eager_init: bool,

    /// Run embedded migrations after the first successful connect.
    pub migrate_on_start: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            min_connections: 0,
            max_connections: 20,
            connect_timeout_secs: 5,
            idle_timeout_secs: None,
            max_lifetime_secs: None,
            acquire_timeout_secs: 5,
            retry_max_attempts: 5,
            retry_base_backoff_ms: 200,
            eager_init: false,
            migrate_on_start: false,
        }
    }
}

impl DbConfig {
    /// - DATABASE_URL (optional)
    /// - DB_MIN_CONNECTIONS (default 0)
    /// - DB_MAX_CONNECTIONS (default 20)
    /// - DB_CONNECT_TIMEOUT_SECS (default 5)
    /// - DB_IDLE_TIMEOUT_SECS (optional)
    /// - DB_MAX_LIFETIME_SECS (optional)
    /// - DB_ACQUIRE_TIMEOUT_SECS (default 5)
    /// - DB_RETRY_MAX_ATTEMPTS (default 5)
    /// - DB_RETRY_BASE_BACKOFF_MS (default 200)
    /// - DB_EAGER_INIT (bool, default false)
    /// - DB_MIGRATE_ON_START (bool, default false)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; unparsable values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        Self {
            database_url: lookup("DATABASE_URL").filter(|s| !s.trim().is_empty()),
            min_connections: parse_or(&lookup, "DB_MIN_CONNECTIONS", d.min_connections),
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", d.max_connections),
            connect_timeout_secs: parse_or(&lookup, "DB_CONNECT_TIMEOUT_SECS", d.connect_timeout_secs),
            idle_timeout_secs: lookup("DB_IDLE_TIMEOUT_SECS").and_then(|s| s.trim().parse().ok()),
            max_lifetime_secs: lookup("DB_MAX_LIFETIME_SECS").and_then(|s| s.trim().parse().ok()),
            acquire_timeout_secs: parse_or(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", d.acquire_timeout_secs),
            retry_max_attempts: parse_or(&lookup, "DB_RETRY_MAX_ATTEMPTS", d.retry_max_attempts),
            retry_base_backoff_ms: parse_or(&lookup, "DB_RETRY_BASE_BACKOFF_MS", d.retry_base_backoff_ms),
            eager_init: lookup("DB_EAGER_INIT").map(|s| is_truthy(&s)).unwrap_or(d.eager_init),
            migrate_on_start: lookup("DB_MIGRATE_ON_START")
                .map(|s| is_truthy(&s))
                .unwrap_or(d.migrate_on_start),
        }
    }
}

pub struct Db {
    cfg: DbConfig,
    pool: OnceCell<PgPool>,
    migrated: OnceCell<()>,
}

impl Db {
    pub fn new(cfg: DbConfig) -> Self {
        Self {
            cfg,
            pool: OnceCell::new(),
            migrated: OnceCell::new(),
        }
    }

    /// - Eager mode: connect with retries and return error if unavailable.
    /// - Lazy mode: attempt connect with retries; on failure log and continue.
    pub async fn init(&self) -> Result<(), DbInitError> {
        match self.try_connect_with_retry().await {
            Ok(pool) => {
                let pool = self.pool.get_or_init(|| async { pool }).await;
                if self.cfg.migrate_on_start {
                    self.ensure_migrated(pool).await?;
                }
                Ok(())
            }
            Err(e) if self.cfg.eager_init => Err(e),
            Err(e) => {
                warn!(target: "tailor_db", "database not available at startup (lazy): {e}");
                Ok(())
            }
        }
    }

    /// Get the pool, connecting with retries on first use.
    /// Migrations, when enabled, run once after the first successful connect.
    pub async fn get_pool(&self) -> Result<&PgPool, DbInitError> {
        let pool = self
            .pool
            .get_or_try_init(|| async { self.try_connect_with_retry().await })
            .await?;

        if self.cfg.migrate_on_start {
            self.ensure_migrated(pool).await?;
        }

        Ok(pool)
    }

    /// Status probe with a short timeout so a degraded DB cannot hang the caller.
    pub async fn health_check(&self) -> HealthStatus {
        if self.cfg.database_url.is_none() {
            return HealthStatus::NoUrl;
        }
        let Some(pool) = self.pool.get() else {
            return HealthStatus::NotInitialized;
        };
        probe(pool).await
    }

    fn build_pool_options(&self) -> PgPoolOptions {
        let mut opts = PgPoolOptions::new()
            .min_connections(self.cfg.min_connections)
            .max_connections(self.cfg.max_connections)
            .acquire_timeout(Duration::from_secs(self.cfg.acquire_timeout_secs));

        if let Some(secs) = self.cfg.idle_timeout_secs {
            opts = opts.idle_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.cfg.max_lifetime_secs {
            opts = opts.max_lifetime(Duration::from_secs(secs));
        }
        opts
    }

    async fn try_connect_with_retry(&self) -> Result<PgPool, DbInitError> {
        let url = self
            .cfg
            .database_url
            .as_deref()
            .ok_or(DbInitError::MissingUrl)?;

        let max = self.cfg.retry_max_attempts.max(1);
        let connect_timeout_secs = self.cfg.connect_timeout_secs;

        let mut last_err = String::from("unknown error");
        for attempt in 1..=max {
            let connect_future = self.build_pool_options().connect(url);
            let result = if connect_timeout_secs > 0 {
                match tokio::time::timeout(Duration::from_secs(connect_timeout_secs), connect_future)
                    .await
                {
                    Ok(inner) => inner.map_err(|e| e.to_string()),
                    Err(_) => Err(format!(
                        "connect attempt timed out after {connect_timeout_secs}s"
                    )),
                }
            } else {
                connect_future.await.map_err(|e| e.to_string())
            };

            match result {
                Ok(pool) => {
                    debug!(target: "tailor_db", attempt, "connected to database");
                    return Ok(pool);
                }
                Err(msg) => {
                    last_err = msg;
                    if attempt >= max {
                        break;
                    }
                    let delay = compute_backoff_ms(self.cfg.retry_base_backoff_ms, attempt);
                    warn!(
                        target: "tailor_db",
                        "db connect attempt {attempt}/{max} failed: {last_err} ; retrying in {delay} ms"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }

        Err(DbInitError::Connect {
            attempts: max,
            last_error: last_err,
        })
    }

    async fn ensure_migrated(&self, pool: &PgPool) -> Result<(), DbInitError> {
        self.migrated
            .get_or_try_init(|| async {
                info!(target: "tailor_db", "running database migrations");
                MIGRATOR
                    .run(pool)
                    .await
                    .map_err(|e| DbInitError::Migrate(e.to_string()))
            })
            .await
            .map(|_| ())
    }
}

/// `SELECT 1` bounded by one second.
pub async fn probe(pool: &PgPool) -> HealthStatus {
    match tokio::time::timeout(Duration::from_secs(1), sqlx::query("SELECT 1").execute(pool)).await
    {
        Ok(Ok(_)) => HealthStatus::Ok,
        Ok(Err(e)) => HealthStatus::Error(e.to_string()),
        Err(_) => HealthStatus::Error("health check timed out".to_string()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DbInitError {
    #[error("DATABASE_URL is not set")]
    MissingUrl,

    #[error("failed to connect after {attempts} attempt(s): {last_error}")]
    Connect { attempts: u32, last_error: String },

    #[error("migrations failed: {0}")]
    Migrate(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    NoUrl,
    NotInitialized,
    Ok,
    Error(String),
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// "1", "true", "yes", "on" (any case) are true; anything else is false.
pub fn is_truthy(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Exponential backoff (base * 2^(attempt-1)), capped, plus up to base/2 jitter.
fn compute_backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    let capped = base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS);
    let jitter = fastrand::u64(0..(base_ms / 2 + 1));
    capped.saturating_add(jitter)
}
