#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tailor_index::tantivy::TantivyIndexEngine;
use tailor_index::{IndexDocument, IndexEngine, SearchPage};
use tailor_query::ScoringExpression;
use tailord::storage::{HistoryStore, MemoryHistoryStore, UserRecord};
use tailord::{PersonalizationConfig, RecordPolicy, Services};

/// Tantivy in memory, remembering every expression it was asked to run.
pub struct RecordingEngine {
    inner: TantivyIndexEngine,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<ScoringExpression>>,
    pub fail: AtomicBool,
    pub delay_ms: AtomicU64,
}

impl RecordingEngine {
    pub fn with_docs(docs: Vec<IndexDocument>) -> Self {
        let inner = TantivyIndexEngine::in_memory().expect("index");
        for d in docs {
            inner.add(d).expect("add");
        }
        inner.commit().expect("commit");
        inner.refresh().expect("refresh");
        Self {
            inner,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> ScoringExpression {
        self.seen
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("engine was never called")
    }
}

impl IndexEngine for RecordingEngine {
    fn engine_name(&self) -> &'static str {
        "recording"
    }

    fn add(&self, doc: IndexDocument) -> anyhow::Result<()> {
        self.inner.add(doc)
    }

    fn commit(&self) -> anyhow::Result<()> {
        self.inner.commit()
    }

    fn refresh(&self) -> anyhow::Result<()> {
        self.inner.refresh()
    }

    fn num_docs(&self) -> u64 {
        self.inner.num_docs()
    }

    fn search(
        &self,
        expr: &ScoringExpression,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<SearchPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(expr.clone());
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("index node 10.0.0.9 refused connection");
        }
        self.inner.search(expr, offset, limit)
    }
}

pub fn doc(id: &str, title: &str, body: &str, category: &str) -> IndexDocument {
    IndexDocument {
        id: id.into(),
        title: title.into(),
        body: body.into(),
        category: category.into(),
    }
}

pub fn corpus() -> Vec<IndexDocument> {
    vec![
        doc("n1", "Stock market rallies", "Chip makers lead the gains", "tech"),
        doc("n2", "Market day for farmers", "Fresh produce in town", "home"),
        doc("n3", "Transfer market heats up", "Clubs chase a striker", "sports"),
        doc("n4", "AI chips shortage", "Fabs are running at capacity", "tech"),
        doc("n5", "Derby recap", "A late winner at home", "sports"),
        doc("n6", "Garden planning", "Sow early, water often", "home"),
    ]
}

pub struct Fixture {
    pub store: Arc<MemoryHistoryStore>,
    pub engine: Arc<RecordingEngine>,
    pub services: Services,
}

pub fn fixture_with(policy: RecordPolicy, tweak: impl FnOnce(&mut PersonalizationConfig)) -> Fixture {
    let store = Arc::new(MemoryHistoryStore::new());
    let engine = Arc::new(RecordingEngine::with_docs(corpus()));
    let mut cfg = PersonalizationConfig {
        record_policy: policy,
        ..PersonalizationConfig::default()
    };
    tweak(&mut cfg);
    let services = Services::new(store.clone(), engine.clone(), cfg);
    Fixture {
        store,
        engine,
        services,
    }
}

pub fn fixture(policy: RecordPolicy) -> Fixture {
    fixture_with(policy, |_| {})
}

/// User with clicks {sports: 3, tech: 1} and searches
/// "ai chips", "ai chips", "stock market" (oldest first).
pub async fn seeded_user(store: &MemoryHistoryStore, handle: &str) -> UserRecord {
    let user = store.create_user(handle, 0).await.expect("create user");
    for (i, q) in ["ai chips", "ai chips", "stock market"].iter().enumerate() {
        store
            .append_search(user.id, q, 1_000 + i as i64)
            .await
            .expect("append");
    }
    for _ in 0..3 {
        store.increment_click(user.id, "sports").await.expect("click");
    }
    store.increment_click(user.id, "tech").await.expect("click");
    user
}
