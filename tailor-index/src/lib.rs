use anyhow::Result;
use tailor_query::ScoringExpression;

pub mod noop;
pub mod tantivy;

/// Document shape held by the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDocument {
    pub id: String,
    pub title: String,
    pub body: String,
    pub category: String,
}

/// One ranked hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub body: String,
    pub category: String,
    pub score: f32,
}

/// A window of hits plus the engine's count of all matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    pub total: u64,
}

/// Pluggable index/search engine abstraction.
/// Implementations must be thread-safe; near-real-time updates follow
/// commit/refresh semantics.
pub trait IndexEngine: Send + Sync {
    fn engine_name(&self) -> &'static str;

    /// Add a document, replacing any existing one with the same id.
    fn add(&self, doc: IndexDocument) -> Result<()>;

    /// Commit pending changes to make them durable.
    fn commit(&self) -> Result<()>;

    /// Refresh searchers to see new segments.
    fn refresh(&self) -> Result<()>;

    /// Number of documents visible to the current searcher.
    fn num_docs(&self) -> u64;

    /// Evaluate `expr` and return `limit` hits starting at `offset`.
    fn search(&self, expr: &ScoringExpression, offset: usize, limit: usize) -> Result<SearchPage>;
}

/// Select an engine implementation by name.
pub fn make_engine(name: &str) -> Result<Box<dyn IndexEngine>> {
    match name {
        "tantivy" => Ok(Box::new(tantivy::TantivyIndexEngine::in_memory()?)),
        "noop" => Ok(Box::new(noop::NoopIndexEngine::default())),
        other => Err(anyhow::anyhow!("unknown engine: {other}")),
    }
}
