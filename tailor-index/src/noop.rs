use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use tailor_query::ScoringExpression;

use crate::{IndexDocument, IndexEngine, SearchPage};

/// Accepts documents, never returns hits.
#[derive(Default)]
pub struct NoopIndexEngine {
    pub docs_indexed: AtomicU64,
    pub searches: AtomicU64,
}

impl IndexEngine for NoopIndexEngine {
    fn engine_name(&self) -> &'static str {
        "noop"
    }

    fn add(&self, _doc: IndexDocument) -> Result<()> {
        self.docs_indexed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        Ok(())
    }

    fn refresh(&self) -> Result<()> {
        Ok(())
    }

    fn num_docs(&self) -> u64 {
        0
    }

    fn search(&self, _expr: &ScoringExpression, _offset: usize, _limit: usize) -> Result<SearchPage> {
        self.searches.fetch_add(1, Ordering::Relaxed);
        Ok(SearchPage::default())
    }
}
