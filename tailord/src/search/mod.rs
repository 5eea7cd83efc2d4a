use std::sync::Arc;
use std::time::Duration;

use tailor_api::response::SearchResultItem;
use tailor_index::{IndexEngine, SearchHit};
use tailor_query::paging::{page_offset, total_pages};
use tailor_query::ScoringExpression;
use tracing::{debug, warn};

use crate::error::{ServiceError, ServiceResult};

/// One page of shaped results plus paging metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    pub items: Vec<SearchResultItem>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

/// Runs scoring expressions against the index under a deadline.
#[derive(Clone)]
pub struct SearchExecutor {
    engine: Arc<dyn IndexEngine>,
    timeout: Duration,
}

impl SearchExecutor {
    pub fn new(engine: Arc<dyn IndexEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    pub fn engine(&self) -> &Arc<dyn IndexEngine> {
        &self.engine
    }

    /// `page` is 1-based. Pages past the end come back empty.
    pub async fn execute(
        &self,
        expr: ScoringExpression,
        page: u32,
        page_size: u32,
    ) -> ServiceResult<ResultPage> {
        if page == 0 {
            return Err(ServiceError::Validation("page must be >= 1".into()));
        }
        if page_size == 0 {
            return Err(ServiceError::Validation("page size must be >= 1".into()));
        }
        let offset = page_offset(page, page_size)
            .ok_or_else(|| ServiceError::Validation(format!("page {page} is out of range")))?;
        let limit = page_size as usize;

        // Engines are synchronous; keep them off the async workers.
        let engine = Arc::clone(&self.engine);
        let task = tokio::task::spawn_blocking(move || engine.search(&expr, offset, limit));
        let found = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(found))) => found,
            Ok(Ok(Err(e))) => {
                warn!(target: "tailord", error = %e, "index search failed");
                return Err(ServiceError::Unavailable(format!("index: {e:#}")));
            }
            Ok(Err(join)) => {
                warn!(target: "tailord", error = %join, "index search task failed");
                return Err(ServiceError::Unavailable(format!("index task: {join}")));
            }
            Err(_) => {
                warn!(
                    target: "tailord",
                    timeout_ms = self.timeout.as_millis() as u64,
                    "index search timed out"
                );
                return Err(ServiceError::Unavailable("index timed out".into()));
            }
        };
        debug!(
            target: "tailord",
            engine = self.engine.engine_name(),
            offset,
            hits = found.hits.len(),
            total = found.total,
            "search executed"
        );

        Ok(ResultPage {
            items: found.hits.into_iter().map(to_item).collect(),
            total: found.total,
            page,
            page_size,
            total_pages: total_pages(found.total, page_size),
        })
    }
}

fn to_item(hit: SearchHit) -> SearchResultItem {
    SearchResultItem {
        id: hit.id,
        title: hit.title,
        body: hit.body,
        category: hit.category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tailor_index::tantivy::TantivyIndexEngine;
    use tailor_index::IndexDocument;
    use tailor_query::{compose, Fuzziness};

    fn engine_with(n: usize) -> Arc<dyn IndexEngine> {
        let engine = TantivyIndexEngine::in_memory().unwrap();
        for i in 0..n {
            engine
                .add(IndexDocument {
                    id: format!("doc-{i}"),
                    title: format!("market report {i}"),
                    body: "weekly numbers".into(),
                    category: "finance".into(),
                })
                .unwrap();
        }
        engine.commit().unwrap();
        engine.refresh().unwrap();
        Arc::new(engine)
    }

    fn market() -> ScoringExpression {
        compose("market", Fuzziness::Auto, &[], &[])
    }

    #[tokio::test]
    async fn pages_and_totals() {
        let exec = SearchExecutor::new(engine_with(7), Duration::from_secs(5));
        let first = exec.execute(market(), 1, 3).await.unwrap();
        assert_eq!(first.items.len(), 3);
        assert_eq!(first.total, 7);
        assert_eq!(first.total_pages, 3);

        let last = exec.execute(market(), 3, 3).await.unwrap();
        assert_eq!(last.items.len(), 1);

        let beyond = exec.execute(market(), 9, 3).await.unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 7);
        assert_eq!(beyond.page, 9);
    }

    #[tokio::test]
    async fn zero_page_is_validation() {
        let exec = SearchExecutor::new(engine_with(1), Duration::from_secs(5));
        assert!(matches!(
            exec.execute(market(), 0, 10).await,
            Err(ServiceError::Validation(_))
        ));
    }
}
