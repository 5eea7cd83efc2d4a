use std::sync::Arc;
use std::time::Duration;

use tailor_query::{rank_categories, rank_terms, Signal};
use tracing::debug;

use crate::storage::{bounded, HistoryStore, StoreResult, UserId};

/// Reduces raw history into ranked signal lists.
#[derive(Clone)]
pub struct BehaviorAggregator {
    store: Arc<dyn HistoryStore>,
    timeout: Duration,
}

impl BehaviorAggregator {
    pub fn new(store: Arc<dyn HistoryStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Most clicked categories, at most `limit`, count descending then name.
    pub async fn top_categories(&self, user_id: UserId, limit: usize) -> StoreResult<Vec<Signal>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let counters = bounded("click_counts", self.timeout, self.store.click_counts(user_id)).await?;
        let ranked = rank_categories(
            counters.into_iter().map(|c| (c.category, c.click_count)),
            Some(limit),
        );
        debug!(target: "tailord", user_id, categories = ranked.len(), "category signals");
        Ok(ranked)
    }

    /// Term frequencies over the `lookback` newest history entries.
    ///
    /// `exclude` drops one entry by id before the window is cut, so a search
    /// recorded ahead of its own ranking never counts toward itself.
    pub async fn top_search_terms(
        &self,
        user_id: UserId,
        lookback: usize,
        limit: usize,
        exclude: Option<i64>,
    ) -> StoreResult<Vec<Signal>> {
        if lookback == 0 || limit == 0 {
            return Ok(Vec::new());
        }
        let fetch = lookback.saturating_add(usize::from(exclude.is_some()));
        let entries = bounded(
            "list_searches",
            self.timeout,
            self.store.list_searches(user_id, 0, Some(fetch)),
        )
        .await?;
        let window: Vec<&str> = entries
            .iter()
            .filter(|e| Some(e.id) != exclude)
            .take(lookback)
            .map(|e| e.query.as_str())
            .collect();
        let ranked = rank_terms(window.iter().copied(), limit);
        debug!(
            target: "tailord",
            user_id,
            window = window.len(),
            terms = ranked.len(),
            "term signals"
        );
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryHistoryStore;

    async fn seeded() -> (Arc<MemoryHistoryStore>, UserId) {
        let store = Arc::new(MemoryHistoryStore::new());
        let u = store.create_user("ana", 0).await.unwrap();
        for (i, q) in ["ai chips", "ai chips", "stock market"].iter().enumerate() {
            store.append_search(u.id, q, i as i64 + 1).await.unwrap();
        }
        for _ in 0..3 {
            store.increment_click(u.id, "sports").await.unwrap();
        }
        store.increment_click(u.id, "tech").await.unwrap();
        (store, u.id)
    }

    #[tokio::test]
    async fn categories_ranked_and_limited() {
        let (store, uid) = seeded().await;
        let agg = BehaviorAggregator::new(store, Duration::from_secs(1));
        let top = agg.top_categories(uid, 3).await.unwrap();
        assert_eq!(top, vec![Signal::new("sports", 3), Signal::new("tech", 1)]);
        assert_eq!(agg.top_categories(uid, 1).await.unwrap().len(), 1);
        assert!(agg.top_categories(uid, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn terms_over_window() {
        let (store, uid) = seeded().await;
        let agg = BehaviorAggregator::new(store, Duration::from_secs(1));
        let terms = agg.top_search_terms(uid, 20, 5, None).await.unwrap();
        assert_eq!(
            terms,
            vec![
                Signal::new("ai", 2),
                Signal::new("chips", 2),
                Signal::new("market", 1),
                Signal::new("stock", 1),
            ]
        );
        // Only the newest entry: "stock market".
        let newest = agg.top_search_terms(uid, 1, 5, None).await.unwrap();
        assert_eq!(newest, vec![Signal::new("market", 1), Signal::new("stock", 1)]);
    }

    #[tokio::test]
    async fn excluded_entry_does_not_shrink_window() {
        let (store, uid) = seeded().await;
        let fresh = store.append_search(uid, "market", 10).await.unwrap();
        let agg = BehaviorAggregator::new(store, Duration::from_secs(1));
        let terms = agg.top_search_terms(uid, 3, 5, Some(fresh.id)).await.unwrap();
        assert!(terms.contains(&Signal::new("market", 1)));
        assert!(terms.contains(&Signal::new("ai", 2)));
    }

    #[tokio::test]
    async fn no_history_is_empty_not_error() {
        let store = Arc::new(MemoryHistoryStore::new());
        let u = store.create_user("new", 0).await.unwrap();
        let agg = BehaviorAggregator::new(store, Duration::from_secs(1));
        assert!(agg.top_categories(u.id, 3).await.unwrap().is_empty());
        assert!(agg.top_search_terms(u.id, 20, 5, None).await.unwrap().is_empty());
    }
}
