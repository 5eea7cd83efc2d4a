use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::storage::{bounded, ClearedHistory, HistoryEntry, HistoryStore, StoreResult, UserId};

/// Milliseconds since the Unix epoch; 0 if the clock is before it.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Writes the signals that shape later searches.
#[derive(Clone)]
pub struct FeedbackRecorder {
    store: Arc<dyn HistoryStore>,
    timeout: Duration,
}

impl FeedbackRecorder {
    pub fn new(store: Arc<dyn HistoryStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn record_search(&self, user_id: UserId, query: &str) -> StoreResult<HistoryEntry> {
        let entry = bounded(
            "append_search",
            self.timeout,
            self.store.append_search(user_id, query, now_millis()),
        )
        .await?;
        debug!(target: "tailord", user_id, entry_id = entry.id, "search recorded");
        Ok(entry)
    }

    /// One click, one increment. Returns the new count.
    pub async fn record_click(&self, user_id: UserId, category: &str) -> StoreResult<u64> {
        let count = bounded(
            "increment_click",
            self.timeout,
            self.store.increment_click(user_id, category),
        )
        .await?;
        debug!(target: "tailord", user_id, category, count, "click recorded");
        Ok(count)
    }

    pub async fn clear(&self, user_id: UserId) -> StoreResult<ClearedHistory> {
        bounded("clear_history", self.timeout, self.store.clear_history(user_id)).await
    }
}
