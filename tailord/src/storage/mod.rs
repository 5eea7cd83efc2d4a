// NOTE: keep operations minimal and async to avoid blocking request paths.
// Every method is a single statement or a single transaction; nothing here
// holds a lock across an await.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

pub mod memory;
pub mod postgres;

pub use memory::MemoryHistoryStore;
pub use postgres::PgHistoryStore;

pub type UserId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub handle: String,
    pub created_at: i64,
}

/// One past query. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: i64,
    pub user_id: UserId,
    pub query: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryClick {
    pub category: String,
    pub click_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedHistory {
    pub searches: u64,
    pub categories: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("handle {0:?} is already taken")]
    DuplicateHandle(String),
    #[error("no user with id {0}")]
    UnknownUser(UserId),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable per-user log of queries plus per-category click counters.
///
/// History is ordered newest first: `created_at` descending, then `id`
/// descending for entries written within the same millisecond.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn create_user(&self, handle: &str, now_ms: i64) -> StoreResult<UserRecord>;

    async fn find_user(&self, handle: &str) -> StoreResult<Option<UserRecord>>;

    /// Remove the user together with all history and click counters.
    async fn delete_user(&self, user_id: UserId) -> StoreResult<bool>;

    async fn append_search(
        &self,
        user_id: UserId,
        query: &str,
        now_ms: i64,
    ) -> StoreResult<HistoryEntry>;

    /// Newest-first window; `limit = None` returns everything from `offset` on.
    async fn list_searches(
        &self,
        user_id: UserId,
        offset: usize,
        limit: Option<usize>,
    ) -> StoreResult<Vec<HistoryEntry>>;

    async fn count_searches(&self, user_id: UserId) -> StoreResult<u64>;

    /// Atomic increment-or-insert. Returns the counter value after the click.
    async fn increment_click(&self, user_id: UserId, category: &str) -> StoreResult<u64>;

    async fn click_counts(&self, user_id: UserId) -> StoreResult<Vec<CategoryClick>>;

    /// Delete every history entry and click counter of the user, all or nothing.
    async fn clear_history(&self, user_id: UserId) -> StoreResult<ClearedHistory>;

    async fn health(&self) -> StoreResult<()>;
}

/// Run a store call under a deadline; elapsed deadlines surface as
/// `StoreError::Unavailable`.
pub async fn bounded<T, F>(what: &'static str, limit: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(format!(
            "{what} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}
