use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    CategoryClick, ClearedHistory, HistoryEntry, HistoryStore, StoreError, StoreResult, UserId,
    UserRecord,
};

/// One user's rows. History is kept ascending by `(created_at, id)` so the
/// newest entries sit at the tail.
#[derive(Debug)]
struct UserState {
    record: UserRecord,
    live: bool,
    history: Vec<HistoryEntry>,
    clicks: BTreeMap<String, u64>,
}

type UserSlot = Arc<Mutex<UserState>>;

#[derive(Debug, Default)]
struct Directory {
    by_id: HashMap<UserId, UserSlot>,
    by_handle: HashMap<String, UserId>,
}

/// Process-local history store. Used when no database is configured and as
/// the injectable fake in tests, with a few knobs for failure injection.
///
/// The directory lock is held only to look a user up; reads and writes of a
/// user's rows lock that user alone.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    directory: RwLock<Directory>,
    next_user: AtomicI64,
    next_entry: AtomicI64,
    unavailable: AtomicBool,
    fail_next_clear: AtomicBool,
    latency_ms: AtomicU64,
}

// A panicking test thread must not wedge the others, so poisoned locks are
// recovered rather than propagated.
fn lock_user(slot: &UserSlot) -> MutexGuard<'_, UserState> {
    slot.lock().unwrap_or_else(|p| p.into_inner())
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with `StoreError::Unavailable` while set.
    pub fn set_unavailable(&self, on: bool) {
        self.unavailable.store(on, Ordering::SeqCst);
    }

    /// The next `clear_history` fails after deleting the searches, and the
    /// partial delete is rolled back.
    pub fn fail_next_clear(&self) {
        self.fail_next_clear.store(true, Ordering::SeqCst);
    }

    /// Sleep before every call.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    fn read_dir(&self) -> RwLockReadGuard<'_, Directory> {
        self.directory.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_dir(&self) -> RwLockWriteGuard<'_, Directory> {
        self.directory.write().unwrap_or_else(|p| p.into_inner())
    }

    fn slot(&self, user_id: UserId) -> Option<UserSlot> {
        self.read_dir().by_id.get(&user_id).cloned()
    }

    async fn gate(&self) -> StoreResult<()> {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create_user(&self, handle: &str, now_ms: i64) -> StoreResult<UserRecord> {
        self.gate().await?;
        let mut dir = self.write_dir();
        if dir.by_handle.contains_key(handle) {
            return Err(StoreError::DuplicateHandle(handle.to_string()));
        }
        let user = UserRecord {
            id: self.next_user.fetch_add(1, Ordering::SeqCst) + 1,
            handle: handle.to_string(),
            created_at: now_ms,
        };
        dir.by_handle.insert(user.handle.clone(), user.id);
        dir.by_id.insert(
            user.id,
            Arc::new(Mutex::new(UserState {
                record: user.clone(),
                live: true,
                history: Vec::new(),
                clicks: BTreeMap::new(),
            })),
        );
        Ok(user)
    }

    async fn find_user(&self, handle: &str) -> StoreResult<Option<UserRecord>> {
        self.gate().await?;
        let slot = {
            let dir = self.read_dir();
            dir.by_handle
                .get(handle)
                .and_then(|id| dir.by_id.get(id))
                .cloned()
        };
        Ok(slot.map(|s| lock_user(&s).record.clone()))
    }

    async fn delete_user(&self, user_id: UserId) -> StoreResult<bool> {
        self.gate().await?;
        let removed = {
            let mut dir = self.write_dir();
            let removed = dir.by_id.remove(&user_id);
            if let Some(slot) = &removed {
                dir.by_handle.remove(&lock_user(slot).record.handle);
            }
            removed
        };
        match removed {
            Some(slot) => {
                let mut st = lock_user(&slot);
                st.live = false;
                st.history.clear();
                st.clicks.clear();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_search(
        &self,
        user_id: UserId,
        query: &str,
        now_ms: i64,
    ) -> StoreResult<HistoryEntry> {
        self.gate().await?;
        let slot = self.slot(user_id).ok_or(StoreError::UnknownUser(user_id))?;
        let mut st = lock_user(&slot);
        if !st.live {
            return Err(StoreError::UnknownUser(user_id));
        }
        let entry = HistoryEntry {
            id: self.next_entry.fetch_add(1, Ordering::SeqCst) + 1,
            user_id,
            query: query.to_string(),
            created_at: now_ms,
        };
        // Appends arrive in time order, so this is almost always the tail.
        let at = st
            .history
            .partition_point(|e| (e.created_at, e.id) <= (entry.created_at, entry.id));
        st.history.insert(at, entry.clone());
        Ok(entry)
    }

    async fn list_searches(
        &self,
        user_id: UserId,
        offset: usize,
        limit: Option<usize>,
    ) -> StoreResult<Vec<HistoryEntry>> {
        self.gate().await?;
        let Some(slot) = self.slot(user_id) else {
            return Ok(Vec::new());
        };
        let st = lock_user(&slot);
        let window = st.history.iter().rev().skip(offset);
        Ok(match limit {
            Some(n) => window.take(n).cloned().collect(),
            None => window.cloned().collect(),
        })
    }

    async fn count_searches(&self, user_id: UserId) -> StoreResult<u64> {
        self.gate().await?;
        Ok(self
            .slot(user_id)
            .map_or(0, |s| lock_user(&s).history.len() as u64))
    }

    async fn increment_click(&self, user_id: UserId, category: &str) -> StoreResult<u64> {
        self.gate().await?;
        let slot = self.slot(user_id).ok_or(StoreError::UnknownUser(user_id))?;
        // Read and write happen under one acquisition of the user's lock.
        let mut st = lock_user(&slot);
        if !st.live {
            return Err(StoreError::UnknownUser(user_id));
        }
        let counter = st.clicks.entry(category.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn click_counts(&self, user_id: UserId) -> StoreResult<Vec<CategoryClick>> {
        self.gate().await?;
        let Some(slot) = self.slot(user_id) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<CategoryClick> = lock_user(&slot)
            .clicks
            .iter()
            .map(|(category, n)| CategoryClick {
                category: category.clone(),
                click_count: *n,
            })
            .collect();
        out.sort_by(|a, b| {
            b.click_count
                .cmp(&a.click_count)
                .then_with(|| a.category.cmp(&b.category))
        });
        Ok(out)
    }

    async fn clear_history(&self, user_id: UserId) -> StoreResult<ClearedHistory> {
        self.gate().await?;
        let Some(slot) = self.slot(user_id) else {
            return Ok(ClearedHistory::default());
        };
        let mut st = lock_user(&slot);
        let history = std::mem::take(&mut st.history);
        if self.fail_next_clear.swap(false, Ordering::SeqCst) {
            st.history = history;
            return Err(StoreError::Unavailable(
                "clear aborted after deleting searches".into(),
            ));
        }
        let clicks = std::mem::take(&mut st.clicks);
        Ok(ClearedHistory {
            searches: history.len() as u64,
            categories: clicks.len() as u64,
        })
    }

    async fn health(&self) -> StoreResult<()> {
        self.gate().await
    }
}
