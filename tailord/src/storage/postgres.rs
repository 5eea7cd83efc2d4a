use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use tailor_db::PgPool;

use super::{
    CategoryClick, ClearedHistory, HistoryEntry, HistoryStore, StoreError, StoreResult, UserId,
    UserRecord,
};

/// History store on the `users`, `search_history` and `category_clicks` tables.
#[derive(Debug, Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn history_row(row: &PgRow) -> Result<HistoryEntry, sqlx::Error> {
    Ok(HistoryEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        query: row.try_get("query")?,
        created_at: row.try_get("created_at")?,
    })
}

fn user_row(row: &PgRow) -> Result<UserRecord, sqlx::Error> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        handle: row.try_get("handle")?,
        created_at: row.try_get("created_at")?,
    })
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn is_fk_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|e| e.is_foreign_key_violation())
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn create_user(&self, handle: &str, now_ms: i64) -> StoreResult<UserRecord> {
        let result = sqlx::query(
            "INSERT INTO users (handle, created_at)
             VALUES ($1, $2)
             RETURNING id, handle, created_at",
        )
        .bind(handle)
        .bind(now_ms)
        .fetch_one(&self.pool)
        .await;
        match result {
            Ok(row) => Ok(user_row(&row)?),
            Err(e)
                if e.as_database_error()
                    .is_some_and(|d| d.is_unique_violation()) =>
            {
                Err(StoreError::DuplicateHandle(handle.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user(&self, handle: &str) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query("SELECT id, handle, created_at FROM users WHERE handle = $1")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_row).transpose()?)
    }

    async fn delete_user(&self, user_id: UserId) -> StoreResult<bool> {
        // search_history and category_clicks rows go with it (ON DELETE CASCADE).
        let done = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn append_search(
        &self,
        user_id: UserId,
        query: &str,
        now_ms: i64,
    ) -> StoreResult<HistoryEntry> {
        let result = sqlx::query(
            "INSERT INTO search_history (user_id, query, created_at)
             VALUES ($1, $2, $3)
             RETURNING id, user_id, query, created_at",
        )
        .bind(user_id)
        .bind(query)
        .bind(now_ms)
        .fetch_one(&self.pool)
        .await;
        match result {
            Ok(row) => Ok(history_row(&row)?),
            Err(e) if is_fk_violation(&e) => Err(StoreError::UnknownUser(user_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_searches(
        &self,
        user_id: UserId,
        offset: usize,
        limit: Option<usize>,
    ) -> StoreResult<Vec<HistoryEntry>> {
        // LIMIT NULL means no limit in Postgres.
        let rows = sqlx::query(
            "SELECT id, user_id, query, created_at
               FROM search_history
              WHERE user_id = $1
              ORDER BY created_at DESC, id DESC
              LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit.map(to_i64))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            out.push(history_row(r)?);
        }
        Ok(out)
    }

    async fn count_searches(&self, user_id: UserId) -> StoreResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_history WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn increment_click(&self, user_id: UserId, category: &str) -> StoreResult<u64> {
        // Single statement on UNIQUE(user_id, category): concurrent clicks
        // serialize on the row lock and none of them is lost.
        let result = sqlx::query(
            "INSERT INTO category_clicks (user_id, category, click_count)
             VALUES ($1, $2, 1)
             ON CONFLICT (user_id, category)
             DO UPDATE SET click_count = category_clicks.click_count + 1
             RETURNING click_count",
        )
        .bind(user_id)
        .bind(category)
        .fetch_one(&self.pool)
        .await;
        match result {
            Ok(row) => {
                let n: i64 = row.try_get("click_count")?;
                Ok(n.max(0) as u64)
            }
            Err(e) if is_fk_violation(&e) => Err(StoreError::UnknownUser(user_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn click_counts(&self, user_id: UserId) -> StoreResult<Vec<CategoryClick>> {
        let rows = sqlx::query(
            "SELECT category, click_count
               FROM category_clicks
              WHERE user_id = $1
              ORDER BY click_count DESC, category ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let category: String = r.try_get("category")?;
            let n: i64 = r.try_get("click_count")?;
            out.push(CategoryClick {
                category,
                click_count: n.max(0) as u64,
            });
        }
        Ok(out)
    }

    async fn clear_history(&self, user_id: UserId) -> StoreResult<ClearedHistory> {
        // Dropping `tx` on an early return rolls both deletes back.
        let mut tx = self.pool.begin().await?;
        let searches = sqlx::query("DELETE FROM search_history WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let categories = sqlx::query("DELETE FROM category_clicks WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(ClearedHistory {
            searches,
            categories,
        })
    }

    async fn health(&self) -> StoreResult<()> {
        match tailor_db::probe(&self.pool).await {
            tailor_db::HealthStatus::Ok => Ok(()),
            other => Err(StoreError::Unavailable(format!("{other:?}"))),
        }
    }
}
