use std::sync::Arc;

use tailor_api::limits::{enforce_max_chars, MAX_QUERY_CHARS};
use tailor_api::request::{ClickRequest, HistoryParams, ParamError};
use tailor_api::response::{
    AckResponse, ClearHistoryResponse, ClickCountItem, ClickHistoryResponse, HistoryEntryItem,
    HistoryResponse, RecommendResponse, RecommendStatus, SearchResponse,
};
use tailor_index::IndexEngine;
use tailor_query::paging::{page_offset, total_pages};
use tailor_query::{compose, normalize_query, recommend, ScoringExpression};
use tracing::{info, warn};

use crate::aggregator::BehaviorAggregator;
use crate::config::{PersonalizationConfig, RecordPolicy};
use crate::error::{ServiceError, ServiceResult};
use crate::feedback::{now_millis, FeedbackRecorder};
use crate::search::SearchExecutor;
use crate::storage::{bounded, HistoryEntry, HistoryStore, StoreError, UserId, UserRecord};

const MAX_HANDLE_CHARS: usize = 80;

/// Every dependency of a request, constructed once and passed in.
///
/// Public operations validate their input before touching the store or the
/// index; identity is resolved only after validation passes.
pub struct Services {
    store: Arc<dyn HistoryStore>,
    aggregator: BehaviorAggregator,
    feedback: FeedbackRecorder,
    executor: SearchExecutor,
    config: PersonalizationConfig,
}

impl Services {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        engine: Arc<dyn IndexEngine>,
        config: PersonalizationConfig,
    ) -> Self {
        Self {
            aggregator: BehaviorAggregator::new(Arc::clone(&store), config.store_timeout),
            feedback: FeedbackRecorder::new(Arc::clone(&store), config.store_timeout),
            executor: SearchExecutor::new(engine, config.index_timeout),
            store,
            config,
        }
    }

    pub fn config(&self) -> &PersonalizationConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<dyn IndexEngine> {
        self.executor.engine()
    }

    /// Map the authenticated handle to its user record.
    pub async fn resolve_user(&self, handle: Option<&str>) -> ServiceResult<UserRecord> {
        let handle = handle
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(ServiceError::Unauthenticated)?;
        let found = bounded(
            "find_user",
            self.config.store_timeout,
            self.store.find_user(handle),
        )
        .await
        .map_err(upstream)?;
        found.ok_or_else(|| ServiceError::NotFound(format!("unknown user {handle:?}")))
    }

    /// Find or create a user; used for seeding.
    pub async fn ensure_user(&self, handle: &str) -> ServiceResult<UserRecord> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(ServiceError::Validation("handle must not be empty".into()));
        }
        enforce_max_chars("handle", handle, MAX_HANDLE_CHARS).map_err(ParamError::from)?;
        let timeout = self.config.store_timeout;
        if let Some(user) = bounded("find_user", timeout, self.store.find_user(handle))
            .await
            .map_err(upstream)?
        {
            return Ok(user);
        }
        match bounded("create_user", timeout, self.store.create_user(handle, now_millis())).await {
            Ok(user) => {
                info!(target: "tailord", handle, user_id = user.id, "user created");
                Ok(user)
            }
            // Lost a race with another creator; theirs is as good as ours.
            Err(StoreError::DuplicateHandle(_)) => {
                bounded("find_user", timeout, self.store.find_user(handle))
                    .await
                    .map_err(upstream)?
                    .ok_or_else(|| ServiceError::NotFound(format!("unknown user {handle:?}")))
            }
            Err(e) => Err(upstream(e)),
        }
    }

    /// The scoring expression `query` gets for this user right now.
    /// `exclude` keeps one history entry out of the term signals.
    pub async fn personalize(
        &self,
        user_id: UserId,
        query: &str,
        exclude: Option<i64>,
    ) -> ServiceResult<ScoringExpression> {
        let cfg = &self.config;
        let categories = self
            .aggregator
            .top_categories(user_id, cfg.category_limit)
            .await
            .map_err(upstream)?;
        let terms = self
            .aggregator
            .top_search_terms(user_id, cfg.term_lookback, cfg.term_limit, exclude)
            .await
            .map_err(upstream)?;
        let categories = cfg.weights.weigh_categories(&categories);
        let terms = cfg.weights.weigh_terms(&terms);
        Ok(compose(query, cfg.fuzziness, &categories, &terms))
    }

    pub async fn search(
        &self,
        handle: Option<&str>,
        raw_query: &str,
        page: u32,
    ) -> ServiceResult<SearchResponse> {
        let query = normalize_query(raw_query).ok_or(ParamError::MissingQuery)?;
        enforce_max_chars("query", query, MAX_QUERY_CHARS).map_err(ParamError::from)?;
        check_page(page)?;
        let user = self.resolve_user(handle).await?;

        let recorded = match self.config.record_policy {
            RecordPolicy::Eager => Some(self.record_search(user.id, query).await?),
            RecordPolicy::OnSuccess => None,
        };
        let expr = self
            .personalize(user.id, query, recorded.as_ref().map(|e| e.id))
            .await?;
        let found = self.executor.execute(expr, page, self.config.page_size).await?;
        if recorded.is_none() {
            self.record_search(user.id, query).await?;
        }

        Ok(SearchResponse {
            query: query.to_string(),
            results: found.items,
            total: found.total,
            page: found.page,
            page_size: found.page_size,
            total_pages: found.total_pages,
        })
    }

    pub async fn record_click(
        &self,
        handle: Option<&str>,
        click: ClickRequest,
    ) -> ServiceResult<AckResponse> {
        let click = click.validated()?;
        let user = self.resolve_user(handle).await?;
        self.feedback
            .record_click(user.id, &click.category)
            .await
            .map_err(upstream)?;
        Ok(AckResponse::ok())
    }

    pub async fn history(
        &self,
        handle: Option<&str>,
        params: HistoryParams,
    ) -> ServiceResult<HistoryResponse> {
        if let HistoryParams::Page(page) = params {
            check_page(page)?;
        }
        let user = self.resolve_user(handle).await?;
        let timeout = self.config.store_timeout;

        match params {
            HistoryParams::All => {
                let entries = bounded(
                    "list_searches",
                    timeout,
                    self.store.list_searches(user.id, 0, None),
                )
                .await
                .map_err(upstream)?;
                let n = entries.len();
                Ok(HistoryResponse {
                    history: entries.into_iter().map(history_item).collect(),
                    total: n as u64,
                    page: 1,
                    page_size: u32::try_from(n).unwrap_or(u32::MAX),
                    total_pages: 1,
                })
            }
            HistoryParams::Page(page) => {
                let size = self.config.history_page_size;
                let offset = page_offset(page, size)
                    .ok_or_else(|| ServiceError::Validation(format!("page {page} is out of range")))?;
                let total = bounded("count_searches", timeout, self.store.count_searches(user.id))
                    .await
                    .map_err(upstream)?;
                let entries = bounded(
                    "list_searches",
                    timeout,
                    self.store.list_searches(user.id, offset, Some(size as usize)),
                )
                .await
                .map_err(upstream)?;
                Ok(HistoryResponse {
                    history: entries.into_iter().map(history_item).collect(),
                    total,
                    page,
                    page_size: size,
                    total_pages: total_pages(total, size),
                })
            }
        }
    }

    /// All-or-nothing wipe of the caller's searches and click counters.
    pub async fn clear_history(&self, handle: Option<&str>) -> ServiceResult<ClearHistoryResponse> {
        let user = self.resolve_user(handle).await?;
        let cleared = self.feedback.clear(user.id).await.map_err(upstream)?;
        info!(
            target: "tailord",
            user_id = user.id,
            searches = cleared.searches,
            categories = cleared.categories,
            "history cleared"
        );
        Ok(ClearHistoryResponse {
            status: "ok".to_string(),
            deleted_searches: cleared.searches,
            deleted_categories: cleared.categories,
        })
    }

    pub async fn click_history(&self, handle: Option<&str>) -> ServiceResult<ClickHistoryResponse> {
        let user = self.resolve_user(handle).await?;
        let counts = bounded(
            "click_counts",
            self.config.store_timeout,
            self.store.click_counts(user.id),
        )
        .await
        .map_err(upstream)?;
        Ok(ClickHistoryResponse {
            clicks: counts
                .into_iter()
                .map(|c| ClickCountItem {
                    category: c.category,
                    click_count: c.click_count,
                })
                .collect(),
        })
    }

    /// Documents from any of the user's top clicked categories.
    pub async fn recommend(
        &self,
        handle: Option<&str>,
        page: u32,
    ) -> ServiceResult<RecommendResponse> {
        check_page(page)?;
        let user = self.resolve_user(handle).await?;
        let top = self
            .aggregator
            .top_categories(user.id, self.config.recommend_categories)
            .await
            .map_err(upstream)?;
        let categories: Vec<String> = top.into_iter().map(|s| s.key).collect();
        let page_size = self.config.page_size;

        let Some(expr) = recommend(&categories) else {
            return Ok(RecommendResponse {
                status: RecommendStatus::NoSignal,
                categories: Vec::new(),
                results: Vec::new(),
                total: 0,
                page,
                page_size,
                total_pages: 0,
            });
        };
        let found = self.executor.execute(expr, page, page_size).await?;
        Ok(RecommendResponse {
            status: RecommendStatus::Ok,
            categories,
            results: found.items,
            total: found.total,
            page: found.page,
            page_size: found.page_size,
            total_pages: found.total_pages,
        })
    }

    pub async fn ready(&self) -> ServiceResult<()> {
        bounded("health", self.config.store_timeout, self.store.health())
            .await
            .map_err(upstream)
    }

    async fn record_search(&self, user_id: UserId, query: &str) -> ServiceResult<HistoryEntry> {
        self.feedback
            .record_search(user_id, query)
            .await
            .map_err(upstream)
    }
}

fn check_page(page: u32) -> ServiceResult<()> {
    if page == 0 {
        return Err(ParamError::InvalidPage(page.to_string()).into());
    }
    Ok(())
}

fn history_item(e: HistoryEntry) -> HistoryEntryItem {
    HistoryEntryItem {
        id: e.id,
        query: e.query,
        timestamp: e.created_at,
    }
}

/// Store failures as service errors, logging the ones that hide detail.
fn upstream(e: StoreError) -> ServiceError {
    let mapped = ServiceError::from(e);
    if let ServiceError::Unavailable(detail) = &mapped {
        warn!(target: "tailord", %detail, "history store call failed");
    }
    mapped
}
