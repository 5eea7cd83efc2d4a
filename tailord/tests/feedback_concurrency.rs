mod common;

use std::sync::Arc;

use tailor_api::request::ClickRequest;
use tailord::storage::{HistoryStore, MemoryHistoryStore};
use tailord::{RecordPolicy, ServiceError};

use common::{fixture, seeded_user};

fn click(category: &str) -> ClickRequest {
    ClickRequest {
        category: category.into(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_clicks_lose_no_updates() {
    const N: u64 = 64;
    let store = Arc::new(MemoryHistoryStore::new());
    let user = store.create_user("ana", 0).await.unwrap();
    store.increment_click(user.id, "sports").await.unwrap();
    let uid = user.id;

    let mut tasks = Vec::new();
    for _ in 0..N {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store.increment_click(uid, "sports").await.unwrap()
        }));
    }
    let mut seen = Vec::new();
    for t in tasks {
        seen.push(t.await.unwrap());
    }
    seen.sort_unstable();
    // Every increment observed a distinct value.
    assert_eq!(seen, (2..=N + 1).collect::<Vec<_>>());

    let counts = store.click_counts(user.id).await.unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].click_count, N + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_clicks_through_services() {
    let fx = Arc::new(fixture(RecordPolicy::OnSuccess));
    let user = fx.store.create_user("ana", 0).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..40 {
        let fx = Arc::clone(&fx);
        let category = if i % 2 == 0 { "tech" } else { "home" };
        tasks.push(tokio::spawn(async move {
            fx.services.record_click(Some("ana"), click(category)).await
        }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }
    let counts = fx.store.click_counts(user.id).await.unwrap();
    assert_eq!(counts.len(), 2);
    assert!(counts.iter().all(|c| c.click_count == 20));
}

#[tokio::test]
async fn blank_category_is_rejected_without_writes() {
    let fx = fixture(RecordPolicy::OnSuccess);
    let user = fx.store.create_user("ana", 0).await.unwrap();
    // No identity either: validation still wins.
    let err = fx.services.record_click(None, click("  ")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert!(fx.store.click_counts(user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn clear_removes_history_and_clicks_together() {
    let fx = fixture(RecordPolicy::OnSuccess);
    let user = seeded_user(&fx.store, "ana").await;

    let resp = fx.services.clear_history(Some("ana")).await.unwrap();
    assert_eq!(resp.status, "ok");
    assert_eq!(resp.deleted_searches, 3);
    assert_eq!(resp.deleted_categories, 2);
    assert_eq!(fx.store.count_searches(user.id).await.unwrap(), 0);
    assert!(fx.store.click_counts(user.id).await.unwrap().is_empty());

    // Clearing again is fine and deletes nothing.
    let again = fx.services.clear_history(Some("ana")).await.unwrap();
    assert_eq!(again.deleted_searches, 0);
}

#[tokio::test]
async fn failure_mid_clear_leaves_both_untouched() {
    let fx = fixture(RecordPolicy::OnSuccess);
    let user = seeded_user(&fx.store, "ana").await;
    fx.store.fail_next_clear();

    let err = fx.services.clear_history(Some("ana")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unavailable(_)));
    assert_eq!(fx.store.count_searches(user.id).await.unwrap(), 3);
    let clicks = fx.store.click_counts(user.id).await.unwrap();
    assert_eq!(clicks.len(), 2);
    assert_eq!(clicks[0].click_count, 3);
}

#[tokio::test]
async fn clear_only_touches_the_caller() {
    let fx = fixture(RecordPolicy::OnSuccess);
    seeded_user(&fx.store, "ana").await;
    let bo = seeded_user(&fx.store, "bo").await;
    fx.services.clear_history(Some("ana")).await.unwrap();
    assert_eq!(fx.store.count_searches(bo.id).await.unwrap(), 3);
    assert_eq!(fx.store.click_counts(bo.id).await.unwrap().len(), 2);
}
