mod common;

use std::sync::atomic::Ordering;

use tailor_query::compose::base_clause;
use tailor_query::{BoostTarget, Fuzziness, ScoringExpression};
use tailord::storage::HistoryStore;
use tailord::{RecordPolicy, ServiceError};

use common::{fixture, seeded_user};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn boost_weight(expr: &ScoringExpression, target: &BoostTarget) -> Option<f64> {
    expr.boosts()
        .iter()
        .find(|b| &b.target == target)
        .map(|b| b.weight)
}

fn category(name: &str) -> BoostTarget {
    BoostTarget::CategoryEquals(name.into())
}

fn term(name: &str) -> BoostTarget {
    BoostTarget::TermIn {
        term: name.into(),
        fields: vec![tailor_query::DocField::Title, tailor_query::DocField::Body],
    }
}

async fn assert_market_signals(policy: RecordPolicy) {
    let fx = fixture(policy);
    let user = seeded_user(&fx.store, "ana").await;

    let resp = fx
        .services
        .search(Some("ana"), "market", 1)
        .await
        .expect("search");
    assert_eq!(resp.query, "market");
    assert_eq!(resp.page, 1);
    assert_eq!(resp.page_size, 10);
    assert_eq!(resp.total, 3);
    assert_eq!(resp.total_pages, 1);

    let expr = fx.engine.last();
    assert!(matches!(expr, ScoringExpression::Composite { .. }), "{expr:?}");
    assert!(close(boost_weight(&expr, &category("sports")).unwrap(), 1.6));
    assert!(close(boost_weight(&expr, &category("tech")).unwrap(), 1.2));
    assert!(close(boost_weight(&expr, &term("ai")).unwrap(), 0.9));
    assert!(close(boost_weight(&expr, &term("chips")).unwrap(), 0.9));
    // The search itself never counts toward its own signals.
    assert!(close(boost_weight(&expr, &term("market")).unwrap(), 0.7));
    assert!(close(boost_weight(&expr, &term("stock")).unwrap(), 0.7));

    // Category boosts come first, then terms by frequency then name.
    let order: Vec<_> = expr.boosts().iter().map(|b| b.target.clone()).collect();
    assert_eq!(
        order,
        vec![
            category("sports"),
            category("tech"),
            term("ai"),
            term("chips"),
            term("market"),
            term("stock"),
        ]
    );

    // Recorded either way, and visible to the next search.
    assert_eq!(fx.store.count_searches(user.id).await.unwrap(), 4);
    fx.services.search(Some("ana"), "market", 1).await.unwrap();
    assert!(close(
        boost_weight(&fx.engine.last(), &term("market")).unwrap(),
        0.9
    ));
}

#[tokio::test]
async fn market_scenario_records_after_success() {
    assert_market_signals(RecordPolicy::OnSuccess).await;
}

#[tokio::test]
async fn market_scenario_records_eagerly() {
    assert_market_signals(RecordPolicy::Eager).await;
}

#[tokio::test]
async fn personalized_results_favour_clicked_categories() {
    let fx = fixture(RecordPolicy::OnSuccess);
    seeded_user(&fx.store, "ana").await;
    let resp = fx.services.search(Some("ana"), "market", 1).await.unwrap();
    // n1 is tech and mentions stock; n3 is sports. n2 (home) gets no boost.
    let last = resp.results.last().map(|r| r.id.as_str());
    assert_eq!(last, Some("n2"), "{:?}", resp.results);
}

#[tokio::test]
async fn no_signals_sends_exact_base_clause() {
    let fx = fixture(RecordPolicy::OnSuccess);
    fx.store.create_user("new", 0).await.unwrap();
    fx.services.search(Some("new"), "  market ", 1).await.unwrap();
    assert_eq!(
        fx.engine.last(),
        ScoringExpression::Base(base_clause("market", Fuzziness::Auto))
    );
}

#[tokio::test]
async fn empty_query_is_rejected_before_any_call() {
    for policy in [RecordPolicy::OnSuccess, RecordPolicy::Eager] {
        let fx = fixture(policy);
        let user = seeded_user(&fx.store, "ana").await;
        for q in ["", "   ", "\t\n"] {
            let err = fx.services.search(Some("ana"), q, 1).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)), "{err:?}");
        }
        assert_eq!(fx.engine.calls(), 0);
        assert_eq!(fx.store.count_searches(user.id).await.unwrap(), 3);
    }
}

#[tokio::test]
async fn validation_precedes_identity() {
    let fx = fixture(RecordPolicy::OnSuccess);
    // Store down and no identity: the empty query is still a validation error.
    fx.store.set_unavailable(true);
    let err = fx.services.search(None, " ", 1).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    let err = fx.services.search(Some("ana"), "market", 0).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn identity_errors_are_distinct() {
    let fx = fixture(RecordPolicy::OnSuccess);
    assert!(matches!(
        fx.services.search(None, "market", 1).await,
        Err(ServiceError::Unauthenticated)
    ));
    assert!(matches!(
        fx.services.search(Some("ghost"), "market", 1).await,
        Err(ServiceError::NotFound(_))
    ));
    assert_eq!(fx.engine.calls(), 0);
}

#[tokio::test]
async fn failed_index_call_records_nothing_after_success_policy() {
    let fx = fixture(RecordPolicy::OnSuccess);
    let user = seeded_user(&fx.store, "ana").await;
    fx.engine.fail.store(true, Ordering::SeqCst);
    let err = fx.services.search(Some("ana"), "market", 1).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unavailable(_)));
    assert_eq!(err.public_message(), "upstream unavailable");
    assert_eq!(fx.store.count_searches(user.id).await.unwrap(), 3);
}

#[tokio::test]
async fn failed_index_call_keeps_eager_record() {
    let fx = fixture(RecordPolicy::Eager);
    let user = seeded_user(&fx.store, "ana").await;
    fx.engine.fail.store(true, Ordering::SeqCst);
    assert!(fx.services.search(Some("ana"), "market", 1).await.is_err());
    assert_eq!(fx.store.count_searches(user.id).await.unwrap(), 4);
}

#[tokio::test]
async fn page_beyond_end_is_empty() {
    let fx = fixture(RecordPolicy::OnSuccess);
    fx.store.create_user("ana", 0).await.unwrap();
    let resp = fx.services.search(Some("ana"), "market", 7).await.unwrap();
    assert!(resp.results.is_empty());
    assert_eq!(resp.total, 3);
    assert_eq!(resp.page, 7);
    assert_eq!(resp.total_pages, 1);
}

#[tokio::test]
async fn largest_page_number_is_empty_not_fatal() {
    let fx = fixture(RecordPolicy::OnSuccess);
    fx.store.create_user("ana", 0).await.unwrap();
    let resp = fx.services.search(Some("ana"), "market", u32::MAX).await.unwrap();
    assert!(resp.results.is_empty());
    assert_eq!(resp.total, 3);
    assert_eq!(resp.page, u32::MAX);
    assert_eq!(resp.total_pages, 1);
}
