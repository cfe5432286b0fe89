//! Integration tests for the fixed-window rate limiter and its admission
//! integration.

mod common;

use crate::common::{backdate_rate_limit_window, TestHarness};
use chrono::{Duration, Utc};
use server_core::domains::stores::models::StoreEngine;
use server_core::domains::stores::{AdmissionError, RateLimiter};
use server_core::Config;
use test_context::test_context;

#[test_context(TestHarness)]
#[tokio::test]
async fn allows_then_blocks_within_window(ctx: &TestHarness) {
    let limiter = RateLimiter::new(2, 60);

    let (ok_1, remaining_1) = limiter.allow("create:127.0.0.1", &ctx.db_pool).await.unwrap();
    let (ok_2, remaining_2) = limiter.allow("create:127.0.0.1", &ctx.db_pool).await.unwrap();
    let (ok_3, remaining_3) = limiter.allow("create:127.0.0.1", &ctx.db_pool).await.unwrap();

    assert!(ok_1);
    assert_eq!(remaining_1, 1);
    assert!(ok_2);
    assert_eq!(remaining_2, 0);
    assert!(!ok_3);
    assert_eq!(remaining_3, 0);
}

/// Exactly `max_requests` calls are permitted; the (max+1)-th is denied.
#[test_context(TestHarness)]
#[tokio::test]
async fn boundary_is_exact_at_max_requests(ctx: &TestHarness) {
    let limiter = RateLimiter::new(3, 60);

    for expected_remaining in [2, 1, 0] {
        let (ok, remaining) = limiter.allow("create:10.0.0.1", &ctx.db_pool).await.unwrap();
        assert!(ok);
        assert_eq!(remaining, expected_remaining);
    }

    let (ok, _) = limiter.allow("create:10.0.0.1", &ctx.db_pool).await.unwrap();
    assert!(!ok);
}

/// After the window elapses, the first call resets the counter regardless of
/// prior state.
#[test_context(TestHarness)]
#[tokio::test]
async fn window_reset_restores_full_budget(ctx: &TestHarness) {
    let limiter = RateLimiter::new(2, 60);
    let key = "create:10.0.0.2";

    // Exhaust the window.
    limiter.allow(key, &ctx.db_pool).await.unwrap();
    limiter.allow(key, &ctx.db_pool).await.unwrap();
    let (ok, _) = limiter.allow(key, &ctx.db_pool).await.unwrap();
    assert!(!ok);

    backdate_rate_limit_window(&ctx.db_pool, key, Utc::now() - Duration::seconds(120))
        .await
        .unwrap();

    let (ok, remaining) = limiter.allow(key, &ctx.db_pool).await.unwrap();
    assert!(ok);
    assert_eq!(remaining, 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn keys_are_tracked_independently(ctx: &TestHarness) {
    let limiter = RateLimiter::new(1, 60);

    let (ok_a, _) = limiter.allow("create:10.0.0.3", &ctx.db_pool).await.unwrap();
    let (ok_b, _) = limiter.allow("create:10.0.0.4", &ctx.db_pool).await.unwrap();
    let (ok_a_again, _) = limiter.allow("create:10.0.0.3", &ctx.db_pool).await.unwrap();

    assert!(ok_a);
    assert!(ok_b);
    assert!(!ok_a_again);
}

// =============================================================================
// Admission integration
// =============================================================================

/// Three successive creates from one identity under max=2: accepted,
/// accepted, rate-limited.
#[tokio::test]
async fn third_create_from_same_identity_is_rate_limited() {
    let config = Config {
        rate_limit_create_delete_per_window: 2,
        ..Config::default()
    };
    let ctx = TestHarness::with_config(config).await.unwrap();
    let admission = ctx.admission();

    admission
        .create_store(StoreEngine::Woocommerce, None, "203.0.113.42")
        .await
        .unwrap();
    admission
        .create_store(StoreEngine::Woocommerce, None, "203.0.113.42")
        .await
        .unwrap();
    let third = admission
        .create_store(StoreEngine::Woocommerce, None, "203.0.113.42")
        .await;

    assert!(matches!(third, Err(AdmissionError::RateLimited)));

    // A different identity still gets through.
    admission
        .create_store(StoreEngine::Woocommerce, None, "203.0.113.43")
        .await
        .unwrap();
}

/// Create and delete budgets are separate: the limiter keys are prefixed by
/// operation.
#[tokio::test]
async fn create_and_delete_use_separate_budgets() {
    let config = Config {
        rate_limit_create_delete_per_window: 1,
        ..Config::default()
    };
    let ctx = TestHarness::with_config(config).await.unwrap();
    let admission = ctx.admission();

    let created = admission
        .create_store(StoreEngine::Woocommerce, None, "203.0.113.50")
        .await
        .unwrap();

    // Same identity, different operation: not counted against "create".
    admission
        .delete_store(created.store_id, "203.0.113.50")
        .await
        .unwrap();

    // Second create from the identity is over budget.
    let result = admission
        .create_store(StoreEngine::Woocommerce, None, "203.0.113.50")
        .await;
    assert!(matches!(result, Err(AdmissionError::RateLimited)));
}
