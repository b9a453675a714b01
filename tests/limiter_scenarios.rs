//! Integration tests for the store-backed token bucket limiter.
//!
//! These tests drive the limiter through the public API with a manual clock
//! and the in-memory store, covering:
//! 1. Exhaustion and refill of a single bucket
//! 2. TTL expiry resetting an idle bucket
//! 3. Failure handling when the store misbehaves
//! 4. Bounds under concurrent callers

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use token_bucket_limiter::adapters::{InMemoryBucketStore, ManualClock, StoreTokenBucketLimiter};
use token_bucket_limiter::domain::rate_limit::{BucketKeys, BucketPolicy};
use token_bucket_limiter::ports::{RateLimitError, RateLimiter};

// =============================================================================
// Test Infrastructure
// =============================================================================

const START: i64 = 1_700_000_000;

struct Fixture {
    limiter: StoreTokenBucketLimiter,
    store: InMemoryBucketStore,
    clock: ManualClock,
}

fn fixture(capacity: f64, refill_rate: f64, ttl_secs: u64) -> Fixture {
    let clock = ManualClock::starting_at(START);
    let store = InMemoryBucketStore::new(Arc::new(clock.clone()));
    let policy = BucketPolicy::new(capacity, refill_rate, Duration::from_secs(ttl_secs))
        .expect("valid policy");
    let limiter =
        StoreTokenBucketLimiter::new(Arc::new(store.clone()), Arc::new(policy), Arc::new(clock.clone()));
    Fixture {
        limiter,
        store,
        clock,
    }
}

async fn allow(limiter: &StoreTokenBucketLimiter, identifier: &str) -> bool {
    limiter.allow(identifier).await.expect("limiter call succeeds")
}

// =============================================================================
// Refill and expiry
// =============================================================================

#[tokio::test]
async fn exhausted_bucket_refills_one_token_per_second() {
    let f = fixture(3.0, 1.0, 10);
    let ip = "192.168.1.100";

    assert!(allow(&f.limiter, ip).await);
    assert!(allow(&f.limiter, ip).await);
    assert!(allow(&f.limiter, ip).await);
    assert!(!allow(&f.limiter, ip).await);

    f.clock.advance(1);
    assert!(allow(&f.limiter, ip).await);
    assert!(!allow(&f.limiter, ip).await);
}

#[tokio::test]
async fn idle_bucket_resets_after_ttl() {
    let f = fixture(2.0, 1.0, 5);
    let ip = "192.168.1.200";

    assert!(allow(&f.limiter, ip).await);
    assert!(allow(&f.limiter, ip).await);
    assert!(!allow(&f.limiter, ip).await);

    f.clock.advance(6);
    let keys = BucketKeys::for_identifier(ip);
    assert_eq!(f.store.peek(&keys.tokens).await, None);
    assert_eq!(f.store.peek(&keys.last_updated).await, None);

    // A fresh bucket admits the full capacity again.
    assert!(allow(&f.limiter, ip).await);
    assert!(allow(&f.limiter, ip).await);
    assert!(!allow(&f.limiter, ip).await);
}

#[tokio::test]
async fn fractional_rate_needs_the_full_interval() {
    let f = fixture(1.0, 0.5, 60);
    let ip = "10.0.0.1";

    assert!(allow(&f.limiter, ip).await);
    f.clock.advance(1);
    assert!(!allow(&f.limiter, ip).await);
    f.clock.advance(1);
    assert!(allow(&f.limiter, ip).await);
}

#[tokio::test]
async fn fractional_remainders_are_stored_without_rounding() {
    let f = fixture(3.0, 0.3, 60);
    let ip = "10.0.0.8";
    let keys = BucketKeys::for_identifier(ip);

    let mut admitted = Vec::new();
    for offset in [0, 0, 0, 0, 4, 10, 10] {
        f.clock.set(START + offset);
        admitted.push(allow(&f.limiter, ip).await);
    }

    assert_eq!(admitted, [true, true, true, false, true, true, false]);
    // 0.2 + 6 * 0.3 falls just short of two tokens.
    assert_eq!(
        f.store.peek(&keys.tokens).await.as_deref(),
        Some("0.9999999999999998")
    );
}

#[tokio::test]
async fn zero_rate_never_refills_while_active() {
    let f = fixture(2.0, 0.0, 60);
    let ip = "10.0.0.2";

    assert!(allow(&f.limiter, ip).await);
    assert!(allow(&f.limiter, ip).await);
    for _ in 0..5 {
        f.clock.advance(10);
        assert!(!allow(&f.limiter, ip).await);
    }
}

#[tokio::test]
async fn denials_do_not_postpone_refill() {
    let f = fixture(1.0, 1.0, 60);
    let ip = "10.0.0.3";

    assert!(allow(&f.limiter, ip).await);
    for _ in 0..10 {
        assert!(!allow(&f.limiter, ip).await);
    }
    f.clock.advance(1);
    assert!(allow(&f.limiter, ip).await);
}

#[tokio::test]
async fn backward_clock_step_does_not_mint_or_burn_tokens() {
    let f = fixture(3.0, 1.0, 60);
    let ip = "10.0.0.4";

    assert!(allow(&f.limiter, ip).await);
    f.clock.advance(-30);

    // Two tokens remain; going back in time neither adds nor removes any.
    assert!(allow(&f.limiter, ip).await);
    assert!(allow(&f.limiter, ip).await);
    assert!(!allow(&f.limiter, ip).await);
}

#[tokio::test]
async fn identifiers_do_not_share_quota() {
    let f = fixture(1.0, 1.0, 60);

    assert!(allow(&f.limiter, "10.0.0.5").await);
    assert!(!allow(&f.limiter, "10.0.0.5").await);
    assert!(allow(&f.limiter, "10.0.0.6").await);
    assert!(allow(&f.limiter, "2001:db8::1").await);
}

#[tokio::test]
async fn status_reports_remaining_without_consuming() {
    let f = fixture(5.0, 1.0, 60);
    let ip = "10.0.0.7";

    assert_eq!(f.limiter.status(ip).await.unwrap().remaining, 5);
    assert!(allow(&f.limiter, ip).await);
    assert!(allow(&f.limiter, ip).await);

    let status = f.limiter.status(ip).await.unwrap();
    assert_eq!(status.limit, 5);
    assert_eq!(status.remaining, 3);
    assert_eq!(f.limiter.status(ip).await.unwrap().remaining, 3);
}

// =============================================================================
// Store failures
// =============================================================================

#[tokio::test]
async fn failed_commit_is_an_error_and_leaves_state_untouched() {
    let f = fixture(2.0, 1.0, 60);
    let ip = "10.0.1.1";
    let keys = BucketKeys::for_identifier(ip);

    assert!(allow(&f.limiter, ip).await);
    let tokens_before = f.store.peek(&keys.tokens).await;

    f.store.fail_writes(true);
    let result = f.limiter.allow(ip).await;
    assert!(matches!(result, Err(RateLimitError::Unavailable(_))));
    assert_eq!(f.store.peek(&keys.tokens).await, tokens_before);

    f.store.fail_writes(false);
    assert!(allow(&f.limiter, ip).await);
    assert!(!allow(&f.limiter, ip).await);
}

#[tokio::test]
async fn unreadable_state_is_treated_as_a_fresh_bucket() {
    let f = fixture(1.0, 1.0, 60);
    let ip = "10.0.1.2";

    assert!(allow(&f.limiter, ip).await);
    f.store.fail_reads(true);
    assert!(allow(&f.limiter, ip).await);
}

#[tokio::test]
async fn corrupt_stored_values_fall_back_to_defaults() {
    let f = fixture(2.0, 1.0, 60);
    let ip = "10.0.1.3";
    let keys = BucketKeys::for_identifier(ip);

    f.store
        .insert_raw(&keys.tokens, "not-a-number", Duration::from_secs(60))
        .await;
    f.store
        .insert_raw(&keys.last_updated, "yesterday", Duration::from_secs(60))
        .await;

    assert!(allow(&f.limiter, ip).await);
    assert_eq!(f.store.peek(&keys.tokens).await.as_deref(), Some("1"));
    assert_eq!(
        f.store.peek(&keys.last_updated).await,
        Some(START.to_string())
    );
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_never_under_admit_or_go_negative() {
    let f = fixture(5.0, 0.0, 60);
    let limiter = Arc::new(f.limiter);
    let ip = "10.0.2.1";

    let calls = (0..20).map(|_| {
        let limiter = Arc::clone(&limiter);
        async move { limiter.allow(ip).await }
    });
    let results = join_all(calls).await;

    let admitted = results
        .iter()
        .filter(|r| matches!(r, Ok(true)))
        .count();
    assert!(results.iter().all(Result::is_ok));
    // Read-then-write can over-admit under a race, never under-admit.
    assert!(admitted >= 5, "admitted {admitted}");

    let keys = BucketKeys::for_identifier(ip);
    let tokens: f64 = f
        .store
        .peek(&keys.tokens)
        .await
        .expect("bucket written")
        .parse()
        .expect("numeric tokens");
    assert!((0.0..5.0).contains(&tokens), "tokens {tokens}");
}

#[tokio::test]
async fn deadline_bounded_check_succeeds_against_fast_store() {
    let f = fixture(1.0, 1.0, 60);

    let allowed = f
        .limiter
        .allow_within("10.0.3.1", Duration::from_millis(500))
        .await
        .unwrap();
    assert!(allowed);
}
