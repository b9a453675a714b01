//! Token bucket state and the refill/consume decision.
//!
//! The decision is a pure function of the prior state (or its default) and the
//! current time. Adapters read the prior state from a store, call
//! [`BucketState::resolve`], and write back [`Decision::Allow::next`] only when
//! the request is admitted.

use super::BucketPolicy;

/// Snapshot of one identifier's bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    /// Tokens available, `0 <= tokens <= capacity`.
    pub tokens: f64,
    /// Unix seconds of the last successful refill computation.
    pub last_updated: i64,
}

/// Outcome of resolving a bucket against the current time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    /// One token was consumed; `next` must be committed to the store.
    Allow { next: BucketState },
    /// Fewer than one token available; nothing is written.
    Deny {
        /// Tokens available after refill, always below one.
        available: f64,
        /// Seconds until at least one token is available again.
        retry_after_secs: u64,
    },
}

impl Decision {
    /// An admission leaving `tokens` in the bucket at `now`.
    pub fn allowed(tokens: f64, now: i64) -> Self {
        Decision::Allow {
            next: BucketState {
                tokens,
                last_updated: now,
            },
        }
    }

    /// A rejection with `available` tokens after refill.
    pub fn denied(available: f64, policy: &BucketPolicy) -> Self {
        Decision::Deny {
            available,
            retry_after_secs: retry_after_secs(available, policy),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    /// Whole tokens left after this decision.
    pub fn remaining(&self) -> u32 {
        match self {
            Decision::Allow { next } => next.tokens.floor().max(0.0) as u32,
            Decision::Deny { .. } => 0,
        }
    }
}

impl BucketState {
    /// A full bucket first observed at `now`.
    pub fn fresh(policy: &BucketPolicy, now: i64) -> Self {
        Self {
            tokens: policy.capacity(),
            last_updated: now,
        }
    }

    /// Rebuilds prior state from raw store values.
    ///
    /// Each field defaults on its own: a missing or malformed token count
    /// means a full bucket, a missing or malformed timestamp means `now`.
    pub fn from_stored(
        tokens: Option<&str>,
        last_updated: Option<&str>,
        policy: &BucketPolicy,
        now: i64,
    ) -> Self {
        Self {
            tokens: tokens.and_then(parse_tokens).unwrap_or(policy.capacity()),
            last_updated: last_updated.and_then(parse_last_updated).unwrap_or(now),
        }
    }

    /// Tokens available at `now`, capped at capacity.
    ///
    /// Elapsed time is clamped at zero so a clock that moved backwards never
    /// drains the bucket.
    pub fn refilled(&self, policy: &BucketPolicy, now: i64) -> f64 {
        let elapsed = now.saturating_sub(self.last_updated).max(0) as f64;
        (self.tokens + elapsed * policy.refill_rate()).min(policy.capacity())
    }

    /// Applies refill and, if a token is available, consumes it.
    pub fn resolve(&self, policy: &BucketPolicy, now: i64) -> Decision {
        let refilled = self.refilled(policy, now);

        if refilled >= 1.0 {
            Decision::allowed(refilled - 1.0, now)
        } else {
            Decision::denied(refilled, policy)
        }
    }
}

/// Seconds until one token refills, bounded by the TTL since an idle bucket
/// is reset by expiry no later than that.
fn retry_after_secs(available: f64, policy: &BucketPolicy) -> u64 {
    let ttl = policy.ttl_secs();
    if policy.refill_rate() <= 0.0 {
        return ttl;
    }
    let wait = ((1.0 - available) / policy.refill_rate()).ceil();
    (wait as u64).clamp(1, ttl)
}

/// Parses a stored token count, rejecting non-finite and negative values.
pub fn parse_tokens(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|tokens| tokens.is_finite() && *tokens >= 0.0)
}

/// Parses a stored unix-seconds timestamp.
pub fn parse_last_updated(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}

/// Formats a token count the way it is written to the store.
pub fn format_tokens(tokens: f64) -> String {
    tokens.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    const NOW: i64 = 1_700_000_000;

    fn policy(capacity: f64, refill_rate: f64, ttl_secs: u64) -> BucketPolicy {
        BucketPolicy::new(capacity, refill_rate, Duration::from_secs(ttl_secs)).unwrap()
    }

    // ─── Defaults ────────────────────────────────────────────────────

    #[test]
    fn absent_state_is_full_and_fresh() {
        let p = policy(3.0, 1.0, 10);
        let state = BucketState::from_stored(None, None, &p, NOW);
        assert_eq!(state, BucketState::fresh(&p, NOW));
    }

    #[test]
    fn each_field_defaults_independently() {
        let p = policy(3.0, 1.0, 10);
        let state = BucketState::from_stored(Some("0.5"), None, &p, NOW);
        assert_eq!(state.tokens, 0.5);
        assert_eq!(state.last_updated, NOW);

        let state = BucketState::from_stored(None, Some("1699999990"), &p, NOW);
        assert_eq!(state.tokens, 3.0);
        assert_eq!(state.last_updated, 1_699_999_990);
    }

    #[test]
    fn malformed_values_are_treated_as_absent() {
        let p = policy(3.0, 1.0, 10);
        for raw in ["abc", "", "NaN", "inf", "-1"] {
            let state = BucketState::from_stored(Some(raw), Some("12.5"), &p, NOW);
            assert_eq!(state, BucketState::fresh(&p, NOW), "raw tokens {:?}", raw);
        }
    }

    // ─── Refill ──────────────────────────────────────────────────────

    #[test]
    fn refill_adds_elapsed_times_rate() {
        let p = policy(10.0, 0.5, 60);
        let state = BucketState { tokens: 1.0, last_updated: NOW - 4 };
        assert_eq!(state.refilled(&p, NOW), 3.0);
    }

    #[test]
    fn refill_is_capped_at_capacity() {
        let p = policy(3.0, 1.0, 10);
        let state = BucketState { tokens: 2.0, last_updated: NOW - 100 };
        assert_eq!(state.refilled(&p, NOW), 3.0);
    }

    #[test]
    fn backward_clock_does_not_drain_bucket() {
        let p = policy(3.0, 1.0, 10);
        let state = BucketState { tokens: 1.0, last_updated: NOW + 30 };
        assert_eq!(state.refilled(&p, NOW), 1.0);
        assert!(state.resolve(&p, NOW).is_allowed());
    }

    // ─── Decision ────────────────────────────────────────────────────

    #[test]
    fn allow_consumes_one_token_and_stamps_now() {
        let p = policy(3.0, 1.0, 10);
        let decision = BucketState::fresh(&p, NOW).resolve(&p, NOW);
        assert_eq!(
            decision,
            Decision::Allow {
                next: BucketState { tokens: 2.0, last_updated: NOW }
            }
        );
        assert_eq!(decision.remaining(), 2);
    }

    #[test]
    fn deny_below_one_token() {
        let p = policy(3.0, 1.0, 10);
        let state = BucketState { tokens: 0.0, last_updated: NOW };
        let decision = state.resolve(&p, NOW);
        assert!(!decision.is_allowed());
        assert_eq!(decision.remaining(), 0);
        assert!(matches!(decision, Decision::Deny { retry_after_secs: 1, .. }));
    }

    #[test]
    fn retry_after_reflects_slow_refill() {
        let p = policy(3.0, 0.25, 60);
        let state = BucketState { tokens: 0.0, last_updated: NOW };
        assert!(matches!(
            state.resolve(&p, NOW),
            Decision::Deny { retry_after_secs: 4, .. }
        ));
    }

    #[test]
    fn retry_after_without_refill_is_ttl() {
        let p = policy(1.0, 0.0, 30);
        let state = BucketState { tokens: 0.0, last_updated: NOW - 5 };
        assert!(matches!(
            state.resolve(&p, NOW),
            Decision::Deny { retry_after_secs: 30, .. }
        ));
    }

    #[test]
    fn fractional_capacity_below_one_always_denies() {
        let p = policy(0.5, 1.0, 10);
        assert!(!BucketState::fresh(&p, NOW).resolve(&p, NOW).is_allowed());
    }

    #[test]
    fn format_tokens_uses_shortest_representation() {
        assert_eq!(format_tokens(2.0), "2");
        assert_eq!(format_tokens(1.5), "1.5");
        assert_eq!(parse_tokens(&format_tokens(0.1)), Some(0.1));
    }

    // ─── Properties ──────────────────────────────────────────────────

    proptest! {
        #[test]
        fn committed_tokens_stay_within_bounds(
            capacity in 0.5f64..1000.0,
            rate in 0.0f64..100.0,
            tokens in 0.0f64..1000.0,
            elapsed in -1000i64..100_000,
        ) {
            let p = policy(capacity, rate, 60);
            let state = BucketState { tokens: tokens.min(capacity), last_updated: NOW - elapsed };
            match state.resolve(&p, NOW) {
                Decision::Allow { next } => {
                    prop_assert!(next.tokens >= 0.0);
                    prop_assert!(next.tokens < capacity);
                    prop_assert_eq!(next.last_updated, NOW);
                }
                Decision::Deny { available, retry_after_secs } => {
                    prop_assert!(available < 1.0);
                    prop_assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
                }
            }
        }

        #[test]
        fn refill_is_monotonic_in_time(
            capacity in 1.0f64..100.0,
            rate in 0.0f64..10.0,
            tokens in 0.0f64..100.0,
            earlier in 0i64..1000,
            later_by in 0i64..1000,
        ) {
            let p = policy(capacity, rate, 60);
            let state = BucketState { tokens: tokens.min(capacity), last_updated: NOW };
            let first = state.refilled(&p, NOW + earlier);
            let second = state.refilled(&p, NOW + earlier + later_by);
            prop_assert!(second >= first);
        }

        #[test]
        fn never_exceeds_capacity(
            capacity in 1.0f64..100.0,
            rate in 0.0f64..1000.0,
            elapsed in 0i64..1_000_000,
        ) {
            let p = policy(capacity, rate, 60);
            let state = BucketState { tokens: capacity, last_updated: NOW - elapsed };
            prop_assert!(state.refilled(&p, NOW) <= capacity);
        }
    }
}
