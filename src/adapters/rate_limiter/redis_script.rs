//! Redis token bucket evaluated atomically in a server-side Lua script.
//!
//! Same key layout and refill rules as `StoreTokenBucketLimiter`, but the
//! read, the decision and the write run as one `EVALSHA`, so concurrent calls
//! for one identifier are serialized by Redis and never over-admit.
//!
//! The current time is passed in from the injected clock rather than read
//! with `TIME` inside the script, keeping timestamps consistent with
//! instances running the two-phase limiter against the same keys.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::MultiplexedConnection;
use redis::Script;

use crate::adapters::bucket_store::map_redis_error;
use crate::domain::rate_limit::{parse_tokens, BucketKeys, BucketPolicy, BucketState, Decision};
use crate::ports::{
    Clock, RateLimitDenied, RateLimitError, RateLimitResult, RateLimitStatus, RateLimiter,
};

/// KEYS[1] tokens key, KEYS[2] last-updated key.
/// ARGV capacity, refill rate, ttl seconds, now.
/// Returns `{1, remaining}` on allow and `{0, available}` on deny.
///
/// Stored values are parsed with the same rules as `parse_tokens` and
/// `parse_last_updated`, and token counts are written with the fewest digits
/// that read back as the same double, like `format_tokens`. Lua's `tostring`
/// keeps only 14 significant digits and must not be used for token counts.
const TOKEN_BUCKET_LUA: &str = r#"
local function parse_tokens(raw)
  if not raw or string.find(raw, '[xX]') then
    return nil
  end
  local tokens = tonumber(raw)
  if tokens == nil or tokens ~= tokens or tokens == math.huge or tokens < 0 then
    return nil
  end
  return tokens
end

local function parse_last_updated(raw)
  if not raw then
    return nil
  end
  local digits = string.match(raw, '^%s*([+-]?%d+)%s*$')
  if not digits then
    return nil
  end
  return tonumber(digits)
end

local function format_tokens(n)
  for precision = 15, 17 do
    local formatted = string.format('%.' .. precision .. 'g', n)
    if tonumber(formatted) == n then
      return formatted
    end
  end
  return string.format('%.17g', n)
end

local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local ttl = tonumber(ARGV[3])
local now = tonumber(ARGV[4])

local tokens = parse_tokens(redis.call('GET', KEYS[1])) or capacity
local last_updated = parse_last_updated(redis.call('GET', KEYS[2])) or now

local elapsed = math.max(0, now - last_updated)
local refilled = math.min(capacity, tokens + elapsed * refill_rate)

if refilled >= 1 then
  local remaining = format_tokens(refilled - 1)
  redis.call('SET', KEYS[1], remaining, 'EX', ttl)
  redis.call('SET', KEYS[2], string.format('%d', now), 'EX', ttl)
  return {1, remaining}
end

return {0, format_tokens(refilled)}
"#;

static TOKEN_BUCKET_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(TOKEN_BUCKET_LUA));

/// Token bucket limiter running its whole protocol inside Redis.
#[derive(Clone)]
pub struct ScriptedRedisLimiter {
    conn: MultiplexedConnection,
    policy: Arc<BucketPolicy>,
    clock: Arc<dyn Clock>,
}

impl ScriptedRedisLimiter {
    /// Create a new scripted limiter.
    pub fn new(conn: MultiplexedConnection, policy: Arc<BucketPolicy>, clock: Arc<dyn Clock>) -> Self {
        Self {
            conn,
            policy,
            clock,
        }
    }
}

/// Turn the script reply into a decision.
///
/// Anything but `{0|1, non-negative number}` is a backend failure.
fn decode_reply(
    allowed: i64,
    tokens: &str,
    now: i64,
    policy: &BucketPolicy,
) -> Result<Decision, RateLimitError> {
    let malformed = || {
        RateLimitError::Unavailable(format!("unexpected script reply: {{{allowed}, {tokens}}}"))
    };
    let available = parse_tokens(tokens).ok_or_else(malformed)?;

    match allowed {
        1 => Ok(Decision::allowed(available, now)),
        0 => Ok(Decision::denied(available, policy)),
        _ => Err(malformed()),
    }
}

#[async_trait]
impl RateLimiter for ScriptedRedisLimiter {
    async fn check(&self, identifier: &str) -> Result<RateLimitResult, RateLimitError> {
        let keys = BucketKeys::for_identifier(identifier);
        let now = self.clock.now_unix_secs();
        let limit = self.policy.limit();

        let mut conn = self.conn.clone();
        let (allowed, tokens): (i64, String) = TOKEN_BUCKET_SCRIPT
            .key(&keys.tokens)
            .key(&keys.last_updated)
            .arg(self.policy.capacity())
            .arg(self.policy.refill_rate())
            .arg(self.policy.ttl_secs())
            .arg(now)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::error!(identifier, error = %e, "Token bucket script failed");
                RateLimitError::Unavailable(map_redis_error(e).to_string())
            })?;

        match decode_reply(allowed, &tokens, now, &self.policy)? {
            decision @ Decision::Allow { .. } => Ok(RateLimitResult::Allowed(RateLimitStatus {
                limit,
                remaining: decision.remaining(),
            })),
            Decision::Deny {
                available,
                retry_after_secs,
            } => {
                tracing::debug!(identifier, tokens = available, "Request rejected");
                Ok(RateLimitResult::Denied(RateLimitDenied {
                    limit,
                    retry_after_secs,
                }))
            }
        }
    }

    async fn status(&self, identifier: &str) -> Result<RateLimitStatus, RateLimitError> {
        let keys = BucketKeys::for_identifier(identifier);
        let now = self.clock.now_unix_secs();

        let mut conn = self.conn.clone();
        let (tokens, last_updated): (Option<String>, Option<String>) = redis::cmd("MGET")
            .arg(&keys.tokens)
            .arg(&keys.last_updated)
            .query_async(&mut conn)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(identifier, error = %e, "Bucket read failed, using default");
                (None, None)
            });

        let state =
            BucketState::from_stored(tokens.as_deref(), last_updated.as_deref(), &self.policy, now);
        let available = state.refilled(&self.policy, now);

        Ok(RateLimitStatus {
            limit: self.policy.limit(),
            remaining: available.floor().max(0.0) as u32,
        })
    }

    async fn health(&self) -> Result<(), RateLimitError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| RateLimitError::Unavailable(map_redis_error(e).to_string()))
    }
}

impl std::fmt::Debug for ScriptedRedisLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRedisLimiter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
