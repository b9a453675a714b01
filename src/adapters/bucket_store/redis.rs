//! Redis-backed bucket store for production multi-server deployments.
//!
//! Uses plain `GET` and `SET key value EX ttl`; atomic batches are sent as a
//! `MULTI`/`EXEC` pipeline.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError};

use crate::ports::{BucketStore, BucketStoreError, SetWithExpiry};

/// Bucket store over a multiplexed Redis connection.
///
/// The connection is cloned per call and safe to share across tasks.
#[derive(Clone)]
pub struct RedisBucketStore {
    conn: MultiplexedConnection,
}

impl RedisBucketStore {
    /// Create a new Redis bucket store.
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

/// Redis `EX` takes whole seconds and rejects zero.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

pub(crate) fn map_redis_error(e: RedisError) -> BucketStoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        BucketStoreError::Unavailable(e.to_string())
    } else {
        BucketStoreError::Backend(e.to_string())
    }
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BucketStoreError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(map_redis_error)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), BucketStoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(expiry_secs(ttl))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn atomic_batch(&self, ops: Vec<SetWithExpiry>) -> Result<(), BucketStoreError> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            pipe.cmd("SET")
                .arg(&op.key)
                .arg(&op.value)
                .arg("EX")
                .arg(expiry_secs(op.ttl))
                .ignore();
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn ping(&self) -> Result<(), BucketStoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_redis_error)
    }
}

impl std::fmt::Debug for RedisBucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBucketStore").finish_non_exhaustive()
    }
}
