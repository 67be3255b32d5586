use std::collections::BTreeSet;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, Script};
use async_trait::async_trait;
use tracing::info;

use super::{BufferError, CounterBuffer, LockToken};

/// Add the (negated) applied amount and drop the field at zero, in one step.
/// ARGV[2] is passed through as a string so it stays an exact integer.
const SETTLE_SCRIPT: &str = r"
local remaining = redis.call('HINCRBY', KEYS[1], ARGV[1], ARGV[2])
if remaining == 0 then
    redis.call('HDEL', KEYS[1], ARGV[1])
end
return remaining
";

/// Delete the lock key only if it still holds our token.
const UNLOCK_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

const SCAN_BATCH: usize = 100;

/// Redis-backed buffer shared by every process of a deployment.
#[derive(Clone)]
pub struct RedisBuffer {
    conn: ConnectionManager,
    settle_script: Script,
    unlock_script: Script,
}

impl RedisBuffer {
    /// Connect to Redis at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str) -> Result<Self, BufferError> {
        let client = Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        info!("Connected to Redis counter buffer");

        Ok(Self {
            conn,
            settle_script: Script::new(SETTLE_SCRIPT),
            unlock_script: Script::new(UNLOCK_SCRIPT),
        })
    }
}

#[async_trait]
impl CounterBuffer for RedisBuffer {
    async fn incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, BufferError> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.hincr(key, field, delta).await?;
        Ok(value)
    }

    async fn incr_many(&self, increments: &[(&str, &str, i64)]) -> Result<Vec<i64>, BufferError> {
        if increments.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        // MULTI/EXEC so a reply never lands on the post without its parent comment
        let mut pipe = ::redis::pipe();
        pipe.atomic();
        for &(key, field, delta) in increments {
            pipe.hincr(key, field, delta);
        }
        let values: Vec<i64> = pipe.query_async(&mut conn).await?;
        Ok(values)
    }

    async fn get(&self, key: &str, field: &str) -> Result<i64, BufferError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = conn.hget(key, field).await?;
        Ok(value.unwrap_or(0))
    }

    async fn settle(&self, key: &str, field: &str, applied: i64) -> Result<i64, BufferError> {
        let mut conn = self.conn.clone();
        let remaining: i64 = self
            .settle_script
            .key(key)
            .arg(field)
            .arg(-applied)
            .invoke_async(&mut conn)
            .await?;
        Ok(remaining)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, BufferError> {
        let mut conn = self.conn.clone();
        // SCAN may return a key more than once across batches
        let mut keys = BTreeSet::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = ::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys.into_iter().collect())
    }

    async fn try_lock(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>, BufferError> {
        let mut conn = self.conn.clone();
        let token = LockToken::generate();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let reply: Option<String> = ::redis::cmd("SET")
            .arg(name)
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|_| token))
    }

    async fn unlock(&self, name: &str, token: &LockToken) -> Result<bool, BufferError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .unlock_script
            .key(name)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}
