//! Redis implementation of [`CounterStore`].
//!
//! Batches are sent as a `MULTI`/`EXEC` pipeline; conditional batches
//! run as one Lua script. Every round trip is
//! bounded by [`RedisConfig::op_timeout`]; a timeout surfaces as
//! `StoreUnavailable`, never as a miss.

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{Client, Cmd, FromRedisValue, Pipeline, Script};
use tokio::time::timeout;
use tracing::{debug, info};
use warden_core::error::WardenResult;
use warden_core::store::{CounterStore, WriteBatch, WriteOp};

use crate::error::KvError;

/// Configuration for connecting to Redis.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL (e.g., `redis://127.0.0.1:6379/0`).
    pub url: String,
    /// Upper bound on each store call, including connection setup.
    pub op_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".into(),
            op_timeout: Duration::from_secs(3),
        }
    }
}

/// GETDEL `KEYS[1]`; if it held a value, replay the encoded batch in
/// ARGV. Batch keys travel in ARGV, so this assumes a single node.
const TAKE_AND_APPLY_LUA: &str = r#"
local taken = redis.call('GET', KEYS[1])
if not taken then
  return false
end
redis.call('DEL', KEYS[1])
local i = 1
while i <= #ARGV do
  local op = ARGV[i]
  if op == 'set' then
    redis.call('SET', ARGV[i + 1], ARGV[i + 2], 'PX', ARGV[i + 3])
    i = i + 4
  elseif op == 'pexpire' then
    redis.call('PEXPIRE', ARGV[i + 1], ARGV[i + 2])
    i = i + 3
  elseif op == 'sadd' then
    redis.call('SADD', ARGV[i + 1], ARGV[i + 2])
    i = i + 3
  elseif op == 'srem' then
    redis.call('SREM', ARGV[i + 1], ARGV[i + 2])
    i = i + 3
  elseif op == 'del' then
    redis.call('DEL', ARGV[i + 1])
    i = i + 2
  else
    return redis.error_reply('unknown batch op ' .. op)
  end
end
return taken
"#;

/// Redis-backed counter and session store.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: MultiplexedConnection,
    op_timeout: Duration,
    take_and_apply_script: Script,
}

/// Redis expiry in whole milliseconds, never zero.
fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl RedisCounterStore {
    /// Open a multiplexed connection and verify it with `PING`.
    pub async fn connect(config: &RedisConfig) -> Result<Self, KvError> {
        info!(url = %config.url, "Connecting to Redis");

        let client = Client::open(config.url.as_str())?;
        let conn = timeout(config.op_timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| KvError::Timeout(config.op_timeout))??;

        let store = Self {
            conn,
            op_timeout: config.op_timeout,
            take_and_apply_script: Script::new(TAKE_AND_APPLY_LUA),
        };
        let _: String = store.run(redis::cmd("PING")).await?;

        info!("Successfully connected to Redis");
        Ok(store)
    }

    async fn run<T: FromRedisValue>(&self, cmd: Cmd) -> Result<T, KvError> {
        let mut conn = self.conn.clone();
        timeout(self.op_timeout, cmd.query_async(&mut conn))
            .await
            .map_err(|_| KvError::Timeout(self.op_timeout))?
            .map_err(KvError::from)
    }

    async fn run_pipeline(&self, pipe: Pipeline) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let () = timeout(self.op_timeout, pipe.query_async(&mut conn))
            .await
            .map_err(|_| KvError::Timeout(self.op_timeout))??;
        Ok(())
    }
}

impl CounterStore for RedisCounterStore {
    async fn get(&self, key: &str) -> WardenResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        Ok(self.run(cmd).await?)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> WardenResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("PX").arg(millis(ttl));
        let () = self.run(cmd).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> WardenResult<i64> {
        let mut cmd = redis::cmd("INCR");
        cmd.arg(key);
        Ok(self.run(cmd).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> WardenResult<bool> {
        let mut cmd = redis::cmd("PEXPIRE");
        cmd.arg(key).arg(millis(ttl));
        Ok(self.run(cmd).await?)
    }

    async fn ttl(&self, key: &str) -> WardenResult<Option<Duration>> {
        let mut cmd = redis::cmd("PTTL");
        cmd.arg(key);
        // -2: missing, -1: no expiry.
        let remaining: i64 = self.run(cmd).await?;
        Ok(u64::try_from(remaining).ok().map(Duration::from_millis))
    }

    async fn add_to_set(&self, key: &str, member: &str) -> WardenResult<()> {
        let mut cmd = redis::cmd("SADD");
        cmd.arg(key).arg(member);
        let _: i64 = self.run(cmd).await?;
        Ok(())
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> WardenResult<()> {
        let mut cmd = redis::cmd("SREM");
        cmd.arg(key).arg(member);
        let _: i64 = self.run(cmd).await?;
        Ok(())
    }

    async fn members(&self, key: &str) -> WardenResult<Vec<String>> {
        let mut cmd = redis::cmd("SMEMBERS");
        cmd.arg(key);
        Ok(self.run(cmd).await?)
    }

    async fn delete(&self, keys: &[String]) -> WardenResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        Ok(self.run(cmd).await?)
    }

    async fn exists(&self, key: &str) -> WardenResult<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        Ok(self.run(cmd).await?)
    }

    async fn take(&self, key: &str) -> WardenResult<Option<String>> {
        // GETDEL needs Redis >= 6.2.
        let mut cmd = redis::cmd("GETDEL");
        cmd.arg(key);
        Ok(self.run(cmd).await?)
    }

    async fn apply(&self, batch: WriteBatch) -> WardenResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        debug!(ops = batch.len(), "Applying store batch");

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch.into_ops() {
            match op {
                WriteOp::SetWithTtl { key, value, ttl } => {
                    pipe.cmd("SET")
                        .arg(key)
                        .arg(value)
                        .arg("PX")
                        .arg(millis(ttl))
                        .ignore();
                }
                WriteOp::Expire { key, ttl } => {
                    pipe.cmd("PEXPIRE").arg(key).arg(millis(ttl)).ignore();
                }
                WriteOp::AddToSet { key, member } => {
                    pipe.cmd("SADD").arg(key).arg(member).ignore();
                }
                WriteOp::RemoveFromSet { key, member } => {
                    pipe.cmd("SREM").arg(key).arg(member).ignore();
                }
                WriteOp::Delete { key } => {
                    pipe.cmd("DEL").arg(key).ignore();
                }
            }
        }
        self.run_pipeline(pipe).await?;
        Ok(())
    }

    async fn take_and_apply(&self, key: &str, batch: WriteBatch) -> WardenResult<Option<String>> {
        let mut invocation = self.take_and_apply_script.key(key);
        for op in batch.into_ops() {
            match op {
                WriteOp::SetWithTtl { key, value, ttl } => {
                    invocation.arg("set").arg(key).arg(value).arg(millis(ttl));
                }
                WriteOp::Expire { key, ttl } => {
                    invocation.arg("pexpire").arg(key).arg(millis(ttl));
                }
                WriteOp::AddToSet { key, member } => {
                    invocation.arg("sadd").arg(key).arg(member);
                }
                WriteOp::RemoveFromSet { key, member } => {
                    invocation.arg("srem").arg(key).arg(member);
                }
                WriteOp::Delete { key } => {
                    invocation.arg("del").arg(key);
                }
            }
        }

        let mut conn = self.conn.clone();
        let taken: Option<String> = timeout(self.op_timeout, invocation.invoke_async(&mut conn))
            .await
            .map_err(|_| KvError::Timeout(self.op_timeout))?
            .map_err(KvError::from)?;
        Ok(taken)
    }
}
