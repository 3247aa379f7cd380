//! Named distributed locks backed by Redis.
//!
//! Non-idempotent platform operations (summary comment creation, automerge)
//! are serialized across workers with these locks. Acquisition blocks for a
//! very short window only; a contended lock means another worker is already
//! doing the same work, so callers log and move on.

use async_trait::async_trait;
use log::debug;
use redis::aio::ConnectionManager;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long a held lock survives if its owner dies before releasing.
const LOCK_EXPIRY: Duration = Duration::from_secs(30);

/// Blocking window when acquiring.
const ACQUIRE_TIMEOUT: Duration = Duration::from_millis(100);
const ACQUIRE_RETRY_SLEEP: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum LockError {
    #[error("lock `{0}` is unavailable")]
    Unavailable(String),

    #[error("lock backend error: `{0}`")]
    Backend(String),
}

impl From<redis::RedisError> for LockError {
    fn from(error: redis::RedisError) -> Self {
        LockError::Backend(error.to_string())
    }
}

/// Proof of lock ownership, passed back on release.
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    token: String,
}

#[async_trait]
pub trait LockClient: Send + Sync {
    async fn ping(&self) -> Result<bool, LockError>;

    /// Acquire a named lock, blocking for at most ~100 ms.
    async fn acquire(&self, key: &str) -> Result<LockGuard, LockError>;

    async fn release(&self, guard: LockGuard) -> Result<(), LockError>;
}

pub struct RedisLockClient {
    connection: ConnectionManager,
}

impl RedisLockClient {
    pub async fn connect(url: &str) -> Result<Self, LockError> {
        let client = redis::Client::open(url).map_err(LockError::from)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl LockClient for RedisLockClient {
    async fn ping(&self) -> Result<bool, LockError> {
        let mut connection = self.connection.clone();
        let pong: String = redis::cmd("PING").query_async(&mut connection).await?;

        Ok(pong == "PONG")
    }

    async fn acquire(&self, key: &str) -> Result<LockGuard, LockError> {
        let mut connection = self.connection.clone();
        let token = format!("{:x}", rand::random::<u128>());
        let deadline = Instant::now() + ACQUIRE_TIMEOUT;

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(LOCK_EXPIRY.as_millis() as u64)
                .query_async(&mut connection)
                .await?;

            if acquired.is_some() {
                debug!("acquired lock `{}`", key);
                return Ok(LockGuard {
                    key: key.to_owned(),
                    token,
                });
            }

            if Instant::now() >= deadline {
                return Err(LockError::Unavailable(key.to_owned()));
            }

            tokio::time::sleep(ACQUIRE_RETRY_SLEEP).await;
        }
    }

    async fn release(&self, guard: LockGuard) -> Result<(), LockError> {
        // Only delete the key if we still own it.
        let script = redis::Script::new(
            r#"
            if redis.call("get", KEYS[1]) == ARGV[1] then
                return redis.call("del", KEYS[1])
            else
                return 0
            end
            "#,
        );

        let mut connection = self.connection.clone();
        let _: i64 = script
            .key(&guard.key)
            .arg(&guard.token)
            .invoke_async(&mut connection)
            .await?;

        debug!("released lock `{}`", guard.key);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_lock {
    use super::*;
    use std::{collections::HashSet, sync::Mutex};

    /// In-memory lock used by unit tests. Keys listed in `contended` always
    /// fail to acquire.
    #[derive(Default)]
    pub struct MemoryLockClient {
        pub contended: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl LockClient for MemoryLockClient {
        async fn ping(&self) -> Result<bool, LockError> {
            Ok(true)
        }

        async fn acquire(&self, key: &str) -> Result<LockGuard, LockError> {
            if self.contended.lock().unwrap().contains(key) {
                return Err(LockError::Unavailable(key.to_owned()));
            }

            Ok(LockGuard {
                key: key.to_owned(),
                token: "test".to_owned(),
            })
        }

        async fn release(&self, _guard: LockGuard) -> Result<(), LockError> {
            Ok(())
        }
    }
}
