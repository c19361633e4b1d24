//! Counter/session store contract.
//!
//! A thin interface over a key/value store with per-key expiry, atomic
//! increment and string sets. Multi-key mutations go through
//! [`CounterStore::apply`] so that either every key changes or none do.
//!
//! Implementations must report unreachable or timed-out backends as
//! [`WardenError::StoreUnavailable`](crate::error::WardenError) and must
//! never turn such a failure into an empty read.

use std::time::Duration;

use crate::error::WardenResult;

/// One write inside an atomic [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    SetWithTtl {
        key: String,
        value: String,
        ttl: Duration,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    AddToSet {
        key: String,
        member: String,
    },
    RemoveFromSet {
        key: String,
        member: String,
    },
    Delete {
        key: String,
    },
}

/// An ordered group of writes applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_with_ttl(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        self.ops.push(WriteOp::SetWithTtl {
            key: key.into(),
            value: value.into(),
            ttl,
        });
        self
    }

    pub fn expire(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.ops.push(WriteOp::Expire {
            key: key.into(),
            ttl,
        });
        self
    }

    pub fn add_to_set(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::AddToSet {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn remove_from_set(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.ops.push(WriteOp::RemoveFromSet {
            key: key.into(),
            member: member.into(),
        });
        self
    }

    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

pub trait CounterStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = WardenResult<Option<String>>> + Send;

    fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = WardenResult<()>> + Send;

    /// Atomically increment, creating the key at 0 first if absent.
    /// Returns the post-increment value. Does not touch the key's TTL.
    fn incr(&self, key: &str) -> impl Future<Output = WardenResult<i64>> + Send;

    /// Set a key's TTL. Returns `false` if the key does not exist.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = WardenResult<bool>> + Send;

    /// Remaining lifetime. `None` if the key is absent or has no expiry.
    fn ttl(&self, key: &str) -> impl Future<Output = WardenResult<Option<Duration>>> + Send;

    fn add_to_set(&self, key: &str, member: &str) -> impl Future<Output = WardenResult<()>> + Send;

    fn remove_from_set(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = WardenResult<()>> + Send;

    fn members(&self, key: &str) -> impl Future<Output = WardenResult<Vec<String>>> + Send;

    /// Delete keys, returning how many existed.
    fn delete(&self, keys: &[String]) -> impl Future<Output = WardenResult<u64>> + Send;

    fn exists(&self, key: &str) -> impl Future<Output = WardenResult<bool>> + Send;

    /// Read and delete a string key in one step.
    fn take(&self, key: &str) -> impl Future<Output = WardenResult<Option<String>>> + Send;

    /// Apply a batch atomically.
    fn apply(&self, batch: WriteBatch) -> impl Future<Output = WardenResult<()>> + Send;

    /// Read and delete the string at `key` and, only if it was present,
    /// apply `batch`, all in one atomic step. Returns the taken value;
    /// on `None` nothing was written.
    fn take_and_apply(
        &self,
        key: &str,
        batch: WriteBatch,
    ) -> impl Future<Output = WardenResult<Option<String>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_preserves_order() {
        let batch = WriteBatch::new()
            .set_with_ttl("session:a", "{}", Duration::from_secs(60))
            .add_to_set("user_sessions:u", "a")
            .expire("user_sessions:u", Duration::from_secs(60));

        assert_eq!(batch.len(), 3);
        assert!(matches!(batch.ops()[0], WriteOp::SetWithTtl { .. }));
        assert!(matches!(batch.ops()[2], WriteOp::Expire { .. }));
    }

    #[test]
    fn empty_batch() {
        assert!(WriteBatch::new().is_empty());
    }
}
