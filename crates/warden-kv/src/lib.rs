//! Warden KV — counter/session store adapters.
//!
//! This crate provides:
//! - [`RedisCounterStore`]: the production adapter over Redis, with
//!   `MULTI`/`EXEC` batches and a per-call timeout
//! - [`MemoryCounterStore`]: a process-local adapter with the same
//!   semantics, used by tests and single-node development
//! - Error types ([`KvError`])

mod error;
mod memory;
mod redis_store;

pub use error::KvError;
pub use memory::MemoryCounterStore;
pub use redis_store::{RedisConfig, RedisCounterStore};
