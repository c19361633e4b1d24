//! Warden Core — shared error type, domain models, and the storage
//! contracts the credential lifecycle is built on.
//!
//! This crate performs no I/O. Storage backends live in `warden-kv`
//! (counters and sessions) and `warden-db` (accounts and audit log).

pub mod error;
pub mod models;
pub mod repository;
pub mod store;

pub use error::{WardenError, WardenResult};
