//! Warden Database — SurrealDB connection management, schema migrations
//! and repository implementations for accounts and the audit log.
//!
//! Sessions, counters and locks do not live here; see `warden-kv`.

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::{run_migrations, schema_v1};
