//! SurrealDB repository implementations.

mod account;
mod audit;

pub use account::SurrealAccountRepository;
pub use audit::SurrealAuditLogRepository;
