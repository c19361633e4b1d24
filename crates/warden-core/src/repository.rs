//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Implementations live in
//! `warden-db`; the auth layer is generic over these traits.

use uuid::Uuid;

use crate::error::WardenResult;
use crate::models::{
    account::{Account, CreateAccount, Role},
    audit::{AuditEvent, AuditLogEntry},
};

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

pub trait AccountRepository: Send + Sync {
    /// Create an account. Fails with `AccountExists` if the email is taken.
    fn create(&self, input: CreateAccount) -> impl Future<Output = WardenResult<Account>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<Account>> + Send;
    /// Look up by normalized email. `Ok(None)` when no such account.
    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = WardenResult<Option<Account>>> + Send;
    fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: String,
    ) -> impl Future<Output = WardenResult<()>> + Send;
    fn list_all(&self) -> impl Future<Output = WardenResult<Vec<Account>>> + Send;
    fn list_by_role(&self, role: Role) -> impl Future<Output = WardenResult<Vec<Account>>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

pub trait AuditLogRepository: Send + Sync {
    /// Append a new audit log entry. No update or delete operations exist.
    fn append(&self, event: AuditEvent) -> impl Future<Output = WardenResult<AuditLogEntry>> + Send;
    /// Most recent entries for a user, newest first.
    fn list_for_user(
        &self,
        user_id: Uuid,
        limit: u64,
    ) -> impl Future<Output = WardenResult<Vec<AuditLogEntry>>> + Send;
}
