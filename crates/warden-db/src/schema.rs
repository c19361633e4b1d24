//! Account and audit tables, and the versioned steps that create them.
//!
//! The applied version lives in the single record
//! `schema_version:current`. Each step's DDL and the version bump go to
//! the server as one request.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

/// Accounts and the append-only audit log.
const SCHEMA_V1: &str = "\
DEFINE TABLE account SCHEMAFULL;
DEFINE FIELD email ON TABLE account TYPE string;
DEFINE FIELD password_hash ON TABLE account TYPE string;
DEFINE FIELD role ON TABLE account TYPE string \
    ASSERT $value IN ['admin', 'user'];
DEFINE FIELD created_at ON TABLE account TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE account TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_account_email ON TABLE account \
    COLUMNS email UNIQUE;
DEFINE INDEX idx_account_role ON TABLE account COLUMNS role;

DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD action ON TABLE audit_log TYPE string \
    ASSERT $value IN ['LOGIN_SUCCESS', 'LOGIN_FAILED', 'ACCOUNT_LOCKED', \
        'LOGOUT', 'LOGOUT_ALL', 'REFRESH_TOKEN_REUSE_DETECTED', \
        'REGISTERED', 'PASSWORD_RESET'];
DEFINE FIELD user_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD ip_address ON TABLE audit_log TYPE option<string>;
DEFINE FIELD user_agent ON TABLE audit_log TYPE option<string>;
DEFINE FIELD timestamp ON TABLE audit_log TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_user_time ON TABLE audit_log \
    COLUMNS user_id, timestamp;
";

/// Schema steps, by ascending version.
const STEPS: &[(u32, &str)] = &[(1, SCHEMA_V1)];

#[derive(Debug, SurrealValue)]
struct SchemaVersion {
    version: u32,
}

async fn applied_version<C: Connection>(db: &Surreal<C>) -> Result<u32, DbError> {
    let mut response = db.query("SELECT version FROM schema_version:current").await?;
    let rows: Vec<SchemaVersion> = response.take(0)?;
    Ok(rows.first().map_or(0, |row| row.version))
}

/// Bring the Warden tables up to the latest version. Safe to call on
/// every start.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    let from = applied_version(db).await?;

    for &(version, ddl) in STEPS.iter().filter(|(version, _)| *version > from) {
        db.query(ddl)
            .query("UPSERT schema_version:current SET version = $version")
            .bind(("version", version))
            .await?
            .check()
            .map_err(|e| DbError::Migration(format!("schema v{version}: {e}")))?;
        info!(version, "Schema upgraded");
    }

    Ok(())
}

/// DDL of the first schema version, for tests that set up tables by hand.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
