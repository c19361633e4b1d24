//! SurrealDB implementation of [`AuditLogRepository`].
//!
//! The `audit_log` table denies UPDATE and DELETE at the schema level.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::audit::{AuditAction, AuditEvent, AuditLogEntry};
use warden_core::repository::AuditLogRepository;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AuditRow {
    record_id: String,
    action: String,
    user_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    timestamp: DateTime<Utc>,
}

impl AuditRow {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Corrupt(format!("invalid audit UUID: {e}")))?;
        let action = AuditAction::parse(&self.action)
            .ok_or_else(|| DbError::Corrupt(format!("unknown audit action: {}", self.action)))?;
        let user_id = self
            .user_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| DbError::Corrupt(format!("invalid user UUID: {e}")))?;
        Ok(AuditLogEntry {
            id,
            action,
            user_id,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            timestamp: self.timestamp,
        })
    }
}

/// SurrealDB implementation of the append-only audit log.
#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, event: AuditEvent) -> WardenResult<AuditLogEntry> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('audit_log', $id) SET \
                 action = $action, user_id = $user_id, \
                 ip_address = $ip_address, user_agent = $user_agent, \
                 timestamp = $timestamp",
            )
            .bind(("id", id_str.clone()))
            .bind(("action", event.action.as_str().to_string()))
            .bind(("user_id", event.user_id.map(|u| u.to_string())))
            .bind(("ip_address", event.ip_address.clone()))
            .bind(("user_agent", event.user_agent.clone()))
            .bind(("timestamp", event.timestamp))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(AuditLogEntry {
            id,
            action: event.action,
            user_id: event.user_id,
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            timestamp: event.timestamp,
        })
    }

    async fn list_for_user(&self, user_id: Uuid, limit: u64) -> WardenResult<Vec<AuditLogEntry>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM audit_log \
                 WHERE user_id = $user_id \
                 ORDER BY timestamp DESC LIMIT $limit",
            )
            .bind(("user_id", user_id.to_string()))
            .bind(("limit", limit))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AuditRow> = result.take(0).map_err(DbError::from)?;
        let entries = rows
            .into_iter()
            .map(AuditRow::try_into_entry)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
