//! Audit log domain model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    LoginSuccess,
    LoginFailed,
    AccountLocked,
    Logout,
    LogoutAll,
    RefreshTokenReuseDetected,
    Registered,
    PasswordReset,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LoginSuccess => "LOGIN_SUCCESS",
            AuditAction::LoginFailed => "LOGIN_FAILED",
            AuditAction::AccountLocked => "ACCOUNT_LOCKED",
            AuditAction::Logout => "LOGOUT",
            AuditAction::LogoutAll => "LOGOUT_ALL",
            AuditAction::RefreshTokenReuseDetected => "REFRESH_TOKEN_REUSE_DETECTED",
            AuditAction::Registered => "REGISTERED",
            AuditAction::PasswordReset => "PASSWORD_RESET",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        const ALL: [AuditAction; 8] = [
            AuditAction::LoginSuccess,
            AuditAction::LoginFailed,
            AuditAction::AccountLocked,
            AuditAction::Logout,
            AuditAction::LogoutAll,
            AuditAction::RefreshTokenReuseDetected,
            AuditAction::Registered,
            AuditAction::PasswordReset,
        ];
        ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A security event as submitted to the audit sink. Carries no secrets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        action: AuditAction,
        user_id: Option<Uuid>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            action,
            user_id,
            ip_address,
            user_agent,
            timestamp: Utc::now(),
        }
    }
}

/// A persisted audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}
