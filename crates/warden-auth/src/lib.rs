//! Warden Auth — the session and credential lifecycle.
//!
//! [`CredentialIssuer`] drives login, refresh-token rotation with reuse
//! detection, logout and bulk revocation on top of [`AbuseGuard`]
//! (rate limiting and lockout) and [`SessionRegistry`] (session records
//! plus the per-user index). Security events go to a non-blocking
//! [`AuditSink`].

pub mod audit;
pub mod config;
pub mod csrf;
pub mod device;
pub mod error;
pub mod guard;
pub mod password;
pub mod registry;
pub mod reset;
pub mod service;
pub mod token;

pub use audit::{AuditSink, AuditWriter, RepositoryAuditWriter, TracingAuditWriter};
pub use config::{AuthConfig, RateLimitPolicy};
pub use device::ClientContext;
pub use error::AuthError;
pub use guard::{AbuseGuard, RateLimitDecision, RateLimitScope};
pub use registry::{Rotation, SessionRegistry};
pub use reset::PasswordResetStore;
pub use service::{CredentialIssuer, TokenPair};
pub use token::{AccessClaims, JwtCodec, RefreshClaims, TokenClaims};
