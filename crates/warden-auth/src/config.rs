//! Authentication configuration.

use std::time::Duration;

use warden_core::error::{WardenError, WardenResult};

/// Fixed-window limit for one endpoint class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Requests allowed per window.
    pub max: u32,
    /// Window length, started by the first request.
    pub window: Duration,
}

impl RateLimitPolicy {
    pub const fn new(max: u32, window: Duration) -> Self {
        Self { max, window }
    }
}

/// Configuration for the credential issuer and everything under it.
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC secret for access tokens.
    pub access_token_secret: String,
    /// HMAC secret for refresh tokens. Must differ from the access secret.
    pub refresh_token_secret: String,
    /// Access token lifetime (default: 15 minutes).
    pub access_token_ttl: Duration,
    /// Refresh token and session lifetime (default: 7 days).
    pub refresh_token_ttl: Duration,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Optional pepper prepended to passwords before Argon2id hashing.
    pub pepper: Option<String>,
    /// Minimum password length for registration and reset.
    pub min_password_length: usize,
    /// Failed logins within `fail_window` that trigger a lock (default: 5).
    pub max_failed_logins: u32,
    /// Failed-login counting window (default: 10 minutes).
    pub fail_window: Duration,
    /// Lock duration once the threshold is hit (default: 15 minutes).
    pub lock_duration: Duration,
    pub login_rate_limit: RateLimitPolicy,
    pub register_rate_limit: RateLimitPolicy,
    pub refresh_rate_limit: RateLimitPolicy,
    /// Password-reset token lifetime (default: 30 minutes).
    pub password_reset_ttl: Duration,
    /// Bounded capacity of the audit queue.
    pub audit_queue_capacity: usize,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token_secret", &"<redacted>")
            .field("refresh_token_secret", &"<redacted>")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("pepper", &self.pepper.as_ref().map(|_| "<redacted>"))
            .field("min_password_length", &self.min_password_length)
            .field("max_failed_logins", &self.max_failed_logins)
            .field("fail_window", &self.fail_window)
            .field("lock_duration", &self.lock_duration)
            .field("login_rate_limit", &self.login_rate_limit)
            .field("register_rate_limit", &self.register_rate_limit)
            .field("refresh_rate_limit", &self.refresh_rate_limit)
            .field("password_reset_ttl", &self.password_reset_ttl)
            .field("audit_queue_capacity", &self.audit_queue_capacity)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_secret: String::new(),
            refresh_token_secret: String::new(),
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            jwt_issuer: "warden".into(),
            pepper: None,
            min_password_length: 8,
            max_failed_logins: 5,
            fail_window: Duration::from_secs(10 * 60),
            lock_duration: Duration::from_secs(15 * 60),
            login_rate_limit: RateLimitPolicy::new(10, Duration::from_secs(60)),
            register_rate_limit: RateLimitPolicy::new(5, Duration::from_secs(60 * 60)),
            refresh_rate_limit: RateLimitPolicy::new(30, Duration::from_secs(60)),
            password_reset_ttl: Duration::from_secs(30 * 60),
            audit_queue_capacity: 1024,
        }
    }
}

impl AuthConfig {
    /// Reject configurations the core cannot run with.
    pub fn validate(&self) -> WardenResult<()> {
        if self.access_token_secret.is_empty() || self.refresh_token_secret.is_empty() {
            return Err(WardenError::invalid_input("token secrets must be set"));
        }
        if self.access_token_secret == self.refresh_token_secret {
            return Err(WardenError::invalid_input(
                "access and refresh secrets must differ",
            ));
        }
        let durations = [
            ("access_token_ttl", self.access_token_ttl),
            ("refresh_token_ttl", self.refresh_token_ttl),
            ("fail_window", self.fail_window),
            ("lock_duration", self.lock_duration),
            ("password_reset_ttl", self.password_reset_ttl),
            ("login_rate_limit.window", self.login_rate_limit.window),
            ("register_rate_limit.window", self.register_rate_limit.window),
            ("refresh_rate_limit.window", self.refresh_rate_limit.window),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(WardenError::invalid_input(format!("{name} must be non-zero")));
        }
        if self.max_failed_logins == 0 {
            return Err(WardenError::invalid_input(
                "max_failed_logins must be non-zero",
            ));
        }
        if self.audit_queue_capacity == 0 {
            return Err(WardenError::invalid_input(
                "audit_queue_capacity must be non-zero",
            ));
        }
        Ok(())
    }
}
