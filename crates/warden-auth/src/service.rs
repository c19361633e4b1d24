//! Credential issuer: login, refresh rotation, revocation and the
//! account flows built on them.
//!
//! Every failure a client could use as an oracle (unknown account,
//! wrong password, expired, forged or replayed refresh token) surfaces
//! as `InvalidCredentials`. Logs keep the distinction.

use std::fmt;

use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::account::{Account, CreateAccount, Role, normalize_email};
use warden_core::models::audit::AuditAction;
use warden_core::models::session::SessionSummary;
use warden_core::repository::AccountRepository;
use warden_core::store::CounterStore;

use crate::audit::AuditSink;
use crate::config::AuthConfig;
use crate::device::ClientContext;
use crate::error::AuthError;
use crate::guard::{AbuseGuard, RateLimitScope};
use crate::password;
use crate::registry::{Rotation, SessionRegistry};
use crate::reset::PasswordResetStore;
use crate::token::{AccessClaims, JwtCodec};

/// Credentials handed to the boundary layer after login or refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Signed access token.
    pub access_token: String,
    /// Signed refresh token bound to one session.
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Refresh token lifetime in seconds, for cookie max-age.
    pub refresh_ttl: u64,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

/// Orchestrates the credential lifecycle.
///
/// Generic over the account repository and the counter store so that
/// the auth layer has no dependency on either backend.
pub struct CredentialIssuer<A: AccountRepository, S: CounterStore + Clone> {
    accounts: A,
    guard: AbuseGuard<S>,
    sessions: SessionRegistry<S>,
    resets: PasswordResetStore<S>,
    codec: JwtCodec,
    audit: AuditSink,
    config: AuthConfig,
}

impl<A: AccountRepository, S: CounterStore + Clone> CredentialIssuer<A, S> {
    /// Build an issuer. Fails if `config` does not validate.
    pub fn new(accounts: A, store: S, audit: AuditSink, config: AuthConfig) -> WardenResult<Self> {
        config.validate()?;
        Ok(Self {
            accounts,
            guard: AbuseGuard::from_config(store.clone(), &config),
            sessions: SessionRegistry::new(store.clone()),
            resets: PasswordResetStore::new(store, config.password_reset_ttl),
            codec: JwtCodec::from_config(&config),
            audit,
            config,
        })
    }

    pub fn guard(&self) -> &AbuseGuard<S> {
        &self.guard
    }

    pub fn sessions(&self) -> &SessionRegistry<S> {
        &self.sessions
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn mint(&self, account: &Account, session_id: Uuid) -> WardenResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.codec.issue_access(account)?,
            refresh_token: self.codec.issue_refresh(account.id, session_id)?,
            expires_in: self.codec.access_ttl().as_secs(),
            refresh_ttl: self.codec.refresh_ttl().as_secs(),
        })
    }

    /// Authenticate with email and password and open a new session.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: &ClientContext,
    ) -> WardenResult<TokenPair> {
        self.guard
            .enforce(
                RateLimitScope::Login,
                client.rate_key(),
                self.config.login_rate_limit,
            )
            .await?;

        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(WardenError::invalid_input("email and password are required"));
        }

        // Credential-blind: a locked account rejects even the right password.
        if self.guard.is_locked(&email).await? {
            debug!("Login attempt against locked account");
            self.audit.log(AuditAction::AccountLocked, None, client);
            return Err(AuthError::AccountLocked.into());
        }

        let account = self.accounts.find_by_email(&email).await?;
        let verified = match &account {
            Some(account) => password::verify_password(
                password,
                &account.password_hash,
                self.config.pepper.as_deref(),
            )?,
            None => false,
        };

        let account = match account {
            Some(account) if verified => account,
            other => {
                let user_id = other.map(|a| a.id);
                let outcome = self.guard.record_failed_login(&email).await?;
                debug!(user_id = ?user_id, attempts = outcome.attempts, "Login failed");
                self.audit.log(AuditAction::LoginFailed, user_id, client);
                if outcome.locked {
                    self.audit.log(AuditAction::AccountLocked, user_id, client);
                }
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        self.guard.clear_failed_login(&email).await?;

        let session_id = Uuid::new_v4();
        let pair = self.mint(&account, session_id)?;
        self.sessions
            .create(
                session_id,
                account.id,
                self.config.refresh_token_ttl,
                client.client_info(),
            )
            .await?;

        info!(user_id = %account.id, session_id = %session_id, "Login succeeded");
        self.audit
            .log(AuditAction::LoginSuccess, Some(account.id), client);
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair, rotating its session.
    ///
    /// A token whose session is already gone is treated as replayed:
    /// the attempt is audited and no session is created.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientContext,
    ) -> WardenResult<TokenPair> {
        self.guard
            .enforce(
                RateLimitScope::Refresh,
                client.rate_key(),
                self.config.refresh_rate_limit,
            )
            .await?;

        if refresh_token.is_empty() {
            return Err(WardenError::invalid_input("refresh token is required"));
        }

        let claims = self.codec.decode_refresh(refresh_token).map_err(|e| {
            debug!(error = %e, "Refresh token rejected");
            WardenError::from(e)
        })?;

        let account = match self.accounts.get_by_id(claims.sub).await {
            Ok(account) => account,
            Err(WardenError::NotFound { .. }) => {
                debug!(user_id = %claims.sub, "Refresh for deleted account");
                self.sessions.delete_all_for_user(claims.sub, None).await?;
                return Err(AuthError::InvalidCredentials.into());
            }
            Err(e) => return Err(e),
        };

        let new_id = Uuid::new_v4();
        let pair = self.mint(&account, new_id)?;
        let rotation = self
            .sessions
            .rotate(
                claims.sid,
                claims.sub,
                new_id,
                self.config.refresh_token_ttl,
                client.client_info(),
            )
            .await?;

        match rotation {
            Rotation::Rotated(_) => {
                debug!(user_id = %account.id, session_id = %new_id, "Refresh token rotated");
                Ok(pair)
            }
            Rotation::Missing => {
                warn!(
                    user_id = %claims.sub,
                    session_id = %claims.sid,
                    "Refresh token reuse detected"
                );
                self.audit
                    .log(AuditAction::RefreshTokenReuseDetected, Some(claims.sub), client);
                Err(AuthError::InvalidCredentials.into())
            }
            Rotation::OwnerMismatch => {
                warn!(session_id = %claims.sid, "Session owner does not match token subject");
                Err(AuthError::InvalidCredentials.into())
            }
        }
    }

    /// End the session behind `refresh_token`. Invalid, expired or
    /// already-revoked tokens are a silent no-op.
    pub async fn logout(&self, refresh_token: &str, client: &ClientContext) -> WardenResult<()> {
        let claims = match self.codec.decode_refresh(refresh_token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Logout with unusable token ignored");
                return Ok(());
            }
        };

        if self.sessions.delete(claims.sid, claims.sub).await? {
            info!(user_id = %claims.sub, session_id = %claims.sid, "Logged out");
            self.audit.log(AuditAction::Logout, Some(claims.sub), client);
        }
        Ok(())
    }

    /// Revoke one session of `user_id` by ID, e.g. from a session list.
    /// A session owned by someone else is rejected without touching it.
    pub async fn revoke_session(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        client: &ClientContext,
    ) -> WardenResult<()> {
        match self.sessions.get_owner(session_id).await? {
            None => {
                return Err(WardenError::NotFound {
                    entity: "session".into(),
                    id: session_id.to_string(),
                });
            }
            Some(owner) if owner != user_id => {
                warn!(
                    user_id = %user_id,
                    session_id = %session_id,
                    "Revoke of a session owned by another user"
                );
                return Err(AuthError::InvalidCredentials.into());
            }
            Some(_) => {}
        }

        if self.sessions.delete(session_id, user_id).await? {
            info!(user_id = %user_id, session_id = %session_id, "Session revoked");
            self.audit.log(AuditAction::Logout, Some(user_id), client);
        }
        Ok(())
    }

    /// Revoke every session of `user_id`, keeping the one behind
    /// `current_refresh_token` if it belongs to that user. Returns the
    /// number of sessions revoked.
    pub async fn logout_all_sessions(
        &self,
        user_id: Uuid,
        current_refresh_token: Option<&str>,
        client: &ClientContext,
    ) -> WardenResult<usize> {
        let keep = current_refresh_token
            .and_then(|token| self.codec.decode_refresh(token).ok())
            .filter(|claims| claims.sub == user_id)
            .map(|claims| claims.sid);

        let removed = self.sessions.delete_all_for_user(user_id, keep).await?;
        info!(user_id = %user_id, removed, kept = keep.is_some(), "Logged out everywhere");
        self.audit.log(AuditAction::LogoutAll, Some(user_id), client);
        Ok(removed)
    }

    pub async fn list_sessions(&self, user_id: Uuid) -> WardenResult<Vec<SessionSummary>> {
        self.sessions.list_for_user(user_id).await
    }

    /// Create an account. The email must be unused.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: Role,
        client: &ClientContext,
    ) -> WardenResult<Account> {
        self.guard
            .enforce(
                RateLimitScope::Register,
                client.rate_key(),
                self.config.register_rate_limit,
            )
            .await?;

        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(WardenError::invalid_input("email and password are required"));
        }
        if !is_plausible_email(&email) {
            return Err(WardenError::invalid_input("invalid email address"));
        }
        self.check_password_policy(password)?;

        if self.accounts.find_by_email(&email).await?.is_some() {
            return Err(WardenError::AccountExists);
        }

        let password_hash = password::hash_password(password, self.config.pepper.as_deref())?;
        let account = self
            .accounts
            .create(CreateAccount {
                email,
                password_hash,
                role,
            })
            .await?;

        info!(user_id = %account.id, role = %account.role, "Account registered");
        self.audit
            .log(AuditAction::Registered, Some(account.id), client);
        Ok(account)
    }

    pub async fn list_accounts(&self) -> WardenResult<Vec<Account>> {
        self.accounts.list_all().await
    }

    pub async fn list_accounts_by_role(&self, role: Role) -> WardenResult<Vec<Account>> {
        self.accounts.list_by_role(role).await
    }

    /// Stateless access-token check: signature, expiry, issuer and kind.
    pub fn verify_access(&self, access_token: &str) -> WardenResult<AccessClaims> {
        self.codec.decode_access(access_token).map_err(|e| {
            debug!(error = %e, "Access token rejected");
            WardenError::from(e)
        })
    }

    /// Issue a reset token for `email`. `Ok(None)` for unknown
    /// addresses; callers must respond identically in both cases.
    pub async fn request_password_reset(&self, email: &str) -> WardenResult<Option<String>> {
        let email = normalize_email(email);
        match self.accounts.find_by_email(&email).await? {
            Some(account) => self.resets.issue(account.id).await.map(Some),
            None => {
                debug!("Password reset requested for unknown account");
                Ok(None)
            }
        }
    }

    /// Redeem a reset token, set the new password and revoke every
    /// session of the account.
    pub async fn reset_password(
        &self,
        reset_token: &str,
        new_password: &str,
        client: &ClientContext,
    ) -> WardenResult<()> {
        self.check_password_policy(new_password)?;

        let Some(user_id) = self.resets.consume(reset_token).await? else {
            return Err(AuthError::InvalidCredentials.into());
        };

        let password_hash = password::hash_password(new_password, self.config.pepper.as_deref())?;
        self.accounts
            .update_password_hash(user_id, password_hash)
            .await?;
        let removed = self.sessions.delete_all_for_user(user_id, None).await?;

        info!(user_id = %user_id, removed, "Password reset");
        self.audit
            .log(AuditAction::PasswordReset, Some(user_id), client);
        Ok(())
    }

    fn check_password_policy(&self, password: &str) -> WardenResult<()> {
        if password.chars().count() < self.config.min_password_length {
            return Err(WardenError::invalid_input(format!(
                "password must be at least {} characters",
                self.config.min_password_length
            )));
        }
        Ok(())
    }
}
