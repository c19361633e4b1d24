//! Single-use password-reset tokens.
//!
//! Only the SHA-256 of a token is used as the key
//! (`pwd_reset:{hash}`), so a store dump cannot be replayed.

use std::time::Duration;

use tracing::debug;
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::store::CounterStore;

use crate::token::{generate_opaque_token, hash_opaque_token};

pub fn reset_key(raw_token: &str) -> String {
    format!("pwd_reset:{}", hash_opaque_token(raw_token))
}

#[derive(Clone)]
pub struct PasswordResetStore<S: CounterStore> {
    store: S,
    ttl: Duration,
}

impl<S: CounterStore> PasswordResetStore<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Create a reset token for `user_id`. The raw token is returned
    /// once and never stored.
    pub async fn issue(&self, user_id: Uuid) -> WardenResult<String> {
        let raw = generate_opaque_token();
        self.store
            .set_with_ttl(&reset_key(&raw), &user_id.to_string(), self.ttl)
            .await?;
        debug!(user_id = %user_id, "Password reset token issued");
        Ok(raw)
    }

    /// Redeem a token. `Ok(None)` if it is unknown, expired or used.
    pub async fn consume(&self, raw_token: &str) -> WardenResult<Option<Uuid>> {
        let Some(value) = self.store.take(&reset_key(raw_token)).await? else {
            return Ok(None);
        };
        Uuid::parse_str(&value)
            .map(Some)
            .map_err(|e| WardenError::Internal(format!("reset token owner: {e}")))
    }

    pub async fn revoke(&self, raw_token: &str) -> WardenResult<()> {
        self.store.delete(&[reset_key(raw_token)]).await?;
        Ok(())
    }
}
