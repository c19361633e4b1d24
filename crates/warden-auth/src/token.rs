//! Signed token issuance and verification (HS256).
//!
//! Access and refresh tokens are signed with separate secrets and carry
//! a `typ` tag, so each decodes into exactly one variant of
//! [`TokenClaims`]. Refresh tokens name a session; they are never
//! stored, only their session identifier is.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use warden_core::models::account::{Account, Role};

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Claims of a short-lived access token. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: account ID.
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iss: String,
    /// Issued-at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Unique token ID.
    pub jti: Uuid,
}

impl AccessClaims {
    /// True if the token's role is one of `allowed`.
    pub fn has_role(&self, allowed: &[Role]) -> bool {
        allowed.contains(&self.role)
    }
}

/// Claims of a refresh token, bound to one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject: account ID.
    pub sub: Uuid,
    /// Session this token may rotate.
    pub sid: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "lowercase")]
pub enum TokenClaims {
    Access(AccessClaims),
    Refresh(RefreshClaims),
}

fn secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

/// HS256 encoder/decoder for both token kinds.
#[derive(Clone)]
pub struct JwtCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtCodec {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        issuer: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.as_bytes()),
            issuer: issuer.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.access_token_secret,
            &config.refresh_token_secret,
            config.jwt_issuer.clone(),
            config.access_token_ttl,
            config.refresh_token_ttl,
        )
    }

    /// Mint an access token for `account`.
    pub fn issue_access(&self, account: &Account) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = TokenClaims::Access(AccessClaims {
            sub: account.id,
            email: account.email.clone(),
            role: account.role,
            iss: self.issuer.clone(),
            iat: now,
            exp: now.saturating_add(secs(self.access_ttl)),
            jti: Uuid::new_v4(),
        });
        self.encode(&claims, &self.access_encoding)
    }

    /// Mint a refresh token bound to session `sid`.
    pub fn issue_refresh(&self, user_id: Uuid, sid: Uuid) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = TokenClaims::Refresh(RefreshClaims {
            sub: user_id,
            sid,
            iss: self.issuer.clone(),
            iat: now,
            exp: now.saturating_add(secs(self.refresh_ttl)),
        });
        self.encode(&claims, &self.refresh_encoding)
    }

    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        match self.decode(token, &self.access_decoding)? {
            TokenClaims::Access(claims) => Ok(claims),
            TokenClaims::Refresh(_) => Err(AuthError::WrongTokenKind { expected: "access" }),
        }
    }

    pub fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        match self.decode(token, &self.refresh_decoding)? {
            TokenClaims::Refresh(claims) => Ok(claims),
            TokenClaims::Access(_) => Err(AuthError::WrongTokenKind { expected: "refresh" }),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn encode(&self, claims: &TokenClaims, key: &EncodingKey) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, key)
            .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))
    }

    fn decode(&self, token: &str, key: &DecodingKey) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);

        jsonwebtoken::decode::<TokenClaims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid(e.to_string()),
            })
    }
}

/// Generate a cryptographically random opaque token
/// (32 bytes → base64url-encoded, no padding).
pub fn generate_opaque_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 hash of an opaque token, hex-encoded. Used as a store key so
/// the raw token is never persisted.
pub fn hash_opaque_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
