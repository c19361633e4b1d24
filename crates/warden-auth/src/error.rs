//! Authentication error types.

use thiserror::Error;
use warden_core::error::WardenError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is locked")]
    AccountLocked,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("token is not a {expected} token")]
    WrongTokenKind { expected: &'static str },

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for WardenError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AccountLocked => WardenError::AccountLocked,
            // Expired, forged and mistyped tokens share one surface.
            AuthError::InvalidCredentials
            | AuthError::TokenExpired
            | AuthError::TokenInvalid(_)
            | AuthError::WrongTokenKind { .. } => WardenError::InvalidCredentials,
            AuthError::Crypto(msg) => WardenError::Crypto(msg),
        }
    }
}
