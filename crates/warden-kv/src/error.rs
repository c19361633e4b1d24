//! Store-adapter error types and conversions.

use std::time::Duration;

use warden_core::error::WardenError;

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Wrong value type at key {0}")]
    WrongType(String),

    #[error("Value at key {0} is not an integer")]
    NotAnInteger(String),
}

impl From<KvError> for WardenError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::Redis(_) | KvError::Timeout(_) => {
                WardenError::StoreUnavailable(err.to_string())
            }
            KvError::WrongType(_) | KvError::NotAnInteger(_) => {
                WardenError::Internal(err.to_string())
            }
        }
    }
}
