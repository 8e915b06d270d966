pub mod identity;
pub mod payment;
pub mod pii;
pub mod signature;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes surfaced at every boundary of the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    OutOfStock,
    Unauthorized,
    Forbidden,
    NotFound,
    InvalidState,
    InvalidMethod,
    BadSignature,
    AmountMismatch,
    Mismatch,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::OutOfStock => "OUT_OF_STOCK",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::InvalidMethod => "INVALID_METHOD",
            ErrorCode::BadSignature => "BAD_SIGNATURE",
            ErrorCode::AmountMismatch => "AMOUNT_MISMATCH",
            ErrorCode::Mismatch => "MISMATCH",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Identity verification failed: {0}")]
    IdentityError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
