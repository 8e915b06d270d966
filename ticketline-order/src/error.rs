use uuid::Uuid;

use ticketline_catalog::InventoryError;
use ticketline_core::ErrorCode;

use crate::models::OrderStatus;
use crate::repository::RepositoryError;

/// Every failure the order engine reports. None of them are fatal to the
/// process; each maps to a stable `ErrorCode`.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Out of stock: {0}")]
    OutOfStock(String),

    #[error("Order {0} belongs to another user")]
    Forbidden(Uuid),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unsupported payment method: {0}")]
    InvalidMethod(String),

    #[error("Callback signature verification failed")]
    BadSignature,

    #[error("Callback amount {received} does not match payment amount {expected}")]
    AmountMismatch {
        expected: i64,
        received: i64,
    },

    #[error("Payment {payment_id} does not belong to order {order_id}")]
    Mismatch {
        payment_id: String,
        order_id: String,
    },

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Payment gateway failure: {0}")]
    Gateway(String),
}

impl OrderError {
    pub fn code(&self) -> ErrorCode {
        match self {
            OrderError::Validation(_) => ErrorCode::ValidationError,
            OrderError::OutOfStock(_) => ErrorCode::OutOfStock,
            OrderError::Forbidden(_) => ErrorCode::Forbidden,
            OrderError::NotFound(_) => ErrorCode::NotFound,
            OrderError::InvalidTransition { .. } | OrderError::InvalidState(_) => ErrorCode::InvalidState,
            OrderError::InvalidMethod(_) => ErrorCode::InvalidMethod,
            OrderError::BadSignature => ErrorCode::BadSignature,
            OrderError::AmountMismatch { .. } => ErrorCode::AmountMismatch,
            OrderError::Mismatch { .. } => ErrorCode::Mismatch,
            OrderError::Storage(_) | OrderError::Gateway(_) => ErrorCode::InternalError,
        }
    }
}

impl From<RepositoryError> for OrderError {
    fn from(err: RepositoryError) -> Self {
        OrderError::Storage(err.to_string())
    }
}

impl From<InventoryError> for OrderError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InsufficientStock { .. } => OrderError::OutOfStock(err.to_string()),
            InventoryError::Backend(msg) => OrderError::Storage(msg),
        }
    }
}
