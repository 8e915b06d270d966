use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use ticketline_core::ErrorCode;
use ticketline_order::OrderError;

#[derive(Debug)]
pub enum AppError {
    /// Missing or invalid bearer token
    AuthenticationError(String),
    /// Malformed request body or query string
    ValidationError(String),
    Order(OrderError),
    Anyhow(anyhow::Error),
}

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationError | ErrorCode::InvalidMethod => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized | ErrorCode::BadSignature => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::OutOfStock | ErrorCode::InvalidState | ErrorCode::Mismatch => StatusCode::CONFLICT,
        ErrorCode::AmountMismatch => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, error_message) = match self {
            AppError::AuthenticationError(msg) => (ErrorCode::Unauthorized, msg),
            AppError::ValidationError(msg) => (ErrorCode::ValidationError, msg),
            AppError::Order(err) => match err.code() {
                ErrorCode::InternalError => {
                    tracing::error!("Internal Server Error: {}", err);
                    (ErrorCode::InternalError, "Internal Server Error".to_string())
                }
                code => (code, err.to_string()),
            },
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (ErrorCode::InternalError, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "code": code,
            "error": error_message,
        }));

        (status_for(code), body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        match err.into().downcast::<OrderError>() {
            Ok(order_err) => Self::Order(order_err),
            Err(other) => Self::Anyhow(other),
        }
    }
}

impl AppError {
    pub fn from_json_rejection(rejection: JsonRejection) -> Self {
        Self::ValidationError(rejection.body_text())
    }

    pub fn from_query_rejection(rejection: QueryRejection) -> Self {
        Self::ValidationError(rejection.body_text())
    }
}
