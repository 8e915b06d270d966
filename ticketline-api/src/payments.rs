use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use ticketline_order::{PaymentAttempt, PaymentIntent};

use crate::error::AppError;
use crate::middleware::CustomerClaims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub method: String,
}

/// POST /v1/orders/{id}/payments
/// Open a payment attempt; the response carries the redirect URL or QR content
pub async fn initiate_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(order_id): Path<Uuid>,
    payload: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentIntent>), AppError> {
    let Json(req) = payload.map_err(AppError::from_json_rejection)?;
    let intent = state.reconciler.initiate(order_id, &claims.sub, &req.method).await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

/// GET /v1/orders/{id}/payments
pub async fn list_order_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<PaymentAttempt>>, AppError> {
    Ok(Json(state.reconciler.list_payments(order_id, &claims.sub).await?))
}

/// GET /v1/payments/{id}
pub async fn get_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentAttempt>, AppError> {
    Ok(Json(state.reconciler.get_payment(payment_id, &claims.sub).await?))
}
