use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use ticketline_order::{CallbackOutcome, PaymentCallback};

use crate::error::AppError;
use crate::state::AppState;

/// POST /v1/webhooks/payments
/// Provider callback. Authenticated by its HMAC signature, not by a session.
/// Redelivered callbacks answer 200 with outcome DUPLICATE.
pub async fn payment_callback(
    State(state): State<AppState>,
    payload: Result<Json<PaymentCallback>, JsonRejection>,
) -> Result<Json<CallbackOutcome>, AppError> {
    let Json(callback) = payload.map_err(AppError::from_json_rejection)?;

    tracing::info!(
        "Received {} callback for payment {} (order {})",
        callback.status, callback.payment_id, callback.order_id
    );

    let outcome = state.reconciler.apply_callback(&callback).await?;
    Ok(Json(outcome))
}
