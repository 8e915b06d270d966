use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use ticketline_catalog::SeatCounts;
use ticketline_order::OrderError;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub train_id: String,
    pub origin: Option<String>,
    pub destination: Option<String>,
    /// Display snapshot; a later booking may still find the class sold out
    pub available: SeatCounts,
}

/// GET /v1/trains/{train_id}/availability
pub async fn get_availability(
    State(state): State<AppState>,
    Path(train_id): Path<String>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let schedule = state.timetable.find(&train_id);
    let available = state
        .ledger
        .availability(&train_id)
        .await
        .map_err(OrderError::from)?;

    if schedule.is_none() && available.is_empty() {
        return Err(OrderError::NotFound(format!("train {}", train_id)).into());
    }

    Ok(Json(AvailabilityResponse {
        origin: schedule.map(|s| s.origin.clone()),
        destination: schedule.map(|s| s.destination.clone()),
        train_id,
        available,
    }))
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
