use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ticketline_catalog::SeatClass;
use ticketline_order::{
    CreateOrder, Order, OrderStatus, PageRequest, Pagination, PassengerRequest, TicketIssuance,
};

use crate::error::AppError;
use crate::middleware::CustomerClaims;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(alias = "trainId")]
    pub train_id: String,
    #[serde(alias = "travelDate")]
    pub travel_date: NaiveDate,
    #[serde(alias = "from")]
    pub origin: String,
    #[serde(alias = "to")]
    pub destination: String,
    pub passengers: Vec<PassengerRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PassengerResponse {
    pub name: String,
    /// Redacted
    pub id_number: String,
    pub seat_class: SeatClass,
    pub price: i64,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: String,
    pub train_id: String,
    pub travel_date: NaiveDate,
    pub origin: String,
    pub destination: String,
    pub passengers: Vec<PassengerResponse>,
    pub total_amount: i64,
    pub status: OrderStatus,
    pub payment_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub ticket_number: Option<String>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            train_id: order.train_id,
            travel_date: order.travel_date,
            origin: order.origin,
            destination: order.destination,
            passengers: order
                .passengers
                .into_iter()
                .map(|p| PassengerResponse {
                    id_number: p.id_number.redacted(),
                    name: p.name,
                    seat_class: p.seat_class,
                    price: p.price,
                })
                .collect(),
            total_amount: order.total_amount,
            status: order.status,
            payment_deadline: order.payment_deadline,
            created_at: order.created_at,
            updated_at: order.updated_at,
            paid_at: order.paid_at,
            ticket_number: order.ticket.map(|t| t.ticket_number),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub ticket: TicketIssuance,
    pub qr_data: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/orders
/// Reserve seats and open a PENDING_PAYMENT order
pub async fn create_order(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let Json(req) = payload.map_err(AppError::from_json_rejection)?;

    let order = state
        .coordinator
        .create_order(
            &claims.sub,
            CreateOrder {
                train_id: req.train_id,
                travel_date: req.travel_date,
                origin: req.origin,
                destination: req.destination,
                passengers: req.passengers,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /v1/orders
/// The caller's orders, newest first
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<OrderListResponse>, AppError> {
    let Query(query) = query.map_err(AppError::from_query_rejection)?;

    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_uppercase().parse::<OrderStatus>())
        .transpose()
        .map_err(AppError::ValidationError)?;

    let page = state
        .coordinator
        .list_orders(&claims.sub, status, PageRequest::new(query.page, query.page_size))
        .await?;

    Ok(Json(OrderListResponse {
        orders: page.orders.into_iter().map(OrderResponse::from).collect(),
        pagination: page.pagination,
    }))
}

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.coordinator.get_order(order_id, &claims.sub).await?;
    Ok(Json(order.into()))
}

/// POST /v1/orders/{id}/cancel
/// Cancel an unpaid order and release its seats
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.coordinator.cancel(order_id, &claims.sub).await?;
    Ok(Json(order.into()))
}

/// POST /v1/orders/{id}/refund
/// Refund a paid order and release its seats
pub async fn refund_order(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.coordinator.refund(order_id, &claims.sub).await?;
    Ok(Json(order.into()))
}

/// GET /v1/orders/{id}/ticket
pub async fn get_ticket(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<TicketResponse>, AppError> {
    let ticket = state.coordinator.ticket(order_id, &claims.sub).await?;
    let qr_data = state.coordinator.issuer().qr_data(&ticket);
    Ok(Json(TicketResponse { ticket, qr_data }))
}
