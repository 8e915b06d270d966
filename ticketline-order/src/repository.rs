use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ticketline_catalog::HeldSeats;
use ticketline_core::payment::PaymentStatus;

use crate::models::{Order, OrderStatus, PaidRecord, PaymentAttempt};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Offset-based page selector, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Clamp client input: page >= 1, page size within 1..=100
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(request: PageRequest, total: u64) -> Self {
        Self {
            page: request.page,
            page_size: request.page_size,
            total,
            total_pages: total.div_ceil(u64::from(request.page_size)),
        }
    }
}

/// Durable storage for orders and their passengers.
///
/// The store does not enforce the order state machine; transitions are
/// validated by the coordinator before any write. Status writes are
/// compare-and-set on the current status so that two processes sharing one
/// store cannot both apply the same transition.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist the header and all passengers together
    async fn create_order(&self, order: &Order) -> Result<Uuid, RepositoryError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepositoryError>;

    /// Overwrite the status with `to` if it is still `from`. Returns false,
    /// writing nothing, if the order is absent or its status has moved on.
    async fn update_order_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, RepositoryError>;

    /// Set status PAID together with paid_at, payment id and ticket. Only
    /// applies to a PENDING_PAYMENT order; returns false otherwise.
    async fn record_payment(&self, id: Uuid, record: &PaidRecord) -> Result<bool, RepositoryError>;

    /// A user's orders, newest first, with the total match count
    async fn list_orders(
        &self,
        user_id: &str,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), RepositoryError>;

    /// PENDING_PAYMENT orders whose payment deadline is before `now`
    async fn list_overdue(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Order>, RepositoryError>;

    /// Seats still held by PENDING_PAYMENT and PAID orders, per train
    async fn held_seats(&self) -> Result<HeldSeats, RepositoryError>;
}

/// Durable storage for payment attempts
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create_payment(&self, payment: &PaymentAttempt) -> Result<Uuid, RepositoryError>;

    async fn get_payment(&self, id: Uuid) -> Result<Option<PaymentAttempt>, RepositoryError>;

    /// Move a PENDING attempt to a terminal status. Returns false, writing
    /// nothing, if the attempt is absent or already terminal.
    async fn settle_payment(
        &self,
        id: Uuid,
        status: PaymentStatus,
        transaction_id: &str,
        settled_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Attempts for one order, oldest first
    async fn list_payments(&self, order_id: Uuid) -> Result<Vec<PaymentAttempt>, RepositoryError>;
}
