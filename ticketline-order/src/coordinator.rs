use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use ticketline_catalog::seat::count_seats;
use ticketline_catalog::{InventoryLedger, PriceTable, Timetable};
use ticketline_core::identity::IdDocumentPolicy;
use ticketline_core::pii::Masked;

use crate::error::OrderError;
use crate::fulfillment::TicketIssuer;
use crate::locks::KeyedLocks;
use crate::models::{Order, OrderStatus, PaidRecord, Passenger, PassengerRequest, TicketIssuance};
use crate::repository::{OrderRepository, PageRequest, Pagination};

/// Business rules governing order creation and expiry
#[derive(Debug, Clone)]
pub struct LifecycleRules {
    pub payment_window: Duration,
    pub max_passengers: usize,
    pub id_policy: IdDocumentPolicy,
    /// Upper bound on orders cancelled per sweep pass
    pub sweep_batch_size: usize,
}

impl Default for LifecycleRules {
    fn default() -> Self {
        Self {
            payment_window: Duration::minutes(30),
            max_passengers: 5,
            id_policy: IdDocumentPolicy::default(),
            sweep_batch_size: 100,
        }
    }
}

/// A booking request on behalf of an authenticated user
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub train_id: String,
    pub travel_date: NaiveDate,
    pub origin: String,
    pub destination: String,
    pub passengers: Vec<PassengerRequest>,
}

/// Result of asking the coordinator to mark an order paid
#[derive(Debug, Clone)]
pub enum MarkPaid {
    Paid(Order),
    /// Already paid by this same payment attempt
    AlreadyPaid(Order),
}

/// One page of a user's orders
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub pagination: Pagination,
}

/// Drives every order through `PENDING_PAYMENT -> PAID -> CANCELLED`.
///
/// All read-validate-write sequences on one order run under that order's
/// lock, so a cancel can never interleave with a payment confirmation.
pub struct OrderCoordinator {
    ledger: Arc<dyn InventoryLedger>,
    orders: Arc<dyn OrderRepository>,
    prices: PriceTable,
    rules: LifecycleRules,
    issuer: TicketIssuer,
    locks: KeyedLocks,
}

impl OrderCoordinator {
    pub fn new(
        ledger: Arc<dyn InventoryLedger>,
        orders: Arc<dyn OrderRepository>,
        prices: PriceTable,
        rules: LifecycleRules,
    ) -> Self {
        Self {
            ledger,
            orders,
            prices,
            rules,
            issuer: TicketIssuer::default(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn issuer(&self) -> &TicketIssuer {
        &self.issuer
    }

    /// Seed the ledger from the timetable at start-up. Seats held by
    /// PENDING_PAYMENT and PAID orders already in the store stay unavailable.
    pub async fn seed_inventory(&self, timetable: &Timetable) -> Result<usize, OrderError> {
        let held = self.orders.held_seats().await?;
        for (train_id, counts) in &held {
            tracing::info!("Withholding {:?} seats on {} for existing orders", counts, train_id);
        }
        Ok(timetable.seed(self.ledger.as_ref(), &held).await?)
    }

    /// Reserve seats, then persist a PENDING_PAYMENT order.
    ///
    /// No order is written when stock is short. If the write itself fails
    /// the reservation is released before the error is returned.
    pub async fn create_order(&self, user_id: &str, request: CreateOrder) -> Result<Order, OrderError> {
        let passengers = self.validate(&request)?;
        let counts = count_seats(passengers.iter().map(|p| p.seat_class));

        if let Err(e) = self.ledger.reserve(&request.train_id, &counts).await {
            tracing::info!("Reservation on {} for {} refused: {}", request.train_id, user_id, e);
            return Err(e.into());
        }

        let order = Order::new(
            user_id.to_string(),
            request.train_id,
            request.travel_date,
            request.origin,
            request.destination,
            passengers,
            self.rules.payment_window,
            Utc::now(),
        );

        if let Err(e) = self.orders.create_order(&order).await {
            tracing::error!("Persisting order {} failed, releasing its reservation: {}", order.id, e);
            if let Err(release_err) = self.ledger.release(&order.train_id, &counts).await {
                tracing::error!(
                    "Compensating release for order {} on {} failed: {}",
                    order.id, order.train_id, release_err
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            "Order {} created for {} on {} ({} passengers, total {})",
            order.id, user_id, order.train_id, order.passengers.len(), order.total_amount
        );
        Ok(order)
    }

    /// Owner-only read
    pub async fn get_order(&self, order_id: Uuid, user_id: &str) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;
        if !order.is_owned_by(user_id) {
            return Err(OrderError::Forbidden(order_id));
        }
        Ok(order)
    }

    pub async fn list_orders(
        &self,
        user_id: &str,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<OrderPage, OrderError> {
        let (orders, total) = self.orders.list_orders(user_id, status, page).await?;
        Ok(OrderPage {
            orders,
            pagination: Pagination::new(page, total),
        })
    }

    /// Cancel an unpaid order and return its seats
    pub async fn cancel(&self, order_id: Uuid, user_id: &str) -> Result<Order, OrderError> {
        let _guard = self.locks.acquire(order_id).await;
        let order = self.get_order(order_id, user_id).await?;

        if order.status != OrderStatus::PendingPayment {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }

        let order = self.release_and_close(order).await?;
        tracing::info!("Order {} cancelled by {}", order_id, user_id);
        Ok(order)
    }

    /// Refund a paid order and return its seats
    pub async fn refund(&self, order_id: Uuid, user_id: &str) -> Result<Order, OrderError> {
        let _guard = self.locks.acquire(order_id).await;
        let order = self.get_order(order_id, user_id).await?;

        if order.status != OrderStatus::Paid {
            return Err(OrderError::InvalidState(format!(
                "only PAID orders can be refunded, order {} is {}",
                order_id, order.status
            )));
        }

        let order = self.release_and_close(order).await?;
        tracing::info!("Order {} refunded to {} ({})", order_id, user_id, order.total_amount);
        Ok(order)
    }

    /// Confirm payment for an order and issue its ticket.
    ///
    /// Only called by the payment reconciler. Repeating the call for the
    /// attempt that already paid the order is a no-op; any other attempt is
    /// rejected once the order has left PENDING_PAYMENT.
    pub async fn mark_paid(
        &self,
        order_id: Uuid,
        payment_id: Uuid,
        transaction_id: &str,
    ) -> Result<MarkPaid, OrderError> {
        let _guard = self.locks.acquire(order_id).await;
        let order = self.load(order_id).await?;

        match order.status {
            OrderStatus::Paid if order.payment_id == Some(payment_id) => {
                tracing::info!("Order {} already paid by {}, nothing to do", order_id, payment_id);
                Ok(MarkPaid::AlreadyPaid(order))
            }
            status if status.can_transition_to(OrderStatus::Paid) => {
                let now = Utc::now();
                let record = PaidRecord {
                    paid_at: now,
                    payment_id,
                    ticket: self.issuer.issue(&order, now),
                };

                if !self.orders.record_payment(order_id, &record).await? {
                    // Another process moved the order after our read
                    let current = self.load(order_id).await?;
                    return Err(OrderError::InvalidTransition {
                        from: current.status,
                        to: OrderStatus::Paid,
                    });
                }

                tracing::info!(
                    "Order {} PAID via payment {} (transaction {}), ticket {}",
                    order_id, payment_id, transaction_id, record.ticket.ticket_number
                );

                let mut order = order;
                order.status = OrderStatus::Paid;
                order.paid_at = Some(record.paid_at);
                order.payment_id = Some(payment_id);
                order.updated_at = now;
                order.ticket = Some(record.ticket);
                Ok(MarkPaid::Paid(order))
            }
            status => Err(OrderError::InvalidTransition {
                from: status,
                to: OrderStatus::Paid,
            }),
        }
    }

    /// Owner-only access to the issued ticket
    pub async fn ticket(&self, order_id: Uuid, user_id: &str) -> Result<TicketIssuance, OrderError> {
        let order = self.get_order(order_id, user_id).await?;
        order
            .ticket
            .ok_or_else(|| OrderError::InvalidState(format!("order {} has no issued ticket", order_id)))
    }

    /// Cancel PENDING_PAYMENT orders whose deadline passed and release their
    /// seats. Returns how many orders were expired.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<usize, OrderError> {
        let candidates = self.orders.list_overdue(now, self.rules.sweep_batch_size).await?;
        let mut expired = 0;

        for candidate in candidates {
            let _guard = self.locks.acquire(candidate.id).await;

            // Re-read under the lock, a payment may have landed meanwhile
            let Some(order) = self.orders.get_order(candidate.id).await? else {
                continue;
            };
            if !order.is_overdue(now) {
                continue;
            }

            let order_id = order.id;
            match self.release_and_close(order).await {
                Ok(_) => {
                    tracing::info!("Order {} expired unpaid, seats released", order_id);
                    expired += 1;
                }
                Err(OrderError::InvalidTransition { from, .. }) => {
                    tracing::debug!("Order {} already moved to {} elsewhere", order_id, from)
                }
                Err(e) => tracing::error!("Failed to expire order {}: {}", order_id, e),
            }
        }

        Ok(expired)
    }

    async fn load(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("order {}", order_id)))
    }

    /// Mark the order CANCELLED, then release its seats.
    ///
    /// The status write is compare-and-set, so when several processes race
    /// on one order only the winner releases. If the release fails the
    /// previous status is put back. Caller must hold the order lock.
    async fn release_and_close(&self, mut order: Order) -> Result<Order, OrderError> {
        let from = order.status;
        if !from.can_transition_to(OrderStatus::Cancelled) {
            return Err(OrderError::InvalidTransition {
                from,
                to: OrderStatus::Cancelled,
            });
        }

        if !self.orders.update_order_status(order.id, from, OrderStatus::Cancelled).await? {
            let current = self.load(order.id).await?;
            return Err(OrderError::InvalidTransition {
                from: current.status,
                to: OrderStatus::Cancelled,
            });
        }

        if let Err(e) = self.ledger.release(&order.train_id, &order.seat_counts()).await {
            tracing::error!("Releasing seats of order {} failed, restoring {}: {}", order.id, from, e);
            match self.orders.update_order_status(order.id, OrderStatus::Cancelled, from).await {
                Ok(true) => {}
                Ok(false) => tracing::error!("Order {} changed while restoring {}", order.id, from),
                Err(restore_err) => {
                    tracing::error!("Restoring order {} to {} failed: {}", order.id, from, restore_err)
                }
            }
            return Err(e.into());
        }

        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        Ok(order)
    }

    fn validate(&self, request: &CreateOrder) -> Result<Vec<Passenger>, OrderError> {
        if request.train_id.trim().is_empty() {
            return Err(OrderError::Validation("train id is required".to_string()));
        }
        if request.origin.trim().is_empty() || request.destination.trim().is_empty() {
            return Err(OrderError::Validation("origin and destination are required".to_string()));
        }
        if request.origin.trim() == request.destination.trim() {
            return Err(OrderError::Validation("origin and destination must differ".to_string()));
        }
        if request.passengers.is_empty() {
            return Err(OrderError::Validation("at least one passenger is required".to_string()));
        }
        if request.passengers.len() > self.rules.max_passengers {
            return Err(OrderError::Validation(format!(
                "at most {} passengers per order",
                self.rules.max_passengers
            )));
        }

        let mut seen = HashSet::new();
        let mut passengers = Vec::with_capacity(request.passengers.len());

        for (index, p) in request.passengers.iter().enumerate() {
            let name = p.name.trim();
            if name.is_empty() {
                return Err(OrderError::Validation(format!("passenger {}: name is required", index + 1)));
            }

            let id_number = p.id_number.trim().to_ascii_uppercase();
            if id_number.is_empty() {
                return Err(OrderError::Validation(format!(
                    "passenger {}: id number is required",
                    index + 1
                )));
            }
            self.rules
                .id_policy
                .validate(&id_number)
                .map_err(|e| OrderError::Validation(format!("passenger {}: {}", index + 1, e)))?;
            if !seen.insert(id_number.clone()) {
                return Err(OrderError::Validation(format!(
                    "passenger {}: duplicate id number in order",
                    index + 1
                )));
            }

            let seat_class = p.seat_class.ok_or_else(|| {
                OrderError::Validation(format!("passenger {}: seat class is required", index + 1))
            })?;
            let price = self.prices.price(seat_class).ok_or_else(|| {
                OrderError::Validation(format!("no fare configured for seat class {}", seat_class))
            })?;

            passengers.push(Passenger {
                name: name.to_string(),
                id_number: Masked(id_number),
                seat_class,
                price,
            });
        }

        Ok(passengers)
    }
}
