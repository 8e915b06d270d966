use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use ticketline_catalog::seat::{count_seats, SeatClass, SeatCounts};
use ticketline_core::payment::{PaymentMethod, PaymentStatus};
use ticketline_core::pii::Masked;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    /// Terminal. Reached by cancellation, refund or deadline expiry.
    Cancelled,
}

impl OrderStatus {
    /// The only legal edges of the order state machine
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::PendingPayment, OrderStatus::Paid)
                | (OrderStatus::PendingPayment, OrderStatus::Cancelled)
                | (OrderStatus::Paid, OrderStatus::Cancelled)
        )
    }

    /// PENDING_PAYMENT and PAID orders keep their seats out of inventory
    pub fn holds_seats(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment | OrderStatus::Paid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_PAYMENT" => Ok(OrderStatus::PendingPayment),
            "PAID" => Ok(OrderStatus::Paid),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// Passenger as submitted by the booking client, before validation
#[derive(Debug, Clone, Deserialize)]
pub struct PassengerRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "idNumber")]
    pub id_number: String,
    #[serde(default, alias = "seatType")]
    pub seat_class: Option<SeatClass>,
}

/// A validated passenger with the fare frozen at booking time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub name: String,
    pub id_number: Masked<String>,
    pub seat_class: SeatClass,
    pub price: i64,
}

/// The travel document synthesized once an order is paid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketIssuance {
    pub ticket_number: String,
    pub order_id: Uuid,
    pub train_id: String,
    pub travel_date: NaiveDate,
    pub origin: String,
    pub destination: String,
    pub passengers: Vec<TicketedPassenger>,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketedPassenger {
    pub name: String,
    /// Redacted, e.g. `1101**********1234`
    pub id_number: String,
    pub seat_class: SeatClass,
}

/// Fields written together when an order becomes PAID
#[derive(Debug, Clone)]
pub struct PaidRecord {
    pub paid_at: DateTime<Utc>,
    pub payment_id: Uuid,
    pub ticket: TicketIssuance,
}

/// A booking: the single source of truth for what a user bought
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub train_id: String,
    pub travel_date: NaiveDate,
    pub origin: String,
    pub destination: String,
    pub passengers: Vec<Passenger>,
    pub total_amount: i64,
    pub status: OrderStatus,
    pub payment_deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    /// The payment attempt that settled this order
    pub payment_id: Option<Uuid>,
    pub ticket: Option<TicketIssuance>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: String,
        train_id: String,
        travel_date: NaiveDate,
        origin: String,
        destination: String,
        passengers: Vec<Passenger>,
        payment_window: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let total_amount = passengers.iter().map(|p| p.price).sum();
        Self {
            id: Uuid::new_v4(),
            user_id,
            train_id,
            travel_date,
            origin,
            destination,
            passengers,
            total_amount,
            status: OrderStatus::PendingPayment,
            payment_deadline: now + payment_window,
            created_at: now,
            updated_at: now,
            paid_at: None,
            payment_id: None,
            ticket: None,
        }
    }

    /// Seats held by this order, per class. Derived from the frozen
    /// passenger list so a release returns exactly what was reserved.
    pub fn seat_counts(&self) -> SeatCounts {
        count_seats(self.passengers.iter().map(|p| p.seat_class))
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::PendingPayment && now > self.payment_deadline
    }
}

/// One attempt to pay for an order through one method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: String,
    pub method: PaymentMethod,
    pub amount: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub transaction_id: Option<String>,
    /// When the attempt reached SUCCESS or FAILED
    pub settled_at: Option<DateTime<Utc>>,
}

impl PaymentAttempt {
    pub fn new(order: &Order, method: PaymentMethod, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order.id,
            user_id: order.user_id.clone(),
            method,
            amount: order.total_amount,
            status: PaymentStatus::Pending,
            created_at: now,
            transaction_id: None,
            settled_at: None,
        }
    }
}
