use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use ticketline_catalog::HeldSeats;
use ticketline_core::payment::PaymentStatus;

use crate::models::{Order, OrderStatus, PaidRecord, PaymentAttempt};
use crate::repository::{OrderRepository, PageRequest, PaymentRepository, RepositoryError};

/// In-process order store. Every operation holds the map lock only for the
/// duration of a single lookup or write.
pub struct MemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl MemoryOrderRepository {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryOrderRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<Uuid, RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(RepositoryError::Duplicate(format!("order {}", order.id)));
        }
        orders.insert(order.id, order.clone());
        Ok(order.id)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&id) {
            Some(order) if order.status == from => {
                order.status = to;
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_payment(&self, id: Uuid, record: &PaidRecord) -> Result<bool, RepositoryError> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&id) {
            Some(order) if order.status == OrderStatus::PendingPayment => {
                order.status = OrderStatus::Paid;
                order.paid_at = Some(record.paid_at);
                order.payment_id = Some(record.payment_id);
                order.ticket = Some(record.ticket.clone());
                order.updated_at = record.paid_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_orders(
        &self,
        user_id: &str,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), RepositoryError> {
        let orders = self.orders.read().await;
        let mut matching: Vec<&Order> = orders
            .values()
            .filter(|o| o.user_id == user_id)
            .filter(|o| status.map_or(true, |s| o.status == s))
            .collect();

        // Newest first, id as tie-breaker keeps pages stable
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size as usize)
            .cloned()
            .collect();

        Ok((items, total))
    }

    async fn list_overdue(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut overdue: Vec<Order> = orders.values().filter(|o| o.is_overdue(now)).cloned().collect();
        overdue.sort_by_key(|o| o.payment_deadline);
        overdue.truncate(limit);
        Ok(overdue)
    }

    async fn held_seats(&self) -> Result<HeldSeats, RepositoryError> {
        let orders = self.orders.read().await;
        let mut held = HeldSeats::new();
        for order in orders.values().filter(|o| o.status.holds_seats()) {
            let counts = held.entry(order.train_id.clone()).or_default();
            for passenger in &order.passengers {
                *counts.entry(passenger.seat_class).or_insert(0) += 1;
            }
        }
        Ok(held)
    }
}

/// In-process payment attempt store
pub struct MemoryPaymentRepository {
    payments: RwLock<HashMap<Uuid, PaymentAttempt>>,
}

impl MemoryPaymentRepository {
    pub fn new() -> Self {
        Self {
            payments: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryPaymentRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentRepository for MemoryPaymentRepository {
    async fn create_payment(&self, payment: &PaymentAttempt) -> Result<Uuid, RepositoryError> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.id) {
            return Err(RepositoryError::Duplicate(format!("payment {}", payment.id)));
        }
        payments.insert(payment.id, payment.clone());
        Ok(payment.id)
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<PaymentAttempt>, RepositoryError> {
        Ok(self.payments.read().await.get(&id).cloned())
    }

    async fn settle_payment(
        &self,
        id: Uuid,
        status: PaymentStatus,
        transaction_id: &str,
        settled_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(&id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = status;
                payment.transaction_id = Some(transaction_id.to_string());
                payment.settled_at = Some(settled_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_payments(&self, order_id: Uuid) -> Result<Vec<PaymentAttempt>, RepositoryError> {
        let payments = self.payments.read().await;
        let mut attempts: Vec<PaymentAttempt> =
            payments.values().filter(|p| p.order_id == order_id).cloned().collect();
        attempts.sort_by_key(|p| p.created_at);
        Ok(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fulfillment::TicketIssuer;
    use crate::models::Passenger;
    use chrono::{Duration, NaiveDate};
    use ticketline_catalog::SeatClass;
    use ticketline_core::payment::PaymentMethod;
    use ticketline_core::pii::Masked;

    fn order_for(user: &str, created_at: DateTime<Utc>) -> Order {
        Order::new(
            user.to_string(),
            "G1".to_string(),
            NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
            "Beijing South".to_string(),
            "Shanghai Hongqiao".to_string(),
            vec![Passenger {
                name: "张三".to_string(),
                id_number: Masked("110101199001011234".to_string()),
                seat_class: SeatClass::Second,
                price: 553,
            }],
            Duration::minutes(30),
            created_at,
        )
    }

    #[tokio::test]
    async fn test_order_crud() {
        let repo = MemoryOrderRepository::new();
        let order = order_for("user-1", Utc::now());

        repo.create_order(&order).await.unwrap();
        assert!(matches!(repo.create_order(&order).await, Err(RepositoryError::Duplicate(_))));

        let stored = repo.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.total_amount, 553);

        let pending = OrderStatus::PendingPayment;
        assert!(repo.update_order_status(order.id, pending, OrderStatus::Cancelled).await.unwrap());
        assert_eq!(repo.get_order(order.id).await.unwrap().unwrap().status, OrderStatus::Cancelled);

        assert!(!repo.update_order_status(Uuid::new_v4(), pending, OrderStatus::Paid).await.unwrap());
        assert!(repo.get_order(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_writes_are_compare_and_set() {
        let repo = MemoryOrderRepository::new();
        let order = order_for("user-1", Utc::now());
        repo.create_order(&order).await.unwrap();

        let pending = OrderStatus::PendingPayment;
        assert!(repo.update_order_status(order.id, pending, OrderStatus::Cancelled).await.unwrap());
        // A second writer that read PENDING_PAYMENT loses
        assert!(!repo.update_order_status(order.id, pending, OrderStatus::Cancelled).await.unwrap());

        let record = PaidRecord {
            paid_at: Utc::now(),
            payment_id: Uuid::new_v4(),
            ticket: TicketIssuer::default().issue(&order, Utc::now()),
        };
        assert!(!repo.record_payment(order.id, &record).await.unwrap());

        let stored = repo.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
        assert!(stored.ticket.is_none());
    }

    #[tokio::test]
    async fn test_held_seats_count_live_orders() {
        let repo = MemoryOrderRepository::new();
        let live = order_for("user-1", Utc::now());
        let paid = order_for("user-2", Utc::now());
        let cancelled = order_for("user-3", Utc::now());
        for order in [&live, &paid, &cancelled] {
            repo.create_order(order).await.unwrap();
        }
        let record = PaidRecord {
            paid_at: Utc::now(),
            payment_id: Uuid::new_v4(),
            ticket: TicketIssuer::default().issue(&paid, Utc::now()),
        };
        assert!(repo.record_payment(paid.id, &record).await.unwrap());
        repo.update_order_status(cancelled.id, OrderStatus::PendingPayment, OrderStatus::Cancelled)
            .await
            .unwrap();

        let held = repo.held_seats().await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held["G1"].get(&SeatClass::Second), Some(&2));
    }

    #[tokio::test]
    async fn test_list_orders_newest_first_with_filter() {
        let repo = MemoryOrderRepository::new();
        let base = Utc::now();

        let mut ids = Vec::new();
        for i in 0..5 {
            let order = order_for("user-1", base + Duration::seconds(i));
            ids.push(order.id);
            repo.create_order(&order).await.unwrap();
        }
        repo.create_order(&order_for("user-2", base)).await.unwrap();
        repo.update_order_status(ids[0], OrderStatus::PendingPayment, OrderStatus::Cancelled)
            .await
            .unwrap();

        let (page_one, total) = repo.list_orders("user-1", None, PageRequest::new(Some(1), Some(2))).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page_one.iter().map(|o| o.id).collect::<Vec<_>>(), vec![ids[4], ids[3]]);

        let (page_three, _) = repo.list_orders("user-1", None, PageRequest::new(Some(3), Some(2))).await.unwrap();
        assert_eq!(page_three.iter().map(|o| o.id).collect::<Vec<_>>(), vec![ids[0]]);

        let (cancelled, total) = repo
            .list_orders("user-1", Some(OrderStatus::Cancelled), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(cancelled[0].id, ids[0]);
    }

    #[tokio::test]
    async fn test_list_overdue() {
        let repo = MemoryOrderRepository::new();
        let created = Utc::now() - Duration::hours(1);
        let stale = order_for("user-1", created);
        let fresh = order_for("user-1", Utc::now());
        repo.create_order(&stale).await.unwrap();
        repo.create_order(&fresh).await.unwrap();

        let overdue = repo.list_overdue(Utc::now(), 10).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, stale.id);
        assert!(repo.list_overdue(Utc::now(), 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settle_payment_only_once() {
        let repo = MemoryPaymentRepository::new();
        let order = order_for("user-1", Utc::now());
        let payment = PaymentAttempt::new(&order, PaymentMethod::Alipay, Utc::now());
        repo.create_payment(&payment).await.unwrap();

        assert!(repo.settle_payment(payment.id, PaymentStatus::Success, "txn-1", Utc::now()).await.unwrap());
        assert!(!repo.settle_payment(payment.id, PaymentStatus::Failed, "txn-2", Utc::now()).await.unwrap());

        let stored = repo.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Success);
        assert_eq!(stored.transaction_id.as_deref(), Some("txn-1"));
        assert_eq!(repo.list_payments(order.id).await.unwrap().len(), 1);
    }
}
