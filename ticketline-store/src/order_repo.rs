use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use std::fmt::Display;
use uuid::Uuid;

use ticketline_catalog::{HeldSeats, SeatClass};
use ticketline_core::payment::{PaymentMethod, PaymentStatus};
use ticketline_core::pii::Masked;
use ticketline_order::models::PaidRecord;
use ticketline_order::{
    Order, OrderRepository, OrderStatus, PageRequest, Passenger, PaymentAttempt, PaymentRepository,
    RepositoryError, TicketIssuance,
};

fn backend(err: impl Display) -> RepositoryError {
    RepositoryError::Backend(err.to_string())
}

fn write_error(err: sqlx::Error, what: String) -> RepositoryError {
    let unique = err.as_database_error().is_some_and(|db| db.is_unique_violation());
    if unique {
        RepositoryError::Duplicate(what)
    } else {
        backend(err)
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: String,
    train_id: String,
    travel_date: NaiveDate,
    origin: String,
    destination: String,
    total_amount: i64,
    status: String,
    payment_deadline: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    payment_id: Option<Uuid>,
    ticket: Option<sqlx::types::Json<TicketIssuance>>,
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    order_id: Uuid,
    name: String,
    id_number: String,
    seat_class: String,
    price: i64,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    user_id: String,
    method: String,
    amount: i64,
    status: String,
    created_at: DateTime<Utc>,
    transaction_id: Option<String>,
    settled_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct HeldRow {
    train_id: String,
    seat_class: String,
    seats: i64,
}

fn collect_held(rows: Vec<HeldRow>) -> Result<HeldSeats, RepositoryError> {
    let mut held = HeldSeats::new();
    for row in rows {
        let class = row.seat_class.parse::<SeatClass>().map_err(backend)?;
        let seats = u32::try_from(row.seats).map_err(backend)?;
        *held.entry(row.train_id).or_default().entry(class).or_insert(0) += seats;
    }
    Ok(held)
}

const ORDER_COLUMNS: &str = "id, user_id, train_id, travel_date, origin, destination, total_amount, status, \
     payment_deadline, created_at, updated_at, paid_at, payment_id, ticket";

const PAYMENT_COLUMNS: &str =
    "id, order_id, user_id, method, amount, status, created_at, transaction_id, settled_at";

impl PassengerRow {
    fn into_passenger(self) -> Result<Passenger, RepositoryError> {
        Ok(Passenger {
            name: self.name,
            id_number: Masked(self.id_number),
            seat_class: self.seat_class.parse::<SeatClass>().map_err(backend)?,
            price: self.price,
        })
    }
}

impl OrderRow {
    fn into_order(self, passengers: Vec<Passenger>) -> Result<Order, RepositoryError> {
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            train_id: self.train_id,
            travel_date: self.travel_date,
            origin: self.origin,
            destination: self.destination,
            passengers,
            total_amount: self.total_amount,
            status: self.status.parse::<OrderStatus>().map_err(backend)?,
            payment_deadline: self.payment_deadline,
            created_at: self.created_at,
            updated_at: self.updated_at,
            paid_at: self.paid_at,
            payment_id: self.payment_id,
            ticket: self.ticket.map(|t| t.0),
        })
    }
}

impl TryFrom<PaymentRow> for PaymentAttempt {
    type Error = RepositoryError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(PaymentAttempt {
            id: row.id,
            order_id: row.order_id,
            user_id: row.user_id,
            method: row.method.parse::<PaymentMethod>().map_err(backend)?,
            amount: row.amount,
            status: row.status.parse::<PaymentStatus>().map_err(backend)?,
            created_at: row.created_at,
            transaction_id: row.transaction_id,
            settled_at: row.settled_at,
        })
    }
}

/// Orders and their passengers in Postgres
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach passengers to a batch of order rows with one query
    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let passenger_rows: Vec<PassengerRow> = sqlx::query_as(
            "SELECT order_id, name, id_number, seat_class, price FROM order_passengers \
             WHERE order_id = ANY($1) ORDER BY order_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut by_order: HashMap<Uuid, Vec<Passenger>> = HashMap::new();
        for row in passenger_rows {
            let order_id = row.order_id;
            by_order.entry(order_id).or_default().push(row.into_passenger()?);
        }

        rows.into_iter()
            .map(|row| {
                let passengers = by_order.remove(&row.id).unwrap_or_default();
                row.into_order(passengers)
            })
            .collect()
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn create_order(&self, order: &Order) -> Result<Uuid, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, train_id, travel_date, origin, destination, total_amount, status, payment_deadline, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id)
        .bind(&order.user_id)
        .bind(&order.train_id)
        .bind(order.travel_date)
        .bind(&order.origin)
        .bind(&order.destination)
        .bind(order.total_amount)
        .bind(order.status.as_str())
        .bind(order.payment_deadline)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, format!("order {}", order.id)))?;

        let mut passengers: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO order_passengers (order_id, position, name, id_number, seat_class, price) ",
        );
        passengers.push_values(order.passengers.iter().enumerate(), |mut b, (position, p)| {
            b.push_bind(order.id)
                .push_bind(position as i32)
                .push_bind(&p.name)
                .push_bind(p.id_number.expose())
                .push_bind(p.seat_class.as_str())
                .push_bind(p.price);
        });
        passengers.build().execute(&mut *tx).await.map_err(backend)?;

        // Dropping the transaction on any error above rolls back the header too
        tx.commit().await.map_err(backend)?;

        Ok(order.id)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3")
            .bind(to.as_str())
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_payment(&self, id: Uuid, record: &PaidRecord) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, paid_at = $2, payment_id = $3, ticket = $4, updated_at = $2
            WHERE id = $5 AND status = $6
            "#,
        )
        .bind(OrderStatus::Paid.as_str())
        .bind(record.paid_at)
        .bind(record.payment_id)
        .bind(sqlx::types::Json(&record.ticket))
        .bind(id)
        .bind(OrderStatus::PendingPayment.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_orders(
        &self,
        user_id: &str,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<(Vec<Order>, u64), RepositoryError> {
        let status = status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)",
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE user_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC, id LIMIT $3 OFFSET $4",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .bind(status)
        .bind(i64::from(page.page_size))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok((self.hydrate(rows).await?, total.max(0) as u64))
    }

    async fn list_overdue(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE status = $1 AND payment_deadline < $2 \
             ORDER BY payment_deadline LIMIT $3",
            ORDER_COLUMNS
        ))
        .bind(OrderStatus::PendingPayment.as_str())
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        self.hydrate(rows).await
    }

    async fn held_seats(&self) -> Result<HeldSeats, RepositoryError> {
        let rows: Vec<HeldRow> = sqlx::query_as(
            "SELECT o.train_id, p.seat_class, COUNT(*) AS seats \
             FROM order_passengers p JOIN orders o ON o.id = p.order_id \
             WHERE o.status IN ($1, $2) \
             GROUP BY o.train_id, p.seat_class",
        )
        .bind(OrderStatus::PendingPayment.as_str())
        .bind(OrderStatus::Paid.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        collect_held(rows)
    }
}

/// Payment attempts in Postgres
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn create_payment(&self, payment: &PaymentAttempt) -> Result<Uuid, RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, user_id, method, amount, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(&payment.user_id)
        .bind(payment.method.as_str())
        .bind(payment.amount)
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, format!("payment {}", payment.id)))?;

        Ok(payment.id)
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<PaymentAttempt>, RepositoryError> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        row.map(PaymentAttempt::try_from).transpose()
    }

    async fn settle_payment(
        &self,
        id: Uuid,
        status: PaymentStatus,
        transaction_id: &str,
        settled_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        // Conditional on PENDING: the first terminal write wins
        let result = sqlx::query(
            "UPDATE payments SET status = $1, transaction_id = $2, settled_at = $3 \
             WHERE id = $4 AND status = $5",
        )
        .bind(status.as_str())
        .bind(transaction_id)
        .bind(settled_at)
        .bind(id)
        .bind(PaymentStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, format!("successful payment for {}", id)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_payments(&self, order_id: Uuid) -> Result<Vec<PaymentAttempt>, RepositoryError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE order_id = $1 ORDER BY created_at",
            PAYMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(PaymentAttempt::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion_rejects_unknown_status() {
        let row = PaymentRow {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            method: "alipay".to_string(),
            amount: 553,
            status: "REFUNDED".to_string(),
            created_at: Utc::now(),
            transaction_id: None,
            settled_at: None,
        };
        assert!(matches!(PaymentAttempt::try_from(row), Err(RepositoryError::Backend(_))));
    }

    #[test]
    fn test_order_row_conversion() {
        let now = Utc::now();
        let row = OrderRow {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            train_id: "G1".to_string(),
            travel_date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
            origin: "Beijing South".to_string(),
            destination: "Shanghai Hongqiao".to_string(),
            total_amount: 553,
            status: "PENDING_PAYMENT".to_string(),
            payment_deadline: now,
            created_at: now,
            updated_at: now,
            paid_at: None,
            payment_id: None,
            ticket: None,
        };
        let passenger = PassengerRow {
            order_id: row.id,
            name: "张三".to_string(),
            id_number: "110101199001011234".to_string(),
            seat_class: "second".to_string(),
            price: 553,
        }
        .into_passenger()
        .unwrap();

        let order = row.into_order(vec![passenger]).unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(order.seat_counts().get(&SeatClass::Second), Some(&1));
    }

    #[test]
    fn test_held_rows_grouped_per_train() {
        let row = |train: &str, class: &str, seats: i64| HeldRow {
            train_id: train.to_string(),
            seat_class: class.to_string(),
            seats,
        };
        let held = collect_held(vec![row("G1", "second", 3), row("G1", "first", 1), row("G7", "second", 2)]).unwrap();

        assert_eq!(held["G1"].get(&SeatClass::Second), Some(&3));
        assert_eq!(held["G1"].get(&SeatClass::First), Some(&1));
        assert_eq!(held["G7"].get(&SeatClass::Second), Some(&2));
        assert!(collect_held(vec![row("G1", "economy", 1)]).is_err());
    }
}
