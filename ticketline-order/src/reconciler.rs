use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use ticketline_core::payment::{IntentRequest, PaymentGateway, PaymentMethod, PaymentPayload, PaymentStatus};
use ticketline_core::signature::{CallbackFields, CallbackSigner};

use crate::coordinator::{MarkPaid, OrderCoordinator};
use crate::error::OrderError;
use crate::locks::KeyedLocks;
use crate::models::{OrderStatus, PaymentAttempt};
use crate::repository::PaymentRepository;

/// A stored PENDING attempt plus what the client needs to complete it
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub payment: PaymentAttempt,
    pub payload: PaymentPayload,
}

/// Asynchronous notification from the payment provider, as received
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCallback {
    #[serde(alias = "paymentId")]
    pub payment_id: String,
    #[serde(alias = "orderId")]
    pub order_id: String,
    pub status: String,
    #[serde(default, alias = "transactionId")]
    pub transaction_id: String,
    pub amount: i64,
    #[serde(default)]
    pub signature: String,
}

impl PaymentCallback {
    fn fields(&self) -> CallbackFields<'_> {
        CallbackFields {
            payment_id: &self.payment_id,
            order_id: &self.order_id,
            status: &self.status,
            transaction_id: &self.transaction_id,
            amount: self.amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackOutcome {
    /// The callback moved the attempt to this terminal status
    Applied(PaymentStatus),
    /// The attempt was already terminal; nothing changed
    Duplicate(PaymentStatus),
}

/// Turns provider callbacks into order state, exactly once per attempt.
pub struct PaymentReconciler {
    coordinator: Arc<OrderCoordinator>,
    payments: Arc<dyn PaymentRepository>,
    gateway: Arc<dyn PaymentGateway>,
    signer: CallbackSigner,
    locks: KeyedLocks,
}

impl PaymentReconciler {
    pub fn new(
        coordinator: Arc<OrderCoordinator>,
        payments: Arc<dyn PaymentRepository>,
        gateway: Arc<dyn PaymentGateway>,
        signer: CallbackSigner,
    ) -> Self {
        Self {
            coordinator,
            payments,
            gateway,
            signer,
            locks: KeyedLocks::new(),
        }
    }

    /// Open a payment attempt for an unpaid order the caller owns.
    ///
    /// The attempt is stored before the gateway is contacted, so a callback
    /// can never reference an attempt we do not know.
    pub async fn initiate(&self, order_id: Uuid, user_id: &str, method: &str) -> Result<PaymentIntent, OrderError> {
        let order = self.coordinator.get_order(order_id, user_id).await?;

        if order.status != OrderStatus::PendingPayment {
            return Err(OrderError::InvalidState(format!(
                "order {} is {}, payment is only possible while PENDING_PAYMENT",
                order_id, order.status
            )));
        }

        let now = Utc::now();
        if now > order.payment_deadline {
            return Err(OrderError::InvalidState(format!(
                "payment deadline for order {} passed at {}",
                order_id, order.payment_deadline
            )));
        }

        let method: PaymentMethod = method.parse().map_err(OrderError::InvalidMethod)?;

        let payment = PaymentAttempt::new(&order, method, now);
        self.payments.create_payment(&payment).await?;

        let request = IntentRequest {
            payment_id: payment.id,
            order_id,
            method,
            amount: payment.amount,
        };
        let payload = self.gateway.create_intent(&request).await.map_err(|e| {
            tracing::error!("Gateway rejected payment {} for order {}: {}", payment.id, order_id, e);
            OrderError::Gateway(e.to_string())
        })?;

        tracing::info!(
            "Payment {} opened for order {} via {} ({})",
            payment.id, order_id, method, payment.amount
        );
        Ok(PaymentIntent { payment, payload })
    }

    /// Validate and apply one provider callback.
    ///
    /// Redelivery of a callback that was already applied returns
    /// `Duplicate` without side effects. Rejected callbacks change nothing.
    pub async fn apply_callback(&self, callback: &PaymentCallback) -> Result<CallbackOutcome, OrderError> {
        if !self.signer.verify(&callback.fields(), &callback.signature) {
            tracing::warn!(
                "Rejected callback for payment {}: bad signature",
                callback.payment_id
            );
            return Err(OrderError::BadSignature);
        }

        let payment_id = Uuid::parse_str(&callback.payment_id)
            .map_err(|_| OrderError::NotFound(format!("payment {}", callback.payment_id)))?;
        let _guard = self.locks.acquire(payment_id).await;

        let payment = self
            .payments
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("payment {}", payment_id)))?;

        // An unparseable order id can never match the attempt's order
        if Uuid::parse_str(&callback.order_id).ok() != Some(payment.order_id) {
            tracing::warn!(
                "Rejected callback: payment {} belongs to order {}, not {}",
                payment_id, payment.order_id, callback.order_id
            );
            return Err(OrderError::Mismatch {
                payment_id: callback.payment_id.clone(),
                order_id: callback.order_id.clone(),
            });
        }
        let order_id = payment.order_id;

        if payment.status.is_terminal() {
            tracing::info!("Duplicate callback for payment {} ({})", payment_id, payment.status);
            return Ok(CallbackOutcome::Duplicate(payment.status));
        }

        if callback.amount != payment.amount {
            tracing::warn!(
                "Rejected callback for payment {}: amount {} != {}",
                payment_id, callback.amount, payment.amount
            );
            return Err(OrderError::AmountMismatch {
                expected: payment.amount,
                received: callback.amount,
            });
        }

        let status: PaymentStatus = callback.status.parse().map_err(OrderError::Validation)?;

        match status {
            PaymentStatus::Success => {
                // Order first: if we crash in between, redelivery finds the
                // attempt still PENDING and mark_paid is a no-op for it.
                match self.coordinator.mark_paid(order_id, payment_id, &callback.transaction_id).await {
                    Ok(MarkPaid::Paid(_)) | Ok(MarkPaid::AlreadyPaid(_)) => {}
                    Err(e) => {
                        tracing::warn!("Callback for payment {} not applied: {}", payment_id, e);
                        return Err(e);
                    }
                }
                self.settle(payment_id, PaymentStatus::Success, &callback.transaction_id).await
            }
            PaymentStatus::Failed => {
                let outcome = self.settle(payment_id, PaymentStatus::Failed, &callback.transaction_id).await?;
                tracing::info!("Payment {} for order {} failed at provider", payment_id, order_id);
                Ok(outcome)
            }
            PaymentStatus::Pending => Err(OrderError::Validation(
                "callback status must be SUCCESS or FAILED".to_string(),
            )),
        }
    }

    /// Owner-only read of one attempt
    pub async fn get_payment(&self, payment_id: Uuid, user_id: &str) -> Result<PaymentAttempt, OrderError> {
        let payment = self
            .payments
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("payment {}", payment_id)))?;
        if payment.user_id != user_id {
            return Err(OrderError::Forbidden(payment.order_id));
        }
        Ok(payment)
    }

    /// Attempts for an order the caller owns, oldest first
    pub async fn list_payments(&self, order_id: Uuid, user_id: &str) -> Result<Vec<PaymentAttempt>, OrderError> {
        self.coordinator.get_order(order_id, user_id).await?;
        Ok(self.payments.list_payments(order_id).await?)
    }

    async fn settle(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        transaction_id: &str,
    ) -> Result<CallbackOutcome, OrderError> {
        if self.payments.settle_payment(payment_id, status, transaction_id, Utc::now()).await? {
            Ok(CallbackOutcome::Applied(status))
        } else {
            Ok(CallbackOutcome::Duplicate(status))
        }
    }
}
