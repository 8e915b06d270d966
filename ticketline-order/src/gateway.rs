use async_trait::async_trait;

use ticketline_core::payment::{IntentRequest, PaymentGateway, PaymentMethod, PaymentPayload};

/// Stand-in for the external payment provider. It only builds the client
/// payload; outcomes arrive later through the signed callback.
pub struct SimulatedGateway {
    base_url: String,
}

impl SimulatedGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_intent(
        &self,
        request: &IntentRequest,
    ) -> Result<PaymentPayload, Box<dyn std::error::Error + Send + Sync>> {
        let payload = match request.method {
            PaymentMethod::Alipay | PaymentMethod::Unionpay => PaymentPayload::Redirect {
                url: format!(
                    "{}/{}/checkout?payment_id={}&order_id={}&amount={}",
                    self.base_url, request.method, request.payment_id, request.order_id, request.amount
                ),
            },
            PaymentMethod::Wechat => PaymentPayload::QrCode {
                code_url: format!("weixin://wxpay/bizpayurl?pr={}", request.payment_id.simple()),
            },
        };

        tracing::debug!("Simulated gateway opened {} payment {}", request.method, request.payment_id);
        Ok(payload)
    }
}
