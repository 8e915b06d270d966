//! Signing contract for payment-provider callbacks.
//!
//! The provider signs the canonical string
//! `paymentId={}&orderId={}&status={}&transactionId={}&amount={}` with
//! HMAC-SHA256 under a shared secret and sends the lowercase hex digest.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The signed fields of a payment callback, in canonical order
#[derive(Debug, Clone, Copy)]
pub struct CallbackFields<'a> {
    pub payment_id: &'a str,
    pub order_id: &'a str,
    pub status: &'a str,
    pub transaction_id: &'a str,
    pub amount: i64,
}

impl CallbackFields<'_> {
    pub fn canonical(&self) -> String {
        format!(
            "paymentId={}&orderId={}&status={}&transactionId={}&amount={}",
            self.payment_id, self.order_id, self.status, self.transaction_id, self.amount
        )
    }
}

#[derive(Clone)]
pub struct CallbackSigner {
    secret: Vec<u8>,
}

impl CallbackSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length
        HmacSha256::new_from_slice(&self.secret).unwrap_or_else(|_| unreachable!())
    }

    pub fn sign(&self, fields: &CallbackFields<'_>) -> String {
        let mut mac = self.mac();
        mac.update(fields.canonical().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time comparison against a hex signature
    pub fn verify(&self, fields: &CallbackFields<'_>, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(fields.canonical().as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

impl std::fmt::Debug for CallbackSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSigner").field("secret", &"********").finish()
    }
}
