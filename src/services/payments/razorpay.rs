use anyhow::Context;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{PaymentGateway, PaymentOrder, RefundReceipt};

const API_BASE: &str = "https://api.razorpay.com/v1";

pub struct RazorpayGateway {
    key_id: String,
    key_secret: String,
    webhook_secret: String,
    client: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(key_id: String, key_secret: String, webhook_secret: String) -> Self {
        Self {
            key_id,
            key_secret,
            webhook_secret,
            client: reqwest::Client::new(),
        }
    }

    fn sign(secret: &str, data: &[u8]) -> Option<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(data);
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
        notes: serde_json::Value,
    ) -> anyhow::Result<PaymentOrder> {
        let body = serde_json::json!({
            "amount": amount_minor,
            "currency": currency,
            "receipt": receipt,
            "notes": notes,
        });

        let response: serde_json::Value = self
            .client
            .post(format!("{API_BASE}/orders"))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .context("failed to reach payment gateway")?
            .error_for_status()
            .context("order creation rejected")?
            .json()
            .await
            .context("invalid order response")?;

        let order_id = response["id"]
            .as_str()
            .context("order response missing id")?
            .to_string();

        Ok(PaymentOrder { order_id })
    }

    /// Razorpay signs `"{order_id}|{payment_id}"` with the key secret.
    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let payload = format!("{order_id}|{payment_id}");
        match Self::sign(&self.key_secret, payload.as_bytes()) {
            Some(expected) => expected == signature,
            None => false,
        }
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        match Self::sign(&self.webhook_secret, body) {
            Some(expected) => expected == signature,
            None => false,
        }
    }

    async fn initiate_refund(
        &self,
        payment_id: &str,
        amount_minor: Option<i64>,
    ) -> anyhow::Result<RefundReceipt> {
        let mut body = serde_json::json!({});
        if let Some(amount) = amount_minor {
            body["amount"] = amount.into();
        }

        let response: serde_json::Value = self
            .client
            .post(format!("{API_BASE}/payments/{payment_id}/refund"))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .context("failed to reach payment gateway")?
            .error_for_status()
            .context("refund rejected")?
            .json()
            .await
            .context("invalid refund response")?;

        let refund_id = response["id"]
            .as_str()
            .context("refund response missing id")?
            .to_string();

        Ok(RefundReceipt { refund_id })
    }

    async fn fetch_payment(&self, payment_id: &str) -> anyhow::Result<serde_json::Value> {
        self.client
            .get(format!("{API_BASE}/payments/{payment_id}"))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .context("failed to reach payment gateway")?
            .error_for_status()
            .context("payment lookup rejected")?
            .json()
            .await
            .context("invalid payment response")
    }
}
