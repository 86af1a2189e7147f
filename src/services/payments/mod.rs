pub mod razorpay;

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub order_id: String,
}

#[derive(Debug, Clone)]
pub struct RefundReceipt {
    pub refund_id: String,
}

/// Remote payment provider. Amounts are in the currency's smallest unit
/// (paise for INR). Signature checks are pure local HMAC work and stay
/// synchronous.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
        notes: serde_json::Value,
    ) -> anyhow::Result<PaymentOrder>;

    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool;

    async fn initiate_refund(
        &self,
        payment_id: &str,
        amount_minor: Option<i64>,
    ) -> anyhow::Result<RefundReceipt>;

    async fn fetch_payment(&self, payment_id: &str) -> anyhow::Result<serde_json::Value>;
}
