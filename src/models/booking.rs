use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub venue_id: String,
    pub user_id: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub is_full_day: bool,
    /// Venue rate captured at creation; later venue edits do not reprice.
    pub base_rate: Decimal,
    pub pricing_unit: PricingUnit,
    pub quantity: i64,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub platform_fee: Decimal,
    pub platform_commission: Decimal,
    pub vendor_payout: Decimal,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub hold_expires_at: Option<NaiveDateTime>,
    pub payment_id: Option<String>,
    pub order_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_amount: Option<Decimal>,
    pub refund_status: RefundStatus,
    pub refund_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    New,
    Held,
    Confirmed,
    Expired,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::New => "NEW",
            BookingStatus::Held => "HELD",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Expired => "EXPIRED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "HELD" => BookingStatus::Held,
            "CONFIRMED" => BookingStatus::Confirmed,
            "EXPIRED" => BookingStatus::Expired,
            "CANCELLED" => BookingStatus::Cancelled,
            _ => BookingStatus::New,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PricingUnit {
    Hour,
    Day,
}

impl PricingUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingUnit::Hour => "hour",
            PricingUnit::Day => "day",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "day" => PricingUnit::Day,
            _ => PricingUnit::Hour,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "COMPLETED" => PaymentStatus::Completed,
            "FAILED" => PaymentStatus::Failed,
            "REFUNDED" => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefundStatus {
    None,
    Pending,
    Completed,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::None => "NONE",
            RefundStatus::Pending => "PENDING",
            RefundStatus::Completed => "COMPLETED",
            RefundStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "PENDING" => RefundStatus::Pending,
            "COMPLETED" => RefundStatus::Completed,
            "FAILED" => RefundStatus::Failed,
            _ => RefundStatus::None,
        }
    }
}

/// Append-only audit row, one per status transition.
#[derive(Debug, Clone, Serialize)]
pub struct BookingStateLog {
    pub id: i64,
    pub booking_id: String,
    pub old_status: BookingStatus,
    pub new_status: BookingStatus,
    pub changed_at: NaiveDateTime,
    pub changed_by: Option<String>,
    pub notes: String,
}
