use chrono::{NaiveDateTime, NaiveTime};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::AppError;
use crate::models::PricingUnit;

/// Immutable price breakdown captured on the booking at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub pricing_unit: PricingUnit,
    pub quantity: i64,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub platform_fee: Decimal,
    pub platform_commission: Decimal,
    pub vendor_payout: Decimal,
    pub total_amount: Decimal,
}

/// Price a time range at the given rate.
///
/// Hourly bookings charge whole elapsed hours; the fraction is dropped, so
/// a 3h59m range bills 3 hours. That is the charging policy, not an
/// accident of integer division. Full-day bookings must run midnight to
/// midnight and bill whole days.
pub fn quote(
    start: NaiveDateTime,
    end: NaiveDateTime,
    is_full_day: bool,
    base_rate: Decimal,
) -> Result<PriceQuote, AppError> {
    if end <= start {
        return Err(AppError::Validation(
            "End datetime must be after start datetime".to_string(),
        ));
    }

    let (pricing_unit, quantity) = if is_full_day {
        if start.time() != NaiveTime::MIN || end.time() != NaiveTime::MIN {
            return Err(AppError::Validation(
                "Full day bookings must start and end at midnight".to_string(),
            ));
        }
        (PricingUnit::Day, (end - start).num_days())
    } else {
        (PricingUnit::Hour, (end - start).num_hours())
    };

    let subtotal = round(base_rate * Decimal::from(quantity));
    let tax_amount = round(subtotal * Decimal::new(18, 2));
    let platform_fee = round(subtotal * Decimal::new(5, 2));
    let platform_commission = round(subtotal * Decimal::new(10, 2));

    Ok(PriceQuote {
        pricing_unit,
        quantity,
        subtotal,
        tax_amount,
        platform_fee,
        platform_commission,
        vendor_payout: subtotal - platform_commission,
        total_amount: subtotal + tax_amount + platform_fee,
    })
}

// Half-up to two places, padded so 4000 renders as 4000.00.
fn round(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}
