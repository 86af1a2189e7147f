use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, PaymentStatus, RefundStatus, User, Venue};
use crate::services::state_machine;
use crate::state::AppState;

pub struct CreateBookingParams {
    pub venue_id: String,
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub is_full_day: bool,
}

/// Booking plus everything the client needs to start checkout.
pub struct CreatedBooking {
    pub booking: Booking,
    pub order_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub key_id: String,
}

/// Place a hold on a venue slot and open a payment order for it.
///
/// The hold is written and committed before the gateway call so the
/// database lock is not held across network I/O. If order creation then
/// fails, the freshly created booking is deleted again; a hold with no way
/// to pay for it must not survive.
pub async fn create_booking(
    state: &Arc<AppState>,
    user: &User,
    params: CreateBookingParams,
) -> Result<CreatedBooking, AppError> {
    if params.start_at <= Utc::now().naive_utc() {
        return Err(AppError::Validation(
            "Booking must be for a future date/time".to_string(),
        ));
    }

    let (mut booking, venue, notes) = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        let venue = queries::get_venue(&tx, &params.venue_id)?
            .ok_or_else(|| AppError::NotFound(format!("venue {}", params.venue_id)))?;
        if !venue.is_published() {
            return Err(AppError::NotFound(format!("venue {}", params.venue_id)));
        }

        let quote = super::pricing::quote(
            params.start_at,
            params.end_at,
            params.is_full_day,
            venue.base_rate,
        )?;

        if !queries::slot_available(&tx, &venue.id, &params.start_at, &params.end_at, None)? {
            return Err(AppError::Conflict(
                "This time slot is not available".to_string(),
            ));
        }

        let now = Utc::now().naive_utc();
        let mut booking = Booking {
            id: Uuid::new_v4().to_string(),
            venue_id: venue.id.clone(),
            user_id: user.id.clone(),
            start_at: params.start_at,
            end_at: params.end_at,
            is_full_day: params.is_full_day,
            base_rate: venue.base_rate,
            pricing_unit: quote.pricing_unit,
            quantity: quote.quantity,
            subtotal: quote.subtotal,
            tax_amount: quote.tax_amount,
            platform_fee: quote.platform_fee,
            platform_commission: quote.platform_commission,
            vendor_payout: quote.vendor_payout,
            total_amount: quote.total_amount,
            status: BookingStatus::New,
            hold_expires_at: None,
            payment_id: None,
            order_id: None,
            payment_status: PaymentStatus::Pending,
            payment_amount: None,
            refund_status: RefundStatus::None,
            refund_id: None,
            created_at: now,
            updated_at: now,
        };
        queries::create_booking(&tx, &booking)?;

        let notes = state_machine::transition(
            &tx,
            &mut booking,
            BookingStatus::Held,
            Some(user),
            "booking request accepted",
            state.config.hold_minutes,
        )?;

        tx.commit()?;
        (booking, venue, notes)
    };

    state.notifier.dispatch(notes);

    let amount_minor = to_minor_units(booking.total_amount)?;
    let metadata = serde_json::json!({
        "booking_id": booking.id,
        "venue_name": venue.name,
        "customer_email": user.email,
    });

    let order = match state
        .payments
        .create_order(amount_minor, &state.config.currency, &booking.id, metadata)
        .await
    {
        Ok(order) => order,
        Err(e) => {
            tracing::error!(
                booking_id = %booking.id,
                error = %e,
                "payment order creation failed, removing booking"
            );
            let db = state.db.lock().unwrap();
            queries::delete_booking(&db, &booking.id)?;
            return Err(AppError::ExternalService(format!(
                "failed to create payment order: {e}"
            )));
        }
    };

    {
        let db = state.db.lock().unwrap();
        queries::set_order_id(&db, &booking.id, &order.order_id)?;
    }
    booking.order_id = Some(order.order_id.clone());

    tracing::info!(
        booking_id = %booking.id,
        order_id = %order.order_id,
        amount_minor,
        "booking held, payment order created"
    );

    Ok(CreatedBooking {
        booking,
        order_id: order.order_id,
        amount_minor,
        currency: state.config.currency.clone(),
        key_id: state.config.razorpay_key_id.clone(),
    })
}

/// Confirm a held booking once the client reports payment.
///
/// A bad signature records the attempt as FAILED but leaves the booking
/// HELD so the user can retry inside the hold window.
pub fn verify_payment(
    state: &Arc<AppState>,
    actor: &User,
    booking_id: &str,
    payment_id: &str,
    order_id: &str,
    signature: &str,
) -> Result<Booking, AppError> {
    let (booking, notes) = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        let mut booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
        if booking.user_id != actor.id && !actor.is_admin() {
            return Err(AppError::Forbidden(
                "booking belongs to another user".to_string(),
            ));
        }
        if booking.status != BookingStatus::Held {
            return Err(AppError::Conflict(
                "Only HELD bookings can be confirmed".to_string(),
            ));
        }

        if !state
            .payments
            .verify_payment_signature(order_id, payment_id, signature)
        {
            queries::record_payment(&tx, &booking.id, payment_id, PaymentStatus::Failed, None)?;
            tx.commit()?;
            tracing::warn!(booking_id = %booking.id, "payment signature verification failed");
            return Err(AppError::ExternalService(
                "payment verification failed: invalid signature".to_string(),
            ));
        }

        queries::record_payment(
            &tx,
            &booking.id,
            payment_id,
            PaymentStatus::Completed,
            Some(booking.total_amount),
        )?;
        booking.payment_id = Some(payment_id.to_string());
        booking.payment_status = PaymentStatus::Completed;
        booking.payment_amount = Some(booking.total_amount);

        let notes = state_machine::transition(
            &tx,
            &mut booking,
            BookingStatus::Confirmed,
            Some(actor),
            "payment verified",
            state.config.hold_minutes,
        )?;

        tx.commit()?;
        (booking, notes)
    };

    state.notifier.dispatch(notes);
    tracing::info!(booking_id = %booking.id, "booking confirmed");
    Ok(booking)
}

/// Cancel a confirmed booking, refunding a completed payment first.
///
/// Refund initiation failure is recorded and logged but does not block the
/// cancellation; keeping the slot hostage to a flaky gateway would be worse
/// than chasing the refund out of band.
pub async fn cancel_booking(
    state: &Arc<AppState>,
    actor: &User,
    booking_id: &str,
) -> Result<Booking, AppError> {
    let booking = {
        let db = state.db.lock().unwrap();
        queries::get_booking(&db, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?
    };

    if booking.user_id != actor.id && !actor.is_admin() {
        return Err(AppError::Forbidden(
            "booking belongs to another user".to_string(),
        ));
    }
    if booking.status != BookingStatus::Confirmed {
        return Err(AppError::Conflict(
            "This booking cannot be cancelled".to_string(),
        ));
    }

    if booking.payment_status == PaymentStatus::Completed
        && booking.refund_status == RefundStatus::None
    {
        match &booking.payment_id {
            Some(payment_id) => match state.payments.initiate_refund(payment_id, None).await {
                Ok(refund) => {
                    let db = state.db.lock().unwrap();
                    queries::record_refund(
                        &db,
                        booking_id,
                        RefundStatus::Pending,
                        Some(refund.refund_id.as_str()),
                    )?;
                    tracing::info!(
                        booking_id,
                        refund_id = %refund.refund_id,
                        "refund initiated"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        booking_id,
                        error = %e,
                        "refund initiation failed, cancelling anyway"
                    );
                    let db = state.db.lock().unwrap();
                    queries::record_refund(&db, booking_id, RefundStatus::Failed, None)?;
                }
            },
            None => {
                tracing::warn!(booking_id, "payment completed but no payment id, skipping refund");
            }
        }
    }

    let (booking, notes) = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        // Fresh read: the status may have moved while the gateway call ran
        let mut booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
        if booking.status != BookingStatus::Confirmed {
            return Err(AppError::Conflict(
                "This booking cannot be cancelled".to_string(),
            ));
        }

        let notes = state_machine::transition(
            &tx,
            &mut booking,
            BookingStatus::Cancelled,
            Some(actor),
            "cancelled by user",
            state.config.hold_minutes,
        )?;

        tx.commit()?;
        (booking, notes)
    };

    state.notifier.dispatch(notes);
    tracing::info!(booking_id = %booking.id, "booking cancelled");
    Ok(booking)
}

/// Move an overdue hold to EXPIRED. Rejects holds still inside their
/// window; a booking that already left HELD is a conflict, which lets the
/// sweep and a racing confirm both run without stepping on each other.
pub fn expire_booking(state: &Arc<AppState>, booking_id: &str) -> Result<Booking, AppError> {
    let (booking, notes) = {
        let mut db = state.db.lock().unwrap();
        let tx = db.transaction()?;

        let mut booking = queries::get_booking(&tx, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
        if booking.status != BookingStatus::Held {
            return Err(AppError::Conflict(
                "Only HELD bookings can expire".to_string(),
            ));
        }
        match booking.hold_expires_at {
            Some(deadline) if deadline <= Utc::now().naive_utc() => {}
            _ => {
                return Err(AppError::Conflict(
                    "Booking hold has not expired yet".to_string(),
                ));
            }
        }

        let notes = state_machine::transition(
            &tx,
            &mut booking,
            BookingStatus::Expired,
            None,
            "hold expired",
            state.config.hold_minutes,
        )?;

        tx.commit()?;
        (booking, notes)
    };

    state.notifier.dispatch(notes);
    tracing::info!(booking_id = %booking.id, "booking hold expired");
    Ok(booking)
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Apply a gateway lifecycle event. Mismatched or unknown events are
/// logged and swallowed; the webhook endpoint must keep acknowledging or
/// the gateway will retry forever.
pub fn handle_webhook(state: &Arc<AppState>, event: WebhookEvent) -> Result<(), AppError> {
    match event.event.as_deref().unwrap_or("") {
        "payment.captured" => {
            let entity = &event.payload["payment"]["entity"];
            let (Some(payment_id), Some(order_id)) =
                (entity["id"].as_str(), entity["order_id"].as_str())
            else {
                tracing::warn!("payment.captured event missing payment or order id");
                return Ok(());
            };

            let db = state.db.lock().unwrap();
            let Some(booking) = queries::get_booking_by_order_id(&db, order_id)? else {
                tracing::warn!(order_id, "payment captured for unknown order");
                return Ok(());
            };
            if booking.payment_status == PaymentStatus::Completed {
                tracing::debug!(booking_id = %booking.id, "duplicate capture event ignored");
                return Ok(());
            }

            queries::record_payment(
                &db,
                &booking.id,
                payment_id,
                PaymentStatus::Completed,
                Some(booking.total_amount),
            )?;
            tracing::info!(booking_id = %booking.id, payment_id, "payment captured");
        }
        "refund.processed" => {
            let entity = &event.payload["refund"]["entity"];
            let (Some(refund_id), Some(payment_id)) =
                (entity["id"].as_str(), entity["payment_id"].as_str())
            else {
                tracing::warn!("refund.processed event missing refund or payment id");
                return Ok(());
            };

            let db = state.db.lock().unwrap();
            let Some(booking) = queries::get_booking_by_payment_id(&db, payment_id)? else {
                tracing::warn!(payment_id, "refund processed for unknown payment");
                return Ok(());
            };
            if booking.refund_status == RefundStatus::Completed {
                tracing::debug!(booking_id = %booking.id, "duplicate refund event ignored");
                return Ok(());
            }

            queries::record_refund(&db, &booking.id, RefundStatus::Completed, Some(refund_id))?;
            queries::set_payment_status(&db, &booking.id, PaymentStatus::Refunded)?;
            tracing::info!(booking_id = %booking.id, refund_id, "refund processed");
        }
        other => {
            tracing::debug!(event = other, "ignoring webhook event");
        }
    }

    Ok(())
}

/// The booking's user, the venue owner and admins may see a booking and
/// its transition history.
pub fn can_access(booking: &Booking, venue: &Venue, actor: &User) -> bool {
    actor.is_admin() || booking.user_id == actor.id || venue.owner_id == actor.id
}

fn to_minor_units(amount: Decimal) -> Result<i64, AppError> {
    (amount * Decimal::from(100))
        .to_i64()
        .ok_or_else(|| AppError::Validation("amount out of range".to_string()))
}
