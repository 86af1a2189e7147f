use chrono::Utc;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, RefundStatus, User};
use crate::services::notifications::Notification;

/// Legal status moves. Everything else is rejected; CONFIRMED, EXPIRED and
/// CANCELLED are terminal.
pub fn is_legal(from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;
    matches!(
        (from, to),
        (New, Held) | (Held, Confirmed) | (Held, Expired) | (Confirmed, Cancelled)
    )
}

/// Apply a status transition inside the caller's transaction.
///
/// Writes the new status (setting the hold deadline when entering HELD,
/// clearing it otherwise), appends exactly one state-log row, and returns
/// the notifications the transition calls for. The caller dispatches them
/// after commit; delivery failures never unwind the transition.
pub fn transition(
    conn: &Connection,
    booking: &mut Booking,
    new_status: BookingStatus,
    changed_by: Option<&User>,
    notes: &str,
    hold_minutes: i64,
) -> Result<Vec<Notification>, AppError> {
    let old_status = booking.status;
    if !is_legal(old_status, new_status) {
        return Err(AppError::Conflict(format!(
            "cannot transition booking from {} to {}",
            old_status.as_str(),
            new_status.as_str()
        )));
    }

    let hold_expires_at = match new_status {
        BookingStatus::Held => {
            Some(Utc::now().naive_utc() + chrono::Duration::minutes(hold_minutes))
        }
        _ => None,
    };

    queries::update_booking_status(conn, &booking.id, new_status, hold_expires_at.as_ref())?;
    queries::append_state_log(
        conn,
        &booking.id,
        old_status,
        new_status,
        changed_by.map(|u| u.id.as_str()),
        notes,
    )?;

    booking.status = new_status;
    booking.hold_expires_at = hold_expires_at;

    notifications_for(conn, booking, hold_minutes)
}

fn notifications_for(
    conn: &Connection,
    booking: &Booking,
    hold_minutes: i64,
) -> Result<Vec<Notification>, AppError> {
    let venue = queries::get_venue(conn, &booking.venue_id)?
        .ok_or_else(|| AppError::NotFound(format!("venue {}", booking.venue_id)))?;
    let customer = queries::get_user(conn, &booking.user_id)?
        .ok_or_else(|| AppError::NotFound(format!("user {}", booking.user_id)))?;
    let owner = queries::get_user(conn, &venue.owner_id)?
        .ok_or_else(|| AppError::NotFound(format!("user {}", venue.owner_id)))?;
    let customer_tokens = queries::get_device_tokens(conn, &customer.id)?;
    let owner_tokens = queries::get_device_tokens(conn, &owner.id)?;

    let to_customer = |title: &str, body: String| Notification {
        recipient_email: customer.email.clone(),
        device_tokens: customer_tokens.clone(),
        title: title.to_string(),
        body,
    };
    let to_owner = |title: &str, body: String| Notification {
        recipient_email: owner.email.clone(),
        device_tokens: owner_tokens.clone(),
        title: title.to_string(),
        body,
    };

    let when = booking.start_at.format("%Y-%m-%d %H:%M").to_string();

    let notes = match booking.status {
        BookingStatus::Held => vec![to_customer(
            "Booking Held - Action Required",
            format!(
                "Your booking for {} on {} has been held pending payment. \
                 Please complete payment within {} minutes to confirm.",
                venue.name, when, hold_minutes
            ),
        )],
        BookingStatus::Confirmed => vec![
            to_customer(
                "Booking Confirmed",
                format!(
                    "Your booking for {} on {} is confirmed. Booking ID: {}. \
                     Amount paid: \u{20b9}{}.",
                    venue.name, when, booking.id, booking.total_amount
                ),
            ),
            to_owner(
                "Venue Booked",
                format!(
                    "Your venue {} is booked on {}. Customer: {}. Payout: \u{20b9}{}.",
                    venue.name, when, customer.full_name, booking.vendor_payout
                ),
            ),
        ],
        BookingStatus::Expired => vec![
            to_customer(
                "Booking Hold Expired",
                format!(
                    "Your booking hold for {} on {} has expired as payment was not \
                     received in time. You can make a new booking if you still wish to \
                     reserve the venue.",
                    venue.name, when
                ),
            ),
            to_owner(
                "Booking Hold Expired",
                format!(
                    "The pending booking hold for your venue {} on {} has expired and \
                     the date is now available.",
                    venue.name, when
                ),
            ),
        ],
        BookingStatus::Cancelled => {
            let refund_initiated = matches!(
                booking.refund_status,
                RefundStatus::Pending | RefundStatus::Completed
            );
            let customer_note = if refund_initiated {
                to_customer(
                    "Booking Cancelled and Refunded",
                    format!(
                        "Your booking {} has been cancelled and a refund of \u{20b9}{} has \
                         been initiated. It may take a few days to reflect in your account.",
                        booking.id, booking.total_amount
                    ),
                )
            } else {
                to_customer(
                    "Booking Cancelled",
                    format!("Your booking {} has been cancelled.", booking.id),
                )
            };
            vec![
                customer_note,
                to_owner(
                    "Booking Cancelled",
                    format!(
                        "Booking {} was cancelled by the user. The slot is now open. \
                         No payout will be given for this booking.",
                        booking.id
                    ),
                ),
            ]
        }
        BookingStatus::New => vec![],
    };

    Ok(notes)
}
