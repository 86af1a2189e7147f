use std::str::FromStr;

use anyhow::Context;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::models::{
    Booking, BookingStateLog, BookingStatus, PaymentStatus, PricingUnit, RefundStatus, Role, User,
    Venue,
};

pub const DT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_dt(dt: &NaiveDateTime) -> String {
    dt.format(DT_FORMAT).to_string()
}

fn parse_dt(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DT_FORMAT).with_context(|| format!("bad datetime: {s}"))
}

fn parse_dec(s: &str) -> anyhow::Result<Decimal> {
    Decimal::from_str(s).with_context(|| format!("bad decimal: {s}"))
}

// ── Bookings ──

pub fn create_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (
            id, venue_id, user_id, start_at, end_at, is_full_day,
            base_rate, pricing_unit, quantity, subtotal, tax_amount, platform_fee,
            platform_commission, vendor_payout, total_amount,
            status, hold_expires_at, payment_id, order_id, payment_status,
            payment_amount, refund_status, refund_id, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                   ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
        params![
            booking.id,
            booking.venue_id,
            booking.user_id,
            fmt_dt(&booking.start_at),
            fmt_dt(&booking.end_at),
            booking.is_full_day as i32,
            booking.base_rate.to_string(),
            booking.pricing_unit.as_str(),
            booking.quantity,
            booking.subtotal.to_string(),
            booking.tax_amount.to_string(),
            booking.platform_fee.to_string(),
            booking.platform_commission.to_string(),
            booking.vendor_payout.to_string(),
            booking.total_amount.to_string(),
            booking.status.as_str(),
            booking.hold_expires_at.as_ref().map(fmt_dt),
            booking.payment_id,
            booking.order_id,
            booking.payment_status.as_str(),
            booking.payment_amount.map(|d| d.to_string()),
            booking.refund_status.as_str(),
            booking.refund_id,
            fmt_dt(&booking.created_at),
            fmt_dt(&booking.updated_at),
        ],
    )?;
    Ok(())
}

const BOOKING_COLUMNS: &str = "id, venue_id, user_id, start_at, end_at, is_full_day, \
     base_rate, pricing_unit, quantity, subtotal, tax_amount, platform_fee, \
     platform_commission, vendor_payout, total_amount, \
     status, hold_expires_at, payment_id, order_id, payment_status, \
     payment_amount, refund_status, refund_id, created_at, updated_at";

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking_by_order_id(conn: &Connection, order_id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE order_id = ?1"),
        params![order_id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking_by_payment_id(
    conn: &Connection,
    payment_id: &str,
) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE payment_id = ?1"),
        params![payment_id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// A slot is free when no HELD or CONFIRMED booking for the venue overlaps
/// the half-open interval [start, end). `exclude` supports re-checks against
/// a booking that already owns the slot.
pub fn slot_available(
    conn: &Connection,
    venue_id: &str,
    start: &NaiveDateTime,
    end: &NaiveDateTime,
    exclude: Option<&str>,
) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings
          WHERE venue_id = ?1
            AND status IN ('HELD', 'CONFIRMED')
            AND start_at < ?2
            AND end_at > ?3
            AND (?4 IS NULL OR id != ?4)",
        params![venue_id, fmt_dt(end), fmt_dt(start), exclude],
        |row| row.get(0),
    )?;
    Ok(count == 0)
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
    hold_expires_at: Option<&NaiveDateTime>,
) -> anyhow::Result<bool> {
    let now = fmt_dt(&chrono::Utc::now().naive_utc());
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, hold_expires_at = ?2, updated_at = ?3 WHERE id = ?4",
        params![status.as_str(), hold_expires_at.map(fmt_dt), now, id],
    )?;
    Ok(count > 0)
}

pub fn set_order_id(conn: &Connection, id: &str, order_id: &str) -> anyhow::Result<()> {
    let now = fmt_dt(&chrono::Utc::now().naive_utc());
    conn.execute(
        "UPDATE bookings SET order_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![order_id, now, id],
    )?;
    Ok(())
}

pub fn record_payment(
    conn: &Connection,
    id: &str,
    payment_id: &str,
    status: PaymentStatus,
    amount: Option<Decimal>,
) -> anyhow::Result<()> {
    let now = fmt_dt(&chrono::Utc::now().naive_utc());
    conn.execute(
        "UPDATE bookings SET payment_id = ?1, payment_status = ?2, payment_amount = ?3,
                updated_at = ?4 WHERE id = ?5",
        params![
            payment_id,
            status.as_str(),
            amount.map(|d| d.to_string()),
            now,
            id
        ],
    )?;
    Ok(())
}

pub fn set_payment_status(conn: &Connection, id: &str, status: PaymentStatus) -> anyhow::Result<()> {
    let now = fmt_dt(&chrono::Utc::now().naive_utc());
    conn.execute(
        "UPDATE bookings SET payment_status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), now, id],
    )?;
    Ok(())
}

pub fn record_refund(
    conn: &Connection,
    id: &str,
    status: RefundStatus,
    refund_id: Option<&str>,
) -> anyhow::Result<()> {
    let now = fmt_dt(&chrono::Utc::now().naive_utc());
    conn.execute(
        "UPDATE bookings SET refund_status = ?1,
                refund_id = COALESCE(?2, refund_id),
                updated_at = ?3 WHERE id = ?4",
        params![status.as_str(), refund_id, now, id],
    )?;
    Ok(())
}

/// Removes a half-created booking (payment order never materialized).
/// State logs go with it via ON DELETE CASCADE.
pub fn delete_booking(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM bookings WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

pub fn find_expired_holds(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM bookings
          WHERE status = 'HELD' AND hold_expires_at IS NOT NULL AND hold_expires_at < ?1",
    )?;

    let rows = stmt.query_map(params![fmt_dt(now)], |row| row.get::<_, String>(0))?;

    let mut ids = vec![];
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

pub fn list_bookings(conn: &Connection, limit: i64) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY created_at DESC, id LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn list_bookings_for_user(
    conn: &Connection,
    user_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = ?1
          ORDER BY created_at DESC, id LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![user_id, limit], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn list_bookings_for_owner(
    conn: &Connection,
    owner_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(
        "SELECT b.id, b.venue_id, b.user_id, b.start_at, b.end_at, b.is_full_day,
                b.base_rate, b.pricing_unit, b.quantity, b.subtotal, b.tax_amount, b.platform_fee,
                b.platform_commission, b.vendor_payout, b.total_amount,
                b.status, b.hold_expires_at, b.payment_id, b.order_id, b.payment_status,
                b.payment_amount, b.refund_status, b.refund_id, b.created_at, b.updated_at
           FROM bookings b
           JOIN venues v ON v.id = b.venue_id
          WHERE v.owner_id = ?1
          ORDER BY b.created_at DESC, b.id LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![owner_id, limit], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let start_at: String = row.get(3)?;
    let end_at: String = row.get(4)?;
    let base_rate: String = row.get(6)?;
    let pricing_unit: String = row.get(7)?;
    let subtotal: String = row.get(9)?;
    let tax_amount: String = row.get(10)?;
    let platform_fee: String = row.get(11)?;
    let platform_commission: String = row.get(12)?;
    let vendor_payout: String = row.get(13)?;
    let total_amount: String = row.get(14)?;
    let status: String = row.get(15)?;
    let hold_expires_at: Option<String> = row.get(16)?;
    let payment_status: String = row.get(19)?;
    let payment_amount: Option<String> = row.get(20)?;
    let refund_status: String = row.get(21)?;
    let created_at: String = row.get(23)?;
    let updated_at: String = row.get(24)?;

    Ok(Booking {
        id: row.get(0)?,
        venue_id: row.get(1)?,
        user_id: row.get(2)?,
        start_at: parse_dt(&start_at)?,
        end_at: parse_dt(&end_at)?,
        is_full_day: row.get::<_, i32>(5)? != 0,
        base_rate: parse_dec(&base_rate)?,
        pricing_unit: PricingUnit::parse(&pricing_unit),
        quantity: row.get(8)?,
        subtotal: parse_dec(&subtotal)?,
        tax_amount: parse_dec(&tax_amount)?,
        platform_fee: parse_dec(&platform_fee)?,
        platform_commission: parse_dec(&platform_commission)?,
        vendor_payout: parse_dec(&vendor_payout)?,
        total_amount: parse_dec(&total_amount)?,
        status: BookingStatus::parse(&status),
        hold_expires_at: hold_expires_at.as_deref().map(parse_dt).transpose()?,
        payment_id: row.get(17)?,
        order_id: row.get(18)?,
        payment_status: PaymentStatus::parse(&payment_status),
        payment_amount: payment_amount.as_deref().map(parse_dec).transpose()?,
        refund_status: RefundStatus::parse(&refund_status),
        refund_id: row.get(22)?,
        created_at: parse_dt(&created_at)?,
        updated_at: parse_dt(&updated_at)?,
    })
}

// ── State logs ──

pub fn append_state_log(
    conn: &Connection,
    booking_id: &str,
    old_status: BookingStatus,
    new_status: BookingStatus,
    changed_by: Option<&str>,
    notes: &str,
) -> anyhow::Result<()> {
    let now = fmt_dt(&chrono::Utc::now().naive_utc());
    conn.execute(
        "INSERT INTO booking_state_logs (booking_id, old_status, new_status, changed_at, changed_by, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            booking_id,
            old_status.as_str(),
            new_status.as_str(),
            now,
            changed_by,
            notes
        ],
    )?;
    Ok(())
}

/// Transition history for a booking, newest first, with the acting user's
/// email resolved where one exists.
pub fn get_state_logs(
    conn: &Connection,
    booking_id: &str,
) -> anyhow::Result<Vec<(BookingStateLog, Option<String>)>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.booking_id, l.old_status, l.new_status, l.changed_at, l.changed_by,
                l.notes, u.email
           FROM booking_state_logs l
           LEFT JOIN users u ON u.id = l.changed_by
          WHERE l.booking_id = ?1
          ORDER BY l.id DESC",
    )?;

    let rows = stmt.query_map(params![booking_id], |row| {
        let old_status: String = row.get(2)?;
        let new_status: String = row.get(3)?;
        let changed_at: String = row.get(4)?;
        let email: Option<String> = row.get(7)?;
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            old_status,
            new_status,
            changed_at,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, String>(6)?,
            email,
        ))
    })?;

    let mut logs = vec![];
    for row in rows {
        let (id, booking_id, old_status, new_status, changed_at, changed_by, notes, email) = row?;
        logs.push((
            BookingStateLog {
                id,
                booking_id,
                old_status: BookingStatus::parse(&old_status),
                new_status: BookingStatus::parse(&new_status),
                changed_at: parse_dt(&changed_at)?,
                changed_by,
                notes,
            },
            email,
        ));
    }
    Ok(logs)
}

// ── Venues ──

pub fn get_venue(conn: &Connection, id: &str) -> anyhow::Result<Option<Venue>> {
    let result = conn.query_row(
        "SELECT id, name, owner_id, base_rate, status FROM venues WHERE id = ?1",
        params![id],
        |row| Ok(parse_venue_row(row)),
    );

    match result {
        Ok(venue) => Ok(Some(venue?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_published_venues(conn: &Connection) -> anyhow::Result<Vec<Venue>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, owner_id, base_rate, status FROM venues
          WHERE status = 'published' ORDER BY name",
    )?;
    let rows = stmt.query_map([], |row| Ok(parse_venue_row(row)))?;

    let mut venues = vec![];
    for row in rows {
        venues.push(row??);
    }
    Ok(venues)
}

pub fn create_venue(conn: &Connection, venue: &Venue) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO venues (id, name, owner_id, base_rate, status) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            venue.id,
            venue.name,
            venue.owner_id,
            venue.base_rate.to_string(),
            venue.status
        ],
    )?;
    Ok(())
}

fn parse_venue_row(row: &rusqlite::Row) -> anyhow::Result<Venue> {
    let base_rate: String = row.get(3)?;
    Ok(Venue {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        base_rate: parse_dec(&base_rate)?,
        status: row.get(4)?,
    })
}

// ── Users ──

pub fn get_user(conn: &Connection, id: &str) -> anyhow::Result<Option<User>> {
    let result = conn
        .query_row(
            "SELECT id, email, full_name, role FROM users WHERE id = ?1",
            params![id],
            parse_user_row,
        )
        .optional()?;
    Ok(result)
}

pub fn get_user_by_token(conn: &Connection, token: &str) -> anyhow::Result<Option<User>> {
    let result = conn
        .query_row(
            "SELECT id, email, full_name, role FROM users WHERE api_token = ?1",
            params![token],
            parse_user_row,
        )
        .optional()?;
    Ok(result)
}

pub fn create_user(conn: &Connection, user: &User, api_token: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users (id, email, full_name, role, api_token) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id,
            user.email,
            user.full_name,
            user.role.as_str(),
            api_token
        ],
    )?;
    Ok(())
}

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let role: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        role: Role::parse(&role),
    })
}

// ── Device tokens ──

pub fn add_device_token(conn: &Connection, user_id: &str, token: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO device_tokens (user_id, token) VALUES (?1, ?2)",
        params![user_id, token],
    )?;
    Ok(())
}

pub fn get_device_tokens(conn: &Connection, user_id: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT token FROM device_tokens WHERE user_id = ?1")?;
    let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;

    let mut tokens = vec![];
    for row in rows {
        tokens.push(row?);
    }
    Ok(tokens)
}
