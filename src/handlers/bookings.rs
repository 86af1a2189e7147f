use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, Role};
use crate::services::booking::{self, CreateBookingParams, CreatedBooking};
use crate::state::AppState;

#[derive(Serialize)]
pub struct BookingResponse {
    id: String,
    venue_id: String,
    user_id: String,
    start_at: String,
    end_at: String,
    is_full_day: bool,
    base_rate: String,
    pricing_unit: String,
    quantity: i64,
    subtotal: String,
    tax_amount: String,
    platform_fee: String,
    platform_commission: String,
    vendor_payout: String,
    total_amount: String,
    status: String,
    hold_expires_at: Option<String>,
    payment_id: Option<String>,
    order_id: Option<String>,
    payment_status: String,
    payment_amount: Option<String>,
    refund_status: String,
    refund_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<&Booking> for BookingResponse {
    fn from(b: &Booking) -> Self {
        let fmt = |dt: &NaiveDateTime| dt.format(queries::DT_FORMAT).to_string();
        Self {
            id: b.id.clone(),
            venue_id: b.venue_id.clone(),
            user_id: b.user_id.clone(),
            start_at: fmt(&b.start_at),
            end_at: fmt(&b.end_at),
            is_full_day: b.is_full_day,
            base_rate: b.base_rate.to_string(),
            pricing_unit: b.pricing_unit.as_str().to_string(),
            quantity: b.quantity,
            subtotal: b.subtotal.to_string(),
            tax_amount: b.tax_amount.to_string(),
            platform_fee: b.platform_fee.to_string(),
            platform_commission: b.platform_commission.to_string(),
            vendor_payout: b.vendor_payout.to_string(),
            total_amount: b.total_amount.to_string(),
            status: b.status.as_str().to_string(),
            hold_expires_at: b.hold_expires_at.as_ref().map(fmt),
            payment_id: b.payment_id.clone(),
            order_id: b.order_id.clone(),
            payment_status: b.payment_status.as_str().to_string(),
            payment_amount: b.payment_amount.map(|d| d.to_string()),
            refund_status: b.refund_status.as_str().to_string(),
            refund_id: b.refund_id.clone(),
            created_at: fmt(&b.created_at),
            updated_at: fmt(&b.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct CheckoutDetails {
    key_id: String,
    order_id: String,
    amount: i64,
    currency: String,
}

#[derive(Serialize)]
pub struct CreateBookingResponse {
    #[serde(flatten)]
    booking: BookingResponse,
    checkout: CheckoutDetails,
}

impl From<&CreatedBooking> for CreateBookingResponse {
    fn from(created: &CreatedBooking) -> Self {
        Self {
            booking: BookingResponse::from(&created.booking),
            checkout: CheckoutDetails {
                key_id: created.key_id.clone(),
                order_id: created.order_id.clone(),
                amount: created.amount_minor,
                currency: created.currency.clone(),
            },
        }
    }
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime, AppError> {
    NaiveDateTime::parse_from_str(s, queries::DT_FORMAT).map_err(|_| {
        AppError::Validation(format!("invalid datetime: {s} (expected YYYY-MM-DD HH:MM:SS)"))
    })
}

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub venue_id: String,
    pub start_at: String,
    pub end_at: String,
    #[serde(default)]
    pub is_full_day: bool,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreateBookingResponse>), AppError> {
    let user = super::authenticate(&state, &headers)?;

    let params = CreateBookingParams {
        venue_id: request.venue_id,
        start_at: parse_datetime(&request.start_at)?,
        end_at: parse_datetime(&request.end_at)?,
        is_full_day: request.is_full_day,
    };

    let created = booking::create_booking(&state, &user, params).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse::from(&created)),
    ))
}

// GET /api/bookings
#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let user = super::authenticate(&state, &headers)?;
    let limit = query.limit.unwrap_or(50);

    let bookings = {
        let db = state.db.lock().unwrap();
        match user.role {
            Role::Admin => queries::list_bookings(&db, limit)?,
            Role::Vendor => queries::list_bookings_for_owner(&db, &user.id, limit)?,
            Role::User => queries::list_bookings_for_user(&db, &user.id, limit)?,
        }
    };

    Ok(Json(bookings.iter().map(BookingResponse::from).collect()))
}

// GET /api/bookings/my
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let user = super::authenticate(&state, &headers)?;
    let limit = query.limit.unwrap_or(50);

    let bookings = {
        let db = state.db.lock().unwrap();
        queries::list_bookings_for_user(&db, &user.id, limit)?
    };

    Ok(Json(bookings.iter().map(BookingResponse::from).collect()))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let user = super::authenticate(&state, &headers)?;

    let booking = {
        let db = state.db.lock().unwrap();
        let booking = queries::get_booking(&db, &id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
        let venue = queries::get_venue(&db, &booking.venue_id)?
            .ok_or_else(|| AppError::NotFound(format!("venue {}", booking.venue_id)))?;
        if !booking::can_access(&booking, &venue, &user) {
            return Err(AppError::Forbidden(
                "booking belongs to another user".to_string(),
            ));
        }
        booking
    };

    Ok(Json(BookingResponse::from(&booking)))
}

// POST /api/bookings/:id/verify-payment
#[derive(Deserialize)]
pub struct VerifyPaymentRequest {
    pub payment_id: String,
    pub order_id: String,
    pub signature: String,
}

pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let user = super::authenticate(&state, &headers)?;

    let booking = booking::verify_payment(
        &state,
        &user,
        &id,
        &request.payment_id,
        &request.order_id,
        &request.signature,
    )?;

    Ok(Json(BookingResponse::from(&booking)))
}

// POST /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let user = super::authenticate(&state, &headers)?;
    let booking = booking::cancel_booking(&state, &user, &id).await?;
    Ok(Json(BookingResponse::from(&booking)))
}

// POST /api/bookings/:id/expire — the scheduler's on-demand hook
pub async fn expire_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let user = super::authenticate(&state, &headers)?;
    if !user.is_admin() {
        return Err(AppError::Forbidden("admin only".to_string()));
    }

    let booking = booking::expire_booking(&state, &id)?;
    Ok(Json(BookingResponse::from(&booking)))
}

// GET /api/bookings/:id/logs
#[derive(Serialize)]
pub struct StateLogResponse {
    old_status: String,
    new_status: String,
    changed_at: String,
    changed_by_email: Option<String>,
    notes: String,
}

pub async fn state_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<StateLogResponse>>, AppError> {
    let user = super::authenticate(&state, &headers)?;

    let logs = {
        let db = state.db.lock().unwrap();
        let booking = queries::get_booking(&db, &id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
        let venue = queries::get_venue(&db, &booking.venue_id)?
            .ok_or_else(|| AppError::NotFound(format!("venue {}", booking.venue_id)))?;
        if !booking::can_access(&booking, &venue, &user) {
            return Err(AppError::Forbidden(
                "booking belongs to another user".to_string(),
            ));
        }
        queries::get_state_logs(&db, &id)?
    };

    let response = logs
        .into_iter()
        .map(|(log, email)| StateLogResponse {
            old_status: log.old_status.as_str().to_string(),
            new_status: log.new_status.as_str().to_string(),
            changed_at: log.changed_at.format(queries::DT_FORMAT).to_string(),
            changed_by_email: email,
            notes: log.notes,
        })
        .collect();

    Ok(Json(response))
}

// GET /api/bookings/:id/payment — live details from the gateway
pub async fn payment_details(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = super::authenticate(&state, &headers)?;

    let payment_id = {
        let db = state.db.lock().unwrap();
        let booking = queries::get_booking(&db, &id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
        let venue = queries::get_venue(&db, &booking.venue_id)?
            .ok_or_else(|| AppError::NotFound(format!("venue {}", booking.venue_id)))?;
        if !booking::can_access(&booking, &venue, &user) {
            return Err(AppError::Forbidden(
                "booking belongs to another user".to_string(),
            ));
        }
        booking
            .payment_id
            .ok_or_else(|| AppError::NotFound(format!("no payment recorded for booking {id}")))?
    };

    let details = state
        .payments
        .fetch_payment(&payment_id)
        .await
        .map_err(|e| AppError::ExternalService(format!("failed to fetch payment: {e}")))?;

    Ok(Json(details))
}
