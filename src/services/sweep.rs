//! Background task that expires overdue booking holds.
//!
//! Runs on a fixed interval and pushes every overdue HELD booking through
//! the normal expire path, so the audit log and notifications behave the
//! same whether a hold dies here or via the on-demand endpoint.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Duration;

use crate::db::queries;
use crate::errors::AppError;
use crate::services::booking;
use crate::state::AppState;

pub fn start_hold_expiry_sweep(state: Arc<AppState>) {
    let interval_secs = state.config.sweep_interval_secs;
    tokio::spawn(async move {
        tracing::info!(interval = interval_secs, "hold expiry sweep started");
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

        loop {
            interval.tick().await;
            sweep_once(&state);
        }
    });
}

/// One pass over overdue holds. A hold that a concurrent confirm got to
/// first shows up as a conflict, which is the expected outcome of losing
/// that race, not an error.
pub fn sweep_once(state: &Arc<AppState>) {
    let due = {
        let db = state.db.lock().unwrap();
        match queries::find_expired_holds(&db, &Utc::now().naive_utc()) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "hold expiry scan failed");
                return;
            }
        }
    };

    for id in due {
        match booking::expire_booking(state, &id) {
            Ok(_) => {}
            Err(AppError::Conflict(_)) => {
                tracing::debug!(booking_id = %id, "booking transitioned before sweep");
            }
            Err(e) => {
                tracing::warn!(booking_id = %id, error = %e, "failed to expire booking");
            }
        }
    }
}
