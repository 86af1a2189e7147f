pub mod bookings;
pub mod health;
pub mod venues;
pub mod webhook;

use axum::http::HeaderMap;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::User;
use crate::state::AppState;

/// Resolve the acting user from a bearer token. Token issuance lives with
/// the identity service; this layer only maps tokens to users.
pub(crate) fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() {
        return Err(AppError::Unauthorized);
    }

    let db = state.db.lock().unwrap();
    queries::get_user_by_token(&db, token)?.ok_or(AppError::Unauthorized)
}
