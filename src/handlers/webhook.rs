use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::services::booking::{self, WebhookEvent};
use crate::state::AppState;

/// Razorpay lifecycle callback.
///
/// Business-level mismatches (unknown orders, repeated events) are
/// acknowledged with 200 so the gateway stops retrying; only a bad
/// signature or an unparseable payload is rejected.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Skip verification if no webhook secret is configured — dev mode
    if !state.config.razorpay_webhook_secret.is_empty() {
        let signature = headers
            .get("x-razorpay-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if signature.is_empty() || !state.payments.verify_webhook_signature(&body, signature) {
            tracing::warn!("invalid webhook signature");
            return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
        }
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable webhook payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "invalid payload" })),
            )
                .into_response();
        }
    };

    if let Err(e) = booking::handle_webhook(&state, event) {
        // Ack anyway; retrying the same event will not fix a server-side
        // failure and the gateway backs off on nothing else.
        tracing::error!(error = %e, "webhook processing failed");
    }

    Json(serde_json::json!({ "status": "ok" })).into_response()
}
