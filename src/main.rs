use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use venuebook::config::AppConfig;
use venuebook::db;
use venuebook::handlers;
use venuebook::services::notifications::email::SmtpEmailSender;
use venuebook::services::notifications::push::FcmPushSender;
use venuebook::services::notifications::{Dispatcher, NotificationSender};
use venuebook::services::payments::razorpay::RazorpayGateway;
use venuebook::services::sweep;
use venuebook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    if config.razorpay_key_id.is_empty() || config.razorpay_key_secret.is_empty() {
        tracing::warn!("RAZORPAY_KEY_ID/RAZORPAY_KEY_SECRET not set, order creation will fail");
    }
    let payments = RazorpayGateway::new(
        config.razorpay_key_id.clone(),
        config.razorpay_key_secret.clone(),
        config.razorpay_webhook_secret.clone(),
    );

    let mut senders: Vec<Arc<dyn NotificationSender>> = Vec::new();
    if !config.fcm_server_key.is_empty() {
        tracing::info!("push notifications enabled via FCM");
        senders.push(Arc::new(FcmPushSender::new(config.fcm_server_key.clone())));
    }
    if !config.smtp_host.is_empty() {
        match SmtpEmailSender::new(
            &config.smtp_host,
            config.smtp_username.clone(),
            config.smtp_password.clone(),
            &config.email_from,
        ) {
            Ok(sender) => {
                tracing::info!(host = %config.smtp_host, "email notifications enabled");
                senders.push(Arc::new(sender));
            }
            Err(e) => tracing::warn!(error = %e, "email sender disabled"),
        }
    }
    if senders.is_empty() {
        tracing::info!("no notification channels configured");
    }

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        payments: Box::new(payments),
        notifier: Dispatcher::new(senders),
    });

    sweep::start_hold_expiry_sweep(Arc::clone(&state));

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/venues", get(handlers::venues::list_venues))
        .route("/api/venues/:id", get(handlers::venues::get_venue))
        .route(
            "/api/bookings",
            post(handlers::bookings::create_booking).get(handlers::bookings::list_bookings),
        )
        .route("/api/bookings/my", get(handlers::bookings::my_bookings))
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:id/verify-payment",
            post(handlers::bookings::verify_payment),
        )
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .route(
            "/api/bookings/:id/expire",
            post(handlers::bookings::expire_booking),
        )
        .route("/api/bookings/:id/logs", get(handlers::bookings::state_logs))
        .route(
            "/api/bookings/:id/payment",
            get(handlers::bookings::payment_details),
        )
        .route("/webhook/payments", post(handlers::webhook::payment_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
