use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use rust_decimal::Decimal;
use tower::ServiceExt;

use venuebook::config::AppConfig;
use venuebook::db::{self, queries};
use venuebook::handlers;
use venuebook::models::{Role, User, Venue};
use venuebook::services::notifications::{Dispatcher, Notification, NotificationSender};
use venuebook::services::payments::{PaymentGateway, PaymentOrder, RefundReceipt};
use venuebook::services::sweep;
use venuebook::state::AppState;

// ── Mock providers ──

#[derive(Default)]
struct MockGateway {
    fail_orders: bool,
    fail_refunds: bool,
    orders: Arc<Mutex<Vec<(i64, String)>>>,
    refunds: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        _currency: &str,
        receipt: &str,
        _notes: serde_json::Value,
    ) -> anyhow::Result<PaymentOrder> {
        if self.fail_orders {
            anyhow::bail!("gateway unavailable");
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push((amount_minor, receipt.to_string()));
        Ok(PaymentOrder {
            order_id: format!("order_{}", orders.len()),
        })
    }

    fn verify_payment_signature(&self, _order_id: &str, _payment_id: &str, signature: &str) -> bool {
        signature == "valid"
    }

    fn verify_webhook_signature(&self, _body: &[u8], _signature: &str) -> bool {
        true
    }

    async fn initiate_refund(
        &self,
        payment_id: &str,
        _amount_minor: Option<i64>,
    ) -> anyhow::Result<RefundReceipt> {
        if self.fail_refunds {
            anyhow::bail!("refund rejected");
        }
        self.refunds.lock().unwrap().push(payment_id.to_string());
        Ok(RefundReceipt {
            refund_id: "rfnd_1".to_string(),
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "id": payment_id, "status": "captured" }))
    }
}

struct RecordingSender {
    sent: Arc<Mutex<Vec<Notification>>>,
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, note: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(note.clone());
        Ok(())
    }
}

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        razorpay_key_id: "key_test".to_string(),
        razorpay_key_secret: "secret".to_string(),
        razorpay_webhook_secret: "".to_string(), // empty = skip signature validation
        currency: "INR".to_string(),
        hold_minutes: 15,
        sweep_interval_secs: 60,
        fcm_server_key: "".to_string(),
        smtp_host: "".to_string(),
        smtp_username: "".to_string(),
        smtp_password: "".to_string(),
        email_from: "bookings@venuebook.example".to_string(),
    }
}

fn seed(conn: &rusqlite::Connection) {
    let users = [
        ("user-1", "customer@example.com", "Carl Customer", Role::User, "customer-token"),
        ("user-2", "other@example.com", "Olga Other", Role::User, "other-token"),
        ("vendor-1", "vendor@example.com", "Vera Vendor", Role::Vendor, "vendor-token"),
        ("vendor-2", "vendor2@example.com", "Vikram Vendor", Role::Vendor, "vendor2-token"),
        ("admin-1", "admin@example.com", "Ada Admin", Role::Admin, "admin-token"),
    ];
    for (id, email, name, role, token) in users {
        let user = User {
            id: id.to_string(),
            email: email.to_string(),
            full_name: name.to_string(),
            role,
        };
        queries::create_user(conn, &user, token).unwrap();
    }

    let venues = [
        ("venue-1", "Grand Hall", "vendor-1", 1000, "published"),
        ("venue-2", "River Lawn", "vendor-2", 500, "published"),
        ("venue-3", "Hidden Barn", "vendor-1", 800, "draft"),
    ];
    for (id, name, owner, rate, status) in venues {
        let venue = Venue {
            id: id.to_string(),
            name: name.to_string(),
            owner_id: owner.to_string(),
            base_rate: Decimal::from(rate),
            status: status.to_string(),
        };
        queries::create_venue(conn, &venue).unwrap();
    }

    queries::add_device_token(conn, "user-1", "device-abc").unwrap();
}

fn test_state_with(
    gateway: MockGateway,
) -> (Arc<AppState>, Arc<Mutex<Vec<Notification>>>) {
    let conn = db::init_db(":memory:").unwrap();
    seed(&conn);

    let sent = Arc::new(Mutex::new(vec![]));
    let sender = RecordingSender {
        sent: Arc::clone(&sent),
    };

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: test_config(),
        payments: Box::new(gateway),
        notifier: Dispatcher::new(vec![Arc::new(sender)]),
    });

    (state, sent)
}

fn test_state() -> (Arc<AppState>, Arc<Mutex<Vec<Notification>>>) {
    test_state_with(MockGateway::default())
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
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
        .with_state(state)
}

fn post_json(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_authed(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Notification dispatch runs on spawned tasks; poll until it lands.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}

fn create_request(venue_id: &str, start: &str, end: &str) -> serde_json::Value {
    serde_json::json!({
        "venue_id": venue_id,
        "start_at": start,
        "end_at": end,
        "is_full_day": false,
    })
}

/// Create a held booking for user-1 on venue-1 and return (id, order_id).
async fn create_held_booking(app: &Router) -> (String, String) {
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "customer-token",
            create_request("venue-1", "2030-06-16 10:00:00", "2030-06-16 14:00:00"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    (
        body["id"].as_str().unwrap().to_string(),
        body["checkout"]["order_id"].as_str().unwrap().to_string(),
    )
}

async fn confirm_booking(app: &Router, id: &str, order_id: &str) {
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/bookings/{id}/verify-payment"),
            "customer-token",
            serde_json::json!({
                "payment_id": "pay_1",
                "order_id": order_id,
                "signature": "valid",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

fn backdate_hold(state: &Arc<AppState>, id: &str) {
    let db = state.db.lock().unwrap();
    db.execute(
        "UPDATE bookings SET hold_expires_at = '2020-01-01 00:00:00' WHERE id = ?1",
        rusqlite::params![id],
    )
    .unwrap();
}

// ── Creation ──

#[tokio::test]
async fn create_booking_holds_slot_and_opens_payment_order() {
    let (state, sent) = test_state();
    let app = test_app(Arc::clone(&state));

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "customer-token",
            create_request("venue-1", "2030-06-16 10:00:00", "2030-06-16 14:00:00"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;

    assert_eq!(body["status"], "HELD");
    assert_eq!(body["pricing_unit"], "hour");
    assert_eq!(body["quantity"], 4);
    assert_eq!(body["subtotal"], "4000.00");
    assert_eq!(body["tax_amount"], "720.00");
    assert_eq!(body["platform_fee"], "200.00");
    assert_eq!(body["total_amount"], "4920.00");
    assert_eq!(body["platform_commission"], "400.00");
    assert_eq!(body["vendor_payout"], "3600.00");
    assert!(body["hold_expires_at"].is_string());

    assert_eq!(body["checkout"]["order_id"], "order_1");
    assert_eq!(body["checkout"]["amount"], 492000);
    assert_eq!(body["checkout"]["currency"], "INR");
    assert_eq!(body["checkout"]["key_id"], "key_test");

    wait_until(|| {
        sent.lock()
            .unwrap()
            .iter()
            .any(|n| n.title == "Booking Held - Action Required")
    })
    .await;
    let sent = sent.lock().unwrap();
    let note = sent
        .iter()
        .find(|n| n.title == "Booking Held - Action Required")
        .unwrap();
    assert_eq!(note.recipient_email, "customer@example.com");
    assert_eq!(note.device_tokens, vec!["device-abc".to_string()]);
}

#[tokio::test]
async fn overlapping_booking_is_rejected() {
    let (state, _) = test_state();
    let app = test_app(state);

    create_held_booking(&app).await;

    // 12:00-16:00 overlaps the held 10:00-14:00 slot
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "other-token",
            create_request("venue-1", "2030-06-16 12:00:00", "2030-06-16 16:00:00"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "This time slot is not available");

    // An adjacent slot is fine
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "other-token",
            create_request("venue-1", "2030-06-16 14:00:00", "2030-06-16 16:00:00"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn order_failure_leaves_no_dangling_booking() {
    let (state, _) = test_state_with(MockGateway {
        fail_orders: true,
        ..Default::default()
    });
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "customer-token",
            create_request("venue-1", "2030-06-16 10:00:00", "2030-06-16 14:00:00"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    // The compensated booking must not occupy the slot or show up anywhere
    let response = app
        .clone()
        .oneshot(get_authed("/api/bookings/my", "customer-token"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 0);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "other-token",
            create_request("venue-1", "2030-06-16 10:00:00", "2030-06-16 14:00:00"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY); // slot free again, only the gateway fails
}

#[tokio::test]
async fn create_booking_validation_errors() {
    let (state, _) = test_state();
    let app = test_app(state);

    // Start in the past
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "customer-token",
            create_request("venue-1", "2020-06-16 10:00:00", "2020-06-16 14:00:00"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // End before start
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "customer-token",
            create_request("venue-1", "2030-06-16 14:00:00", "2030-06-16 10:00:00"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Full-day range not midnight aligned
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "customer-token",
            serde_json::json!({
                "venue_id": "venue-1",
                "start_at": "2030-06-16 09:00:00",
                "end_at": "2030-06-17 09:00:00",
                "is_full_day": true,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unparseable datetime
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "customer-token",
            create_request("venue-1", "tomorrow", "2030-06-16 14:00:00"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown and unpublished venues
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "customer-token",
            create_request("venue-404", "2030-06-16 10:00:00", "2030-06-16 14:00:00"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "customer-token",
            create_request("venue-3", "2030-06-16 10:00:00", "2030-06-16 14:00:00"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn full_day_booking_prices_per_day() {
    let (state, _) = test_state();
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "customer-token",
            serde_json::json!({
                "venue_id": "venue-2",
                "start_at": "2030-06-16 00:00:00",
                "end_at": "2030-06-18 00:00:00",
                "is_full_day": true,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["pricing_unit"], "day");
    assert_eq!(body["quantity"], 2);
    assert_eq!(body["subtotal"], "1000.00");
    assert_eq!(body["total_amount"], "1230.00");
}

// ── Payment verification ──

#[tokio::test]
async fn verified_payment_confirms_booking_and_notifies_owner() {
    let (state, sent) = test_state();
    let app = test_app(Arc::clone(&state));

    let (id, order_id) = create_held_booking(&app).await;

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/bookings/{id}/verify-payment"),
            "customer-token",
            serde_json::json!({
                "payment_id": "pay_1",
                "order_id": order_id,
                "signature": "valid",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "CONFIRMED");
    assert_eq!(body["payment_status"], "COMPLETED");
    assert_eq!(body["payment_amount"], "4920.00");
    assert!(body["hold_expires_at"].is_null());

    wait_until(|| sent.lock().unwrap().iter().any(|n| n.title == "Venue Booked")).await;
    let sent = sent.lock().unwrap();
    let note = sent.iter().find(|n| n.title == "Venue Booked").unwrap();
    assert_eq!(note.recipient_email, "vendor@example.com");

    drop(sent);

    // History: newest first, both transitions present exactly once
    let response = app
        .clone()
        .oneshot(get_authed(&format!("/api/bookings/{id}/logs"), "customer-token"))
        .await
        .unwrap();
    let logs = body_json(response).await;
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["old_status"], "HELD");
    assert_eq!(logs[0]["new_status"], "CONFIRMED");
    assert_eq!(logs[0]["changed_by_email"], "customer@example.com");
    assert_eq!(logs[1]["old_status"], "NEW");
    assert_eq!(logs[1]["new_status"], "HELD");
}

#[tokio::test]
async fn bad_signature_keeps_booking_held_for_retry() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (id, order_id) = create_held_booking(&app).await;

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/bookings/{id}/verify-payment"),
            "customer-token",
            serde_json::json!({
                "payment_id": "pay_1",
                "order_id": order_id,
                "signature": "forged",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let response = app
        .clone()
        .oneshot(get_authed(&format!("/api/bookings/{id}"), "customer-token"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "HELD");
    assert_eq!(body["payment_status"], "FAILED");

    // The user may retry with a good signature while the hold lasts
    confirm_booking(&app, &id, &order_id).await;
}

// ── Cancellation ──

#[tokio::test]
async fn cancelling_paid_booking_initiates_refund_and_logs_once() {
    let refunds = Arc::new(Mutex::new(vec![]));
    let (state, _) = test_state_with(MockGateway {
        refunds: Arc::clone(&refunds),
        ..Default::default()
    });
    let app = test_app(state);

    let (id, order_id) = create_held_booking(&app).await;
    confirm_booking(&app, &id, &order_id).await;

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/bookings/{id}/cancel"),
            "customer-token",
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "CANCELLED");
    assert_eq!(body["refund_status"], "PENDING");
    assert_eq!(body["refund_id"], "rfnd_1");

    assert_eq!(*refunds.lock().unwrap(), vec!["pay_1".to_string()]);

    let response = app
        .clone()
        .oneshot(get_authed(&format!("/api/bookings/{id}/logs"), "customer-token"))
        .await
        .unwrap();
    let logs = body_json(response).await;
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0]["old_status"], "CONFIRMED");
    assert_eq!(logs[0]["new_status"], "CANCELLED");

    // Terminal state: a second cancel is a conflict, not a second log row
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/bookings/{id}/cancel"),
            "customer-token",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn refund_failure_does_not_block_cancellation() {
    let (state, _) = test_state_with(MockGateway {
        fail_refunds: true,
        ..Default::default()
    });
    let app = test_app(state);

    let (id, order_id) = create_held_booking(&app).await;
    confirm_booking(&app, &id, &order_id).await;

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/bookings/{id}/cancel"),
            "customer-token",
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "CANCELLED");
    assert_eq!(body["refund_status"], "FAILED");
}

#[tokio::test]
async fn held_booking_cannot_be_cancelled() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (id, _) = create_held_booking(&app).await;

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/bookings/{id}/cancel"),
            "customer-token",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

// ── Expiry ──

#[tokio::test]
async fn overdue_hold_expires_and_blocks_late_confirmation() {
    let (state, sent) = test_state();
    let app = test_app(Arc::clone(&state));

    let (id, order_id) = create_held_booking(&app).await;
    backdate_hold(&state, &id);

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/bookings/{id}/expire"),
            "admin-token",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "EXPIRED");
    assert!(body["hold_expires_at"].is_null());

    wait_until(|| {
        sent.lock()
            .unwrap()
            .iter()
            .filter(|n| n.title == "Booking Hold Expired")
            .count()
            == 2
    })
    .await;

    // A late payment attempt hits the terminal state
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/bookings/{id}/verify-payment"),
            "customer-token",
            serde_json::json!({
                "payment_id": "pay_1",
                "order_id": order_id,
                "signature": "valid",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // The slot opens up again
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "other-token",
            create_request("venue-1", "2030-06-16 10:00:00", "2030-06-16 14:00:00"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn hold_inside_window_cannot_expire() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (id, _) = create_held_booking(&app).await;

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/bookings/{id}/expire"),
            "admin-token",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Booking hold has not expired yet");

    // The scheduler hook is admin-only
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/bookings/{id}/expire"),
            "customer-token",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn sweep_expires_due_holds() {
    let (state, _) = test_state();
    let app = test_app(Arc::clone(&state));

    let (id, _) = create_held_booking(&app).await;
    backdate_hold(&state, &id);

    sweep::sweep_once(&state);

    let response = app
        .clone()
        .oneshot(get_authed(&format!("/api/bookings/{id}"), "customer-token"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "EXPIRED");

    // Idempotent: a second pass finds nothing to do
    sweep::sweep_once(&state);
    let response = app
        .clone()
        .oneshot(get_authed(&format!("/api/bookings/{id}/logs"), "customer-token"))
        .await
        .unwrap();
    let logs = body_json(response).await;
    assert_eq!(logs.as_array().unwrap().len(), 2); // NEW→HELD, HELD→EXPIRED
}

// ── Webhooks ──

fn webhook_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook/payments")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn duplicate_capture_webhook_is_a_no_op() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (id, order_id) = create_held_booking(&app).await;

    let event = serde_json::json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": { "id": "pay_hook", "order_id": order_id } } },
    });

    let response = app.clone().oneshot(webhook_request(event.clone())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_authed(&format!("/api/bookings/{id}"), "customer-token"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["payment_status"], "COMPLETED");
    assert_eq!(body["payment_id"], "pay_hook");
    assert_eq!(body["payment_amount"], "4920.00");
    assert_eq!(body["status"], "HELD"); // capture alone does not confirm

    // Redelivery: same ack, nothing double-applied
    let response = app.clone().oneshot(webhook_request(event)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_authed(&format!("/api/bookings/{id}"), "customer-token"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["payment_status"], "COMPLETED");

    let response = app
        .clone()
        .oneshot(get_authed(&format!("/api/bookings/{id}/logs"), "customer-token"))
        .await
        .unwrap();
    let logs = body_json(response).await;
    assert_eq!(logs.as_array().unwrap().len(), 1); // still only NEW→HELD
}

#[tokio::test]
async fn refund_webhook_completes_refund() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (id, order_id) = create_held_booking(&app).await;
    confirm_booking(&app, &id, &order_id).await;

    let event = serde_json::json!({
        "event": "refund.processed",
        "payload": { "refund": { "entity": { "id": "rfnd_9", "payment_id": "pay_1" } } },
    });

    let response = app.clone().oneshot(webhook_request(event.clone())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_authed(&format!("/api/bookings/{id}"), "customer-token"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["refund_status"], "COMPLETED");
    assert_eq!(body["refund_id"], "rfnd_9");
    assert_eq!(body["payment_status"], "REFUNDED");

    // Redelivery is acknowledged and ignored
    let response = app.clone().oneshot(webhook_request(event)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn webhook_tolerates_unknown_events_and_references() {
    let (state, _) = test_state();
    let app = test_app(state);

    // Unknown event type
    let response = app
        .clone()
        .oneshot(webhook_request(serde_json::json!({ "event": "invoice.paid" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Known event, unmatched order
    let response = app
        .clone()
        .oneshot(webhook_request(serde_json::json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": { "id": "pay_x", "order_id": "order_404" } } },
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Known event, fields missing
    let response = app
        .clone()
        .oneshot(webhook_request(serde_json::json!({
            "event": "payment.captured",
            "payload": {},
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Structurally invalid payloads are the only rejection
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/payments")
                .header("Content-Type", "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ── Access control & listings ──

#[tokio::test]
async fn state_log_access_is_restricted() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (id, _) = create_held_booking(&app).await;
    let uri = format!("/api/bookings/{id}/logs");

    for token in ["customer-token", "vendor-token", "admin-token"] {
        let response = app.clone().oneshot(get_authed(&uri, token)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "token {token}");
    }

    let response = app
        .clone()
        .oneshot(get_authed(&uri, "other-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(&uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn listings_are_scoped_by_role() {
    let (state, _) = test_state();
    let app = test_app(state);

    create_held_booking(&app).await; // user-1 on venue-1

    // user-2 books venue-2
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/bookings",
            "other-token",
            create_request("venue-2", "2030-07-01 10:00:00", "2030-07-01 12:00:00"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let count = |token: &'static str| {
        let app = app.clone();
        async move {
            let response = app.oneshot(get_authed("/api/bookings", token)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            body_json(response).await.as_array().unwrap().len()
        }
    };

    assert_eq!(count("customer-token").await, 1); // own bookings only
    assert_eq!(count("vendor-token").await, 1); // bookings on their venues
    assert_eq!(count("admin-token").await, 2); // everything
}

#[tokio::test]
async fn payment_details_come_from_the_gateway() {
    let (state, _) = test_state();
    let app = test_app(state);

    let (id, order_id) = create_held_booking(&app).await;

    // Nothing paid yet
    let response = app
        .clone()
        .oneshot(get_authed(&format!("/api/bookings/{id}/payment"), "customer-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    confirm_booking(&app, &id, &order_id).await;

    let response = app
        .clone()
        .oneshot(get_authed(&format!("/api/bookings/{id}/payment"), "customer-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], "pay_1");
    assert_eq!(body["status"], "captured");
}

#[tokio::test]
async fn venue_catalog_lists_published_only() {
    let (state, _) = test_state();
    let app = test_app(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/venues")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let names: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Grand Hall".to_string(), "River Lawn".to_string()]);

    // Draft venues 404 on direct lookup too
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/venues/venue-3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
