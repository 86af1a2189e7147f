use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::notifications::Dispatcher;
use crate::services::payments::PaymentGateway;

pub struct AppState {
    /// Single connection guarded by a mutex. The lock is the serialization
    /// point for every state-mutating operation on a booking; it must never
    /// be held across an await.
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub payments: Box<dyn PaymentGateway>,
    pub notifier: Dispatcher,
}
