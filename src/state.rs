use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::services::mailer::Mailer;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub mailer: Box<dyn Mailer>,
    /// Carries the salon id of every booking write; feed subscribers re-query on it.
    pub booking_tx: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(conn: Connection, config: AppConfig, mailer: Box<dyn Mailer>) -> Self {
        let (booking_tx, _) = broadcast::channel(256);
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            mailer,
            booking_tx,
        }
    }

    pub fn db(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection usable.
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn publish_booking_change(&self, salon_id: &str) {
        // Ignore if no subscribers
        let _ = self.booking_tx.send(salon_id.to_string());
    }
}
