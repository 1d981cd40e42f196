// Notification dispatch. Fired explicitly by the booking orchestration after
// each status change rather than through implicit model hooks, so the
// causality stays visible at the call site. Delivery failures are logged and
// never block or reverse a reservation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    DeliveryFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            message: message.into(),
            read: false,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, user_id: Uuid, message: &str) -> Result<(), NotifyError>;
}

// Log-only dispatcher; a real deployment would fan out to email/push workers
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, user_id: Uuid, message: &str) -> Result<(), NotifyError> {
        info!(%user_id, body = message, "notification dispatched");
        Ok(())
    }
}
