// Payment capture collaborator. Invoked by the booking orchestration after a
// reservation commits, never by the engine itself; the reservation status is
// transitioned based on the outcome.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Money, Reservation};

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("payment declined: {0}")]
    Declined(String),

    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

// A captured charge tied 1:1 to a reservation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub amount: Money,
    pub status: PaymentStatus,
    // Provider-side reference (e.g. a payment-intent id)
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    async fn capture(&self, reservation: &Reservation) -> Result<Payment, PaymentError>;
}
