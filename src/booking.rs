// Booking orchestration: commit through the engine, capture payment, drive
// the reservation state machine and fan notifications out to the listing
// owner and the guest.

use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::engine::{BookingError, EnginePolicy, ReservationEngine};
use crate::model::{BookingRequest, Reservation, ReservationStatus};
use crate::notify::Notifier;
use crate::payment::{Payment, PaymentError, PaymentGateway};
use crate::store::{ReservationStore, StoreError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    // The reservation was cancelled and its dates freed before returning this
    #[error("payment capture failed for reservation {reservation_id}: {source}")]
    PaymentFailed {
        reservation_id: Uuid,
        #[source]
        source: PaymentError,
    },

    #[error("cannot transition reservation from {from:?} to {to:?}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),
}

// A booked-and-paid stay
#[derive(Debug)]
pub struct BookingOutcome {
    pub reservation: Reservation,
    pub payment: Payment,
}

pub struct BookingService<S, P, N> {
    engine: ReservationEngine<S>,
    store: Arc<S>,
    gateway: Arc<P>,
    notifier: Arc<N>,
}

impl<S, P, N> BookingService<S, P, N>
where
    S: ReservationStore,
    P: PaymentGateway,
    N: Notifier,
{
    pub fn new(store: Arc<S>, gateway: Arc<P>, notifier: Arc<N>) -> Self {
        Self::with_policy(store, gateway, notifier, EnginePolicy::default())
    }

    pub fn with_policy(
        store: Arc<S>,
        gateway: Arc<P>,
        notifier: Arc<N>,
        policy: EnginePolicy,
    ) -> Self {
        Self {
            engine: ReservationEngine::with_policy(Arc::clone(&store), policy),
            store,
            gateway,
            notifier,
        }
    }

    pub fn engine(&self) -> &ReservationEngine<S> {
        &self.engine
    }

    // Full booking flow. The engine commit is the only step that competes
    // with concurrent requests; everything after it operates on a reservation
    // this call owns.
    pub async fn book(&self, request: &BookingRequest) -> Result<BookingOutcome, ServiceError> {
        let reservation = self.engine.commit(request).await?;

        match self.gateway.capture(&reservation).await {
            Ok(payment) => {
                let confirmed = self
                    .transition(&reservation, ReservationStatus::Confirmed)
                    .await?;
                self.announce(&confirmed, "Booking confirmed").await;
                Ok(BookingOutcome {
                    reservation: confirmed,
                    payment,
                })
            }
            Err(source) => {
                // Free the dates before surfacing the failure
                let cancelled = self
                    .transition(&reservation, ReservationStatus::Cancelled)
                    .await?;
                self.announce(&cancelled, "Booking cancelled: payment failed")
                    .await;
                Err(ServiceError::PaymentFailed {
                    reservation_id: reservation.id,
                    source,
                })
            }
        }
    }

    // Explicit cancellation; allowed from pending and confirmed only
    pub async fn cancel(&self, reservation_id: Uuid) -> Result<Reservation, ServiceError> {
        let reservation = self.store.get_reservation(reservation_id).await?;
        let cancelled = self
            .transition(&reservation, ReservationStatus::Cancelled)
            .await?;
        self.announce(&cancelled, "Booking cancelled").await;
        Ok(cancelled)
    }

    pub async fn guest_bookings(&self, guest_id: Uuid) -> Result<Vec<Reservation>, ServiceError> {
        Ok(self.store.reservations_for_guest(guest_id).await?)
    }

    async fn transition(
        &self,
        reservation: &Reservation,
        to: ReservationStatus,
    ) -> Result<Reservation, ServiceError> {
        if !reservation.status.can_transition_to(to) {
            return Err(ServiceError::InvalidTransition {
                from: reservation.status,
                to,
            });
        }
        Ok(self.store.update_status(reservation.id, to).await?)
    }

    // Notify the guest and the listing owner. Best effort only: a delivery
    // failure must never unwind a committed reservation.
    async fn announce(&self, reservation: &Reservation, message: &str) {
        let text = format!(
            "{}: {} to {} (reservation {})",
            message, reservation.check_in, reservation.check_out, reservation.id
        );

        self.notify_quietly(reservation.guest_id, &text).await;

        match self.store.get_listing(reservation.listing_id).await {
            Ok(listing) => self.notify_quietly(listing.owner_id, &text).await,
            Err(e) => warn!(
                reservation_id = %reservation.id,
                error = %e,
                "skipping owner notification, listing lookup failed"
            ),
        }
    }

    async fn notify_quietly(&self, user_id: Uuid, message: &str) {
        if let Err(e) = self.notifier.notify(user_id, message).await {
            warn!(%user_id, error = %e, "notification delivery failed");
        }
    }
}
