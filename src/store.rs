// Persistence collaborator contract consumed by the reservation engine.
// Production deployments put a relational database behind this trait; the
// in-memory implementation below backs tests and benchmarks.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Listing, Reservation, ReservationStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("listing {0} not found")]
    ListingNotFound(Uuid),

    #[error("reservation {0} not found")]
    ReservationNotFound(Uuid),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

// Reservation persistence contract.
//
// `insert_reservation` is only ever called inside the engine's per-listing
// exclusive section, so implementations do not need their own conflict
// detection; they do need the write to be all-or-nothing.
#[async_trait]
pub trait ReservationStore: Send + Sync + 'static {
    async fn get_listing(&self, listing_id: Uuid) -> Result<Listing, StoreError>;

    // Non-cancelled reservations for a listing, ordered by creation time then
    // id so repeated reads with no intervening writes return the same sequence
    async fn list_active_reservations(
        &self,
        listing_id: Uuid,
    ) -> Result<Vec<Reservation>, StoreError>;

    async fn insert_reservation(&self, reservation: Reservation)
        -> Result<Reservation, StoreError>;

    async fn get_reservation(&self, reservation_id: Uuid) -> Result<Reservation, StoreError>;

    // Bare status write; the state machine is enforced by the caller
    async fn update_status(
        &self,
        reservation_id: Uuid,
        status: ReservationStatus,
    ) -> Result<Reservation, StoreError>;

    // A guest's booking history, newest first
    async fn reservations_for_guest(&self, guest_id: Uuid) -> Result<Vec<Reservation>, StoreError>;
}

// DashMap-backed store. Serialization of same-listing writes comes from the
// engine's lock table, not from here.
pub struct InMemoryStore {
    listings: DashMap<Uuid, Listing>,
    reservations: DashMap<Uuid, Reservation>,
    fail_next_inserts: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            listings: DashMap::new(),
            reservations: DashMap::new(),
            fail_next_inserts: AtomicUsize::new(0),
        }
    }

    pub fn add_listing(&self, listing: Listing) {
        debug_assert!(
            !listing.price_per_night.is_negative(),
            "nightly price must be non-negative"
        );
        self.listings.insert(listing.id, listing);
    }

    // Make the next `count` inserts fail, for exercising StoreFailure paths
    pub fn fail_next_inserts(&self, count: usize) {
        self.fail_next_inserts.store(count, Ordering::SeqCst);
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn get_listing(&self, listing_id: Uuid) -> Result<Listing, StoreError> {
        self.listings
            .get(&listing_id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::ListingNotFound(listing_id))
    }

    async fn list_active_reservations(
        &self,
        listing_id: Uuid,
    ) -> Result<Vec<Reservation>, StoreError> {
        let mut matching: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|entry| entry.listing_id == listing_id && entry.status.is_active())
            .map(|entry| entry.clone())
            .collect();
        matching.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(matching)
    }

    async fn insert_reservation(
        &self,
        reservation: Reservation,
    ) -> Result<Reservation, StoreError> {
        let remaining = self.fail_next_inserts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_inserts.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable(
                "injected insert failure".to_string(),
            ));
        }

        self.reservations.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn get_reservation(&self, reservation_id: Uuid) -> Result<Reservation, StoreError> {
        self.reservations
            .get(&reservation_id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::ReservationNotFound(reservation_id))
    }

    async fn update_status(
        &self,
        reservation_id: Uuid,
        status: ReservationStatus,
    ) -> Result<Reservation, StoreError> {
        let mut entry = self
            .reservations
            .get_mut(&reservation_id)
            .ok_or(StoreError::ReservationNotFound(reservation_id))?;
        entry.status = status;
        Ok(entry.clone())
    }

    async fn reservations_for_guest(&self, guest_id: Uuid) -> Result<Vec<Reservation>, StoreError> {
        let mut matching: Vec<Reservation> = self
            .reservations
            .iter()
            .filter(|entry| entry.guest_id == guest_id)
            .map(|entry| entry.clone())
            .collect();
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(matching)
    }
}
