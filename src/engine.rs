// Reservation engine: stay validation, overlap detection, pricing and the
// atomic commit of new reservations.
//
// The double-booking hazard is handled with a mutual-exclusion lock keyed on
// the listing id. Commits for the same listing serialize; commits for
// different listings run fully in parallel. The active-reservation set is
// always re-read inside the exclusive section, never reused from an earlier
// availability probe.

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{BookingRequest, Listing, Money, Reservation, ReservationStatus};
use crate::store::{ReservationStore, StoreError};

// User-correctable problems with the requested stay itself
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("check-in must be strictly before check-out")]
    InvertedRange,

    #[error("check-in date is in the past")]
    PastCheckIn,

    #[error("listing is not accepting bookings")]
    Unavailable,

    #[error("requested dates fall outside the listing's availability window")]
    OutsideAvailability,
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("invalid booking request: {0}")]
    Invalid(#[from] ValidationError),

    #[error("requested dates conflict with an existing reservation")]
    Conflict,

    #[error("listing {0} not found")]
    ListingNotFound(Uuid),

    // No partial state is written before the final insert, so the whole
    // commit call is safe to retry
    #[error("persistence failure: {0}")]
    StoreFailure(#[source] StoreError),
}

#[derive(Debug, Clone, Copy)]
pub struct EnginePolicy {
    // When false (the default), stays starting before today are rejected
    pub allow_past_check_in: bool,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            allow_past_check_in: false,
        }
    }
}

pub struct ReservationEngine<S> {
    store: Arc<S>,
    policy: EnginePolicy,
    // One lock per listing, created lazily on first booking attempt
    listing_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl<S: ReservationStore> ReservationEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_policy(store, EnginePolicy::default())
    }

    pub fn with_policy(store: Arc<S>, policy: EnginePolicy) -> Self {
        Self {
            store,
            policy,
            listing_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, listing_id: Uuid) -> Arc<Mutex<()>> {
        self.listing_locks
            .entry(listing_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // Check the requested stay against the listing snapshot.
    // Returns the stay length in nights, always >= 1 on success.
    pub fn validate(
        &self,
        listing: &Listing,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<i64, ValidationError> {
        if check_in >= check_out {
            return Err(ValidationError::InvertedRange);
        }
        if !self.policy.allow_past_check_in && check_in < Utc::now().date_naive() {
            return Err(ValidationError::PastCheckIn);
        }
        if !listing.available {
            return Err(ValidationError::Unavailable);
        }
        if !listing.window_covers(check_in, check_out) {
            return Err(ValidationError::OutsideAvailability);
        }
        Ok((check_out - check_in).num_days())
    }

    // Total stay price at the listing's current rate. Fixed-point decimal,
    // currency carried from the listing.
    pub fn price_for(listing: &Listing, nights: i64) -> Money {
        listing.price_per_night.times(nights)
    }

    // True if [check_in, check_out) intersects any active reservation on the
    // listing. Half-open intervals: a stay ending on a date never collides
    // with one starting on that date.
    pub fn check_overlap(
        listing_id: Uuid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        existing: &[Reservation],
    ) -> bool {
        existing.iter().any(|r| {
            r.listing_id == listing_id
                && r.status.is_active()
                && check_in < r.check_out
                && check_out > r.check_in
        })
    }

    // Point-in-time availability probe. The answer can go stale immediately;
    // commit re-checks under the listing lock and is the only authority.
    pub async fn is_available(
        &self,
        listing_id: Uuid,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool, BookingError> {
        let listing = self.fetch_listing(listing_id).await?;
        if self.validate(&listing, check_in, check_out).is_err() {
            return Ok(false);
        }
        let existing = self
            .store
            .list_active_reservations(listing_id)
            .await
            .map_err(BookingError::StoreFailure)?;
        Ok(!Self::check_overlap(listing_id, check_in, check_out, &existing))
    }

    // Validate, re-check overlap under the listing lock, price, persist.
    // Exactly one of n concurrent overlapping commits can win; the rest get
    // Conflict and the caller must re-query with different dates.
    pub async fn commit(&self, request: &BookingRequest) -> Result<Reservation, BookingError> {
        let listing = self.fetch_listing(request.listing_id).await?;
        let nights = self.validate(&listing, request.check_in, request.check_out)?;

        debug!(
            listing_id = %request.listing_id,
            check_in = %request.check_in,
            check_out = %request.check_out,
            nights,
            "booking request validated"
        );

        let lock = self.lock_for(request.listing_id);
        let _guard = lock.lock().await;

        // Fresh read inside the exclusive section; an earlier probe may have
        // raced with another commit
        let existing = self
            .store
            .list_active_reservations(request.listing_id)
            .await
            .map_err(BookingError::StoreFailure)?;

        if Self::check_overlap(request.listing_id, request.check_in, request.check_out, &existing) {
            warn!(
                listing_id = %request.listing_id,
                check_in = %request.check_in,
                check_out = %request.check_out,
                "booking conflict"
            );
            return Err(BookingError::Conflict);
        }

        let reservation = Reservation {
            id: Uuid::new_v4(),
            listing_id: listing.id,
            guest_id: request.guest_id,
            check_in: request.check_in,
            check_out: request.check_out,
            total_price: Self::price_for(&listing, nights),
            status: ReservationStatus::Pending,
            created_at: Utc::now(),
        };

        let persisted = self
            .store
            .insert_reservation(reservation)
            .await
            .map_err(BookingError::StoreFailure)?;

        info!(
            reservation_id = %persisted.id,
            listing_id = %persisted.listing_id,
            total_price = %persisted.total_price,
            "reservation committed"
        );
        Ok(persisted)
    }

    async fn fetch_listing(&self, listing_id: Uuid) -> Result<Listing, BookingError> {
        self.store.get_listing(listing_id).await.map_err(|e| match e {
            StoreError::ListingNotFound(id) => BookingError::ListingNotFound(id),
            other => BookingError::StoreFailure(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Currency;
    use crate::store::InMemoryStore;
    use futures::future::join_all;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn listing_with_window(
        from: Option<&str>,
        until: Option<&str>,
        nightly: rust_decimal::Decimal,
    ) -> Listing {
        Listing {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Canal House".to_string(),
            location: "Lahore".to_string(),
            price_per_night: Money::new(nightly, Currency::Usd),
            available: true,
            available_from: from.map(date),
            available_until: until.map(date),
            created_at: Utc::now(),
        }
    }

    fn setup() -> (Arc<InMemoryStore>, ReservationEngine<InMemoryStore>, Listing) {
        let store = Arc::new(InMemoryStore::new());
        let engine = ReservationEngine::new(Arc::clone(&store));
        let listing = listing_with_window(None, None, dec!(100));
        store.add_listing(listing.clone());
        (store, engine, listing)
    }

    fn request(listing: &Listing, check_in: &str, check_out: &str) -> BookingRequest {
        BookingRequest {
            listing_id: listing.id,
            guest_id: Uuid::new_v4(),
            check_in: date(check_in),
            check_out: date(check_out),
        }
    }

    #[test_case("2030-05-10", "2030-05-10", ValidationError::InvertedRange; "equal dates")]
    #[test_case("2030-05-12", "2030-05-10", ValidationError::InvertedRange; "reversed dates")]
    #[test_case("2020-05-10", "2030-05-12", ValidationError::PastCheckIn; "past check-in")]
    fn test_validate_rejections(check_in: &str, check_out: &str, expected: ValidationError) {
        let (_store, engine, listing) = setup();
        let err = engine
            .validate(&listing, date(check_in), date(check_out))
            .unwrap_err();
        assert_eq!(err, expected);
    }

    #[test_case("2030-05-31", "2030-06-05"; "starts before window")]
    #[test_case("2030-06-28", "2030-07-02"; "ends after window")]
    #[test_case("2030-05-01", "2030-08-01"; "spans whole window")]
    fn test_validate_outside_window(check_in: &str, check_out: &str) {
        let (_store, engine, _) = setup();
        let listing = listing_with_window(Some("2030-06-01"), Some("2030-06-30"), dec!(100));
        let err = engine
            .validate(&listing, date(check_in), date(check_out))
            .unwrap_err();
        assert_eq!(err, ValidationError::OutsideAvailability);
    }

    #[test]
    fn test_validate_paused_listing() {
        let (_store, engine, mut listing) = setup();
        listing.available = false;
        let err = engine
            .validate(&listing, date("2030-06-01"), date("2030-06-03"))
            .unwrap_err();
        assert_eq!(err, ValidationError::Unavailable);
    }

    #[test]
    fn test_validate_counts_nights() {
        let (_store, engine, listing) = setup();
        let nights = engine
            .validate(&listing, date("2030-06-01"), date("2030-06-04"))
            .unwrap();
        assert_eq!(nights, 3);

        // Single night is the minimum stay
        let one = engine
            .validate(&listing, date("2030-06-01"), date("2030-06-02"))
            .unwrap();
        assert_eq!(one, 1);
    }

    #[test]
    fn test_past_check_in_allowed_by_policy() {
        let store = Arc::new(InMemoryStore::new());
        let engine = ReservationEngine::with_policy(
            Arc::clone(&store),
            EnginePolicy {
                allow_past_check_in: true,
            },
        );
        let listing = listing_with_window(None, None, dec!(100));
        assert_eq!(
            engine.validate(&listing, date("2020-05-10"), date("2020-05-12")),
            Ok(2)
        );
    }

    #[test]
    fn test_price_is_deterministic() {
        let listing = listing_with_window(None, None, dec!(5000));
        let price = ReservationEngine::<InMemoryStore>::price_for(&listing, 3);
        assert_eq!(price.amount, dec!(15000));
        assert_eq!(price.currency, Currency::Usd);
    }

    fn existing(listing_id: Uuid, check_in: &str, check_out: &str) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            listing_id,
            guest_id: Uuid::new_v4(),
            check_in: date(check_in),
            check_out: date(check_out),
            total_price: Money::new(dec!(100), Currency::Usd),
            status: ReservationStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[test_case("2030-06-05", "2030-06-10", true; "identical range")]
    #[test_case("2030-06-06", "2030-06-09", true; "contained range")]
    #[test_case("2030-06-01", "2030-06-30", true; "surrounding range")]
    #[test_case("2030-06-03", "2030-06-06", true; "overlaps the start")]
    #[test_case("2030-06-09", "2030-06-12", true; "overlaps the end")]
    #[test_case("2030-06-01", "2030-06-05", false; "back to back before")]
    #[test_case("2030-06-10", "2030-06-14", false; "back to back after")]
    #[test_case("2030-06-20", "2030-06-25", false; "fully disjoint")]
    fn test_overlap_predicate(check_in: &str, check_out: &str, expected: bool) {
        let listing_id = Uuid::new_v4();
        let reservations = vec![existing(listing_id, "2030-06-05", "2030-06-10")];
        let overlaps = ReservationEngine::<InMemoryStore>::check_overlap(
            listing_id,
            date(check_in),
            date(check_out),
            &reservations,
        );
        assert_eq!(overlaps, expected);
    }

    #[test]
    fn test_overlap_ignores_cancelled_and_other_listings() {
        let listing_id = Uuid::new_v4();
        let mut cancelled = existing(listing_id, "2030-06-05", "2030-06-10");
        cancelled.status = ReservationStatus::Cancelled;
        let elsewhere = existing(Uuid::new_v4(), "2030-06-05", "2030-06-10");

        assert!(!ReservationEngine::<InMemoryStore>::check_overlap(
            listing_id,
            date("2030-06-05"),
            date("2030-06-10"),
            &[cancelled, elsewhere],
        ));
    }

    #[tokio::test]
    async fn test_commit_persists_pending_reservation() {
        let (store, engine, listing) = setup();
        let req = request(&listing, "2030-06-01", "2030-06-04");

        let reservation = engine.commit(&req).await.unwrap();
        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.total_price.amount, dec!(300));
        assert_eq!(reservation.total_price.currency, Currency::Usd);
        assert_eq!(store.reservation_count(), 1);

        let stored = store.get_reservation(reservation.id).await.unwrap();
        assert_eq!(stored.check_in, date("2030-06-01"));
        assert_eq!(stored.check_out, date("2030-06-04"));
    }

    #[tokio::test]
    async fn test_commit_rejects_overlap() {
        let (_store, engine, listing) = setup();
        engine
            .commit(&request(&listing, "2030-06-05", "2030-06-10"))
            .await
            .unwrap();

        let err = engine
            .commit(&request(&listing, "2030-06-08", "2030-06-12"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Conflict));
    }

    #[tokio::test]
    async fn test_back_to_back_stays_are_bookable() {
        let (store, engine, listing) = setup();
        let first = engine
            .commit(&request(&listing, "2030-06-05", "2030-06-10"))
            .await
            .unwrap();

        // New check-in on the previous checkout day
        let second = engine
            .commit(&request(&listing, "2030-06-10", "2030-06-14"))
            .await
            .unwrap();
        assert_eq!(second.check_in, first.check_out);
        assert_eq!(store.reservation_count(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_dates_are_rebookable() {
        let (store, engine, listing) = setup();
        let first = engine
            .commit(&request(&listing, "2030-06-05", "2030-06-10"))
            .await
            .unwrap();
        store
            .update_status(first.id, ReservationStatus::Cancelled)
            .await
            .unwrap();

        let rebooked = engine
            .commit(&request(&listing, "2030-06-05", "2030-06-10"))
            .await
            .unwrap();
        assert_eq!(rebooked.status, ReservationStatus::Pending);
    }

    #[tokio::test]
    async fn test_commit_unknown_listing() {
        let (_store, engine, _listing) = setup();
        let ghost = BookingRequest {
            listing_id: Uuid::new_v4(),
            guest_id: Uuid::new_v4(),
            check_in: date("2030-06-01"),
            check_out: date("2030-06-03"),
        };
        let err = engine.commit(&ghost).await.unwrap_err();
        assert!(matches!(err, BookingError::ListingNotFound(id) if id == ghost.listing_id));
    }

    #[tokio::test]
    async fn test_commit_invalid_request_wraps_validation_error() {
        let (_store, engine, listing) = setup();
        let err = engine
            .commit(&request(&listing, "2030-06-10", "2030-06-10"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BookingError::Invalid(ValidationError::InvertedRange)
        ));
    }

    #[tokio::test]
    async fn test_store_failure_is_retryable() {
        let (store, engine, listing) = setup();
        store.fail_next_inserts(1);

        let req = request(&listing, "2030-06-01", "2030-06-04");
        let err = engine.commit(&req).await.unwrap_err();
        assert!(matches!(err, BookingError::StoreFailure(_)));
        // Nothing was written, so the same request can be replayed wholesale
        assert_eq!(store.reservation_count(), 0);

        let reservation = engine.commit(&req).await.unwrap();
        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(store.reservation_count(), 1);
    }

    #[tokio::test]
    async fn test_is_available_tracks_commits() {
        let (_store, engine, listing) = setup();
        assert!(engine
            .is_available(listing.id, date("2030-06-05"), date("2030-06-10"))
            .await
            .unwrap());

        engine
            .commit(&request(&listing, "2030-06-05", "2030-06-10"))
            .await
            .unwrap();

        assert!(!engine
            .is_available(listing.id, date("2030-06-05"), date("2030-06-10"))
            .await
            .unwrap());
        assert!(engine
            .is_available(listing.id, date("2030-06-10"), date("2030-06-14"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_commits_single_winner() {
        let (store, engine, listing) = setup();
        let engine = Arc::new(engine);
        let attempts = 8;

        let tasks: Vec<_> = (0..attempts)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let req = request(&listing, "2030-06-05", "2030-06-10");
                tokio::spawn(async move { engine.commit(&req).await })
            })
            .collect();

        let results: Vec<_> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(BookingError::Conflict)))
            .count();

        assert_eq!(wins, 1);
        assert_eq!(conflicts, attempts - 1);
        assert_eq!(store.reservation_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_commits_on_different_listings_all_succeed() {
        let store = Arc::new(InMemoryStore::new());
        let engine = Arc::new(ReservationEngine::new(Arc::clone(&store)));

        let listings: Vec<Listing> = (0..6)
            .map(|_| {
                let l = listing_with_window(None, None, dec!(100));
                store.add_listing(l.clone());
                l
            })
            .collect();

        let tasks: Vec<_> = listings
            .iter()
            .map(|l| {
                let engine = Arc::clone(&engine);
                let req = request(l, "2030-06-05", "2030-06-10");
                tokio::spawn(async move { engine.commit(&req).await })
            })
            .collect();

        for joined in join_all(tasks).await {
            joined.unwrap().unwrap();
        }
        assert_eq!(store.reservation_count(), listings.len());
    }
}
