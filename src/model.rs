// Core domain types shared by the reservation engine and its collaborators.
// All request/response payloads in the original system were schema-less dicts;
// here everything is validated once at the boundary into these typed values.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Supported settlement currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Pkr,
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Pkr => "PKR",
        };
        f.write_str(code)
    }
}

// Fixed-point monetary amount tagged with its currency.
// Decimal keeps nightly-rate multiplication free of float rounding drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    // Total for a whole-night stay at this rate
    pub fn times(&self, nights: i64) -> Money {
        Money {
            amount: self.amount * Decimal::from(nights),
            currency: self.currency,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

// A rentable unit owned by a host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub location: String,
    pub price_per_night: Money,
    // Hosts can pause a listing without deleting it
    pub available: bool,
    // Optional booking window; None on either side means unbounded
    pub available_from: Option<NaiveDate>,
    pub available_until: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    // True when the whole requested stay falls inside the declared window
    pub fn window_covers(&self, check_in: NaiveDate, check_out: NaiveDate) -> bool {
        if let Some(from) = self.available_from {
            if check_in < from {
                return false;
            }
        }
        if let Some(until) = self.available_until {
            if check_out > until {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    // Cancelled reservations release their dates; everything else blocks them
    pub fn is_active(&self) -> bool {
        !matches!(self, ReservationStatus::Cancelled)
    }

    // pending -> confirmed (payment success)
    // pending -> cancelled (payment failure or timeout)
    // confirmed -> cancelled (explicit cancellation)
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(
            (self, next),
            (ReservationStatus::Pending, ReservationStatus::Confirmed)
                | (ReservationStatus::Pending, ReservationStatus::Cancelled)
                | (ReservationStatus::Confirmed, ReservationStatus::Cancelled)
        )
    }
}

// A committed (or pending) stay on a listing.
// Dates form a half-open interval [check_in, check_out): the checkout day is
// free for the next guest's check-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub guest_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub total_price: Money,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

// Typed booking request built once at the system boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub listing_id: Uuid,
    pub guest_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}
