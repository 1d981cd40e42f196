// Reservation core for the Homlo short-term rental marketplace

pub mod booking;
pub mod engine;
pub mod model;
pub mod notify;
pub mod payment;
pub mod store;

// Re-export key types for convenience
pub use booking::{BookingOutcome, BookingService, ServiceError};
pub use engine::{BookingError, EnginePolicy, ReservationEngine, ValidationError};
pub use model::{BookingRequest, Currency, Listing, Money, Reservation, ReservationStatus};
pub use notify::{Notification, Notifier, NotifyError, TracingNotifier};
pub use payment::{Payment, PaymentError, PaymentGateway, PaymentStatus};
pub use store::{InMemoryStore, ReservationStore, StoreError};
