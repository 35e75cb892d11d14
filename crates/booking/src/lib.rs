#![deny(unsafe_code)]

//! Booking lifecycle and the role-scoped actions each state offers.

pub mod error;
pub mod record;
pub mod role;
pub mod state;

pub use error::{BookingError, BookingResult};
pub use record::{Booking, BookingRecord, CheckoutRequest, PaymentStep};
pub use role::Role;
pub use state::{BookingAction, BookingState, BookingStatus, PaymentStatus};
