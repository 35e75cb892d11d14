use snafu::Snafu;

use crate::role::Role;
use crate::state::{BookingAction, BookingState, BookingStatus, PaymentStatus};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BookingError {
    #[snafu(display("unknown booking status '{raw}'"))]
    UnknownStatus { stage: &'static str, raw: String },
    #[snafu(display("unknown payment status '{raw}'"))]
    UnknownPaymentStatus { stage: &'static str, raw: String },
    #[snafu(display("unknown role '{raw}'"))]
    UnknownRole { stage: &'static str, raw: String },
    #[snafu(display(
        "booking '{booking_id}' has no valid state for status {status:?} with payment {payment:?}"
    ))]
    InvalidCombination {
        stage: &'static str,
        booking_id: String,
        status: BookingStatus,
        payment: PaymentStatus,
    },
    #[snafu(display("action {action:?} is not a payment step for booking '{booking_id}'"))]
    NotAPaymentAction {
        stage: &'static str,
        booking_id: String,
        action: BookingAction,
    },
    #[snafu(display("{role} may not {action:?} booking '{booking_id}' in state {state:?}"))]
    ActionNotAllowed {
        stage: &'static str,
        booking_id: String,
        role: Role,
        action: BookingAction,
        state: BookingState,
    },
    #[snafu(display("booking '{booking_id}' amounts are inconsistent: {details}"))]
    InconsistentAmounts {
        stage: &'static str,
        booking_id: String,
        details: String,
    },
}

pub type BookingResult<T> = Result<T, BookingError>;
