use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::error::{
    ActionNotAllowedSnafu, BookingError, BookingResult, InconsistentAmountsSnafu,
    NotAPaymentActionSnafu,
};
use crate::role::Role;
use crate::state::{BookingAction, BookingState, BookingStatus, PaymentStatus};

/// Booking as the backend serializes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    #[serde(alias = "_id")]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub payment_status: String,
    #[serde(default)]
    pub service_title: String,
    #[serde(default)]
    pub total_amount_cents: u64,
    #[serde(default)]
    pub deposit_amount_cents: u64,
}

/// A validated booking with its lifecycle collapsed into a [`BookingState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: String,
    pub service_title: String,
    pub state: BookingState,
    pub payment: PaymentStatus,
    pub total_amount_cents: u64,
    pub deposit_amount_cents: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStep {
    Deposit,
    FinalAmount,
}

/// What the hosted checkout needs to start a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub booking_id: String,
    pub step: PaymentStep,
    pub amount_cents: u64,
}

impl TryFrom<BookingRecord> for Booking {
    type Error = BookingError;

    fn try_from(record: BookingRecord) -> BookingResult<Self> {
        let status: BookingStatus = record.status.parse()?;
        let payment: PaymentStatus = record.payment_status.parse()?;
        let state = BookingState::from_parts(&record.id, status, payment)?;
        ensure!(
            record.deposit_amount_cents <= record.total_amount_cents,
            InconsistentAmountsSnafu {
                stage: "booking-from-record",
                booking_id: record.id.clone(),
                details: format!(
                    "deposit {} exceeds total {}",
                    record.deposit_amount_cents, record.total_amount_cents
                ),
            }
        );

        Ok(Self {
            id: record.id,
            service_title: record.service_title,
            state,
            payment,
            total_amount_cents: record.total_amount_cents,
            deposit_amount_cents: record.deposit_amount_cents,
        })
    }
}

impl Booking {
    pub fn allowed_actions(&self, role: Role) -> Vec<BookingAction> {
        self.state.allowed_actions(role)
    }

    /// Fails unless `role` is offered `action` in the current state.
    pub fn authorize(&self, role: Role, action: BookingAction) -> BookingResult<()> {
        ensure!(
            self.state.allows(role, action),
            ActionNotAllowedSnafu {
                stage: "authorize-booking-action",
                booking_id: self.id.clone(),
                role,
                action,
                state: self.state,
            }
        );
        Ok(())
    }

    /// Amount still owed once any collected deposit is accounted for.
    pub fn remaining_cents(&self) -> u64 {
        match self.payment {
            PaymentStatus::Unpaid => self.total_amount_cents,
            PaymentStatus::DepositPaid => self
                .total_amount_cents
                .saturating_sub(self.deposit_amount_cents),
            PaymentStatus::Paid | PaymentStatus::Refunded => 0,
        }
    }

    /// Builds the checkout request for a client payment action.
    pub fn checkout(&self, action: BookingAction) -> BookingResult<CheckoutRequest> {
        ensure!(
            action.is_payment(),
            NotAPaymentActionSnafu {
                stage: "booking-checkout",
                booking_id: self.id.clone(),
                action,
            }
        );
        self.authorize(Role::Client, action)?;

        let (step, amount_cents) = match action {
            BookingAction::PayDeposit => (PaymentStep::Deposit, self.deposit_amount_cents),
            _ => (PaymentStep::FinalAmount, self.remaining_cents()),
        };
        ensure!(
            amount_cents > 0,
            InconsistentAmountsSnafu {
                stage: "booking-checkout",
                booking_id: self.id.clone(),
                details: format!("{} has nothing to charge", action.label()),
            }
        );

        Ok(CheckoutRequest {
            booking_id: self.id.clone(),
            step,
            amount_cents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: &str, payment: &str) -> BookingRecord {
        BookingRecord {
            id: "b-42".to_string(),
            status: status.to_string(),
            payment_status: payment.to_string(),
            service_title: "Deep clean".to_string(),
            total_amount_cents: 20_000,
            deposit_amount_cents: 5_000,
        }
    }

    #[test]
    fn backend_json_with_mongo_style_id_parses() {
        let json = r#"{
            "_id": "b-1",
            "status": "accepted",
            "paymentStatus": "unpaid",
            "serviceTitle": "Boiler service",
            "totalAmountCents": 12000,
            "depositAmountCents": 3000
        }"#;
        let record: BookingRecord = serde_json::from_str(json).unwrap();
        let booking = Booking::try_from(record).unwrap();

        assert_eq!(booking.id, "b-1");
        assert_eq!(booking.state, BookingState::AwaitingDeposit);
        assert_eq!(
            booking.allowed_actions(Role::Client),
            [BookingAction::PayDeposit, BookingAction::Cancel]
        );
    }

    #[test]
    fn deposit_then_final_amount_checkout() {
        let booking = Booking::try_from(record("accepted", "unpaid")).unwrap();
        let deposit = booking.checkout(BookingAction::PayDeposit).unwrap();
        assert_eq!(deposit.step, PaymentStep::Deposit);
        assert_eq!(deposit.amount_cents, 5_000);

        let finished = Booking::try_from(record("completed", "deposit_paid")).unwrap();
        let remainder = finished.checkout(BookingAction::PayFinalAmount).unwrap();
        assert_eq!(remainder.step, PaymentStep::FinalAmount);
        assert_eq!(remainder.amount_cents, 15_000);

        let unpaid = Booking::try_from(record("completed", "unpaid")).unwrap();
        assert_eq!(
            unpaid
                .checkout(BookingAction::PayFinalAmount)
                .unwrap()
                .amount_cents,
            20_000
        );
    }

    #[test]
    fn checkout_rejects_wrong_state_and_non_payment_actions() {
        let requested = Booking::try_from(record("pending", "unpaid")).unwrap();
        assert!(matches!(
            requested.checkout(BookingAction::PayDeposit),
            Err(BookingError::ActionNotAllowed { .. })
        ));
        assert!(matches!(
            requested.checkout(BookingAction::Cancel),
            Err(BookingError::NotAPaymentAction { .. })
        ));
    }

    #[test]
    fn deposit_larger_than_total_is_rejected() {
        let mut broken = record("accepted", "unpaid");
        broken.deposit_amount_cents = 30_000;
        assert!(matches!(
            Booking::try_from(broken),
            Err(BookingError::InconsistentAmounts { .. })
        ));
    }

    #[test]
    fn deposit_edited_past_total_owes_nothing_and_cannot_be_charged() {
        let mut booking = Booking::try_from(record("completed", "deposit_paid")).unwrap();
        booking.deposit_amount_cents = booking.total_amount_cents + 1;

        assert_eq!(booking.remaining_cents(), 0);
        assert!(matches!(
            booking.checkout(BookingAction::PayFinalAmount),
            Err(BookingError::InconsistentAmounts { .. })
        ));
    }
}
