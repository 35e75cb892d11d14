use std::str::FromStr;

use crate::error::{BookingError, BookingResult, InvalidCombinationSnafu};
use crate::role::Role;

/// Backend `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    Completed,
}

impl FromStr for BookingStatus {
    type Err = BookingError;

    fn from_str(raw: &str) -> BookingResult<Self> {
        match normalize(raw).as_str() {
            "pending" | "requested" => Ok(Self::Pending),
            "accepted" | "confirmed" => Ok(Self::Accepted),
            "rejected" | "declined" => Ok(Self::Rejected),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "completed" | "done" => Ok(Self::Completed),
            _ => Err(BookingError::UnknownStatus {
                stage: "parse-booking-status",
                raw: raw.to_string(),
            }),
        }
    }
}

/// Backend `paymentStatus` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    Unpaid,
    DepositPaid,
    Paid,
    Refunded,
}

impl FromStr for PaymentStatus {
    type Err = BookingError;

    fn from_str(raw: &str) -> BookingResult<Self> {
        match normalize(raw).as_str() {
            "unpaid" | "pending" | "" => Ok(Self::Unpaid),
            "deposit_paid" | "partially_paid" | "partial" => Ok(Self::DepositPaid),
            "paid" | "fully_paid" => Ok(Self::Paid),
            "refunded" => Ok(Self::Refunded),
            _ => Err(BookingError::UnknownPaymentStatus {
                stage: "parse-payment-status",
                raw: raw.to_string(),
            }),
        }
    }
}

/// The booking lifecycle as one value instead of two loosely related strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingState {
    /// Client asked, provider has not answered.
    Requested,
    /// Provider accepted; the deposit is outstanding.
    AwaitingDeposit,
    /// Work is booked. `prepaid` when the full amount was paid upfront.
    Confirmed { prepaid: bool },
    /// Provider marked the job done; the remainder is outstanding.
    AwaitingFinalPayment,
    Settled,
    Declined { refund_due: bool },
    Cancelled { refund_due: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingAction {
    Accept,
    Decline,
    Cancel,
    PayDeposit,
    MarkDone,
    PayFinalAmount,
    LeaveReview,
    IssueRefund,
}

impl BookingAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Accept => "Accept",
            Self::Decline => "Decline",
            Self::Cancel => "Cancel Booking",
            Self::PayDeposit => "Pay Deposit",
            Self::MarkDone => "Mark as Done",
            Self::PayFinalAmount => "Pay Final Amount",
            Self::LeaveReview => "Leave a Review",
            Self::IssueRefund => "Issue Refund",
        }
    }

    /// Payment actions go through the hosted checkout redirect.
    pub fn is_payment(&self) -> bool {
        matches!(self, Self::PayDeposit | Self::PayFinalAmount)
    }
}

impl BookingState {
    pub fn from_parts(
        booking_id: &str,
        status: BookingStatus,
        payment: PaymentStatus,
    ) -> BookingResult<Self> {
        use BookingStatus as S;
        use PaymentStatus as P;

        let state = match (status, payment) {
            (S::Pending, P::Unpaid) => Self::Requested,
            (S::Accepted, P::Unpaid) => Self::AwaitingDeposit,
            (S::Accepted, P::DepositPaid) => Self::Confirmed { prepaid: false },
            (S::Accepted, P::Paid) => Self::Confirmed { prepaid: true },
            // Jobs booked without a deposit are billed in full at the end.
            (S::Completed, P::Unpaid | P::DepositPaid) => Self::AwaitingFinalPayment,
            (S::Completed, P::Paid) => Self::Settled,
            (S::Rejected, P::Unpaid | P::Refunded) => Self::Declined { refund_due: false },
            (S::Rejected, P::DepositPaid | P::Paid) => Self::Declined { refund_due: true },
            (S::Cancelled, P::Unpaid | P::Refunded) => Self::Cancelled { refund_due: false },
            (S::Cancelled, P::DepositPaid | P::Paid) => Self::Cancelled { refund_due: true },
            (S::Pending, P::DepositPaid | P::Paid | P::Refunded)
            | (S::Accepted, P::Refunded)
            | (S::Completed, P::Refunded) => {
                return InvalidCombinationSnafu {
                    stage: "booking-state-from-parts",
                    booking_id: booking_id.to_string(),
                    status,
                    payment,
                }
                .fail();
            }
        };
        Ok(state)
    }

    pub fn parse(booking_id: &str, status: &str, payment_status: &str) -> BookingResult<Self> {
        Self::from_parts(booking_id, status.parse()?, payment_status.parse()?)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Requested => "Awaiting provider",
            Self::AwaitingDeposit => "Deposit due",
            Self::Confirmed { prepaid: false } => "Confirmed",
            Self::Confirmed { prepaid: true } => "Confirmed (paid)",
            Self::AwaitingFinalPayment => "Final payment due",
            Self::Settled => "Completed",
            Self::Declined { .. } => "Declined",
            Self::Cancelled { .. } => "Cancelled",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Self::Requested | Self::AwaitingDeposit | Self::Confirmed { .. }
        )
    }

    /// Every action `role` may offer for a booking in this state.
    pub fn allowed_actions(&self, role: Role) -> Vec<BookingAction> {
        use BookingAction as A;

        match (self, role) {
            (Self::Requested, Role::Provider) => vec![A::Accept, A::Decline],
            (Self::Requested, Role::Client | Role::Admin) => vec![A::Cancel],
            (Self::AwaitingDeposit, Role::Client) => vec![A::PayDeposit, A::Cancel],
            (Self::AwaitingDeposit, Role::Provider | Role::Admin) => vec![A::Cancel],
            (Self::Confirmed { .. }, Role::Provider) => vec![A::MarkDone],
            (Self::Confirmed { .. }, Role::Client | Role::Admin) => vec![A::Cancel],
            (Self::AwaitingFinalPayment, Role::Client) => vec![A::PayFinalAmount],
            (Self::AwaitingFinalPayment, Role::Provider | Role::Admin) => Vec::new(),
            (Self::Settled, Role::Client) => vec![A::LeaveReview],
            (Self::Settled, Role::Provider | Role::Admin) => Vec::new(),
            (
                Self::Declined { refund_due: true } | Self::Cancelled { refund_due: true },
                Role::Admin,
            ) => vec![A::IssueRefund],
            (Self::Declined { .. } | Self::Cancelled { .. }, _) => Vec::new(),
        }
    }

    pub fn allows(&self, role: Role, action: BookingAction) -> bool {
        self.allowed_actions(role).contains(&action)
    }

    /// State the backend is expected to report once `action` succeeds.
    pub fn expected_after(&self, action: BookingAction) -> Option<Self> {
        use BookingAction as A;

        let next = match (self, action) {
            (Self::Requested, A::Accept) => Self::AwaitingDeposit,
            (Self::Requested, A::Decline) => Self::Declined { refund_due: false },
            (Self::Requested | Self::AwaitingDeposit, A::Cancel) => {
                Self::Cancelled { refund_due: false }
            }
            (Self::Confirmed { .. }, A::Cancel) => Self::Cancelled { refund_due: true },
            (Self::AwaitingDeposit, A::PayDeposit) => Self::Confirmed { prepaid: false },
            (Self::Confirmed { prepaid: false }, A::MarkDone) => Self::AwaitingFinalPayment,
            (Self::Confirmed { prepaid: true }, A::MarkDone) => Self::Settled,
            (Self::AwaitingFinalPayment, A::PayFinalAmount) => Self::Settled,
            (Self::Declined { refund_due: true }, A::IssueRefund) => {
                Self::Declined { refund_due: false }
            }
            (Self::Cancelled { refund_due: true }, A::IssueRefund) => {
                Self::Cancelled { refund_due: false }
            }
            (Self::Settled, A::LeaveReview) => Self::Settled,
            _ => return None,
        };
        Some(next)
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ROLES: [Role; 3] = [Role::Admin, Role::Provider, Role::Client];

    fn state(status: &str, payment: &str) -> BookingState {
        BookingState::parse("b-1", status, payment).unwrap()
    }

    #[test]
    fn provider_marks_done_and_client_pays_final_amount() {
        let confirmed = state("accepted", "deposit_paid");
        assert_eq!(
            confirmed.allowed_actions(Role::Provider),
            [BookingAction::MarkDone]
        );
        assert!(!confirmed.allows(Role::Client, BookingAction::PayFinalAmount));

        let done = state("completed", "partially_paid");
        assert_eq!(
            done.allowed_actions(Role::Client),
            [BookingAction::PayFinalAmount]
        );
        assert!(done.allowed_actions(Role::Provider).is_empty());
        assert_eq!(BookingAction::MarkDone.label(), "Mark as Done");
        assert_eq!(BookingAction::PayFinalAmount.label(), "Pay Final Amount");
    }

    #[test]
    fn status_aliases_and_casing_are_accepted() {
        assert_eq!(state("Confirmed", "Partially-Paid"), state("accepted", "deposit_paid"));
        assert_eq!(state(" canceled ", "refunded"), BookingState::Cancelled {
            refund_due: false
        });
        assert_eq!(state("done", "fully paid"), BookingState::Settled);
    }

    #[test]
    fn contradictory_combinations_are_rejected() {
        assert!(matches!(
            BookingState::parse("b-9", "pending", "paid"),
            Err(BookingError::InvalidCombination { .. })
        ));
        assert!(matches!(
            BookingState::parse("b-9", "archived", "paid"),
            Err(BookingError::UnknownStatus { .. })
        ));
        assert!(matches!(
            BookingState::parse("b-9", "pending", "in_escrow"),
            Err(BookingError::UnknownPaymentStatus { .. })
        ));
    }

    #[test]
    fn only_admins_see_refunds_and_only_when_money_is_held() {
        let cancelled_with_deposit = state("cancelled", "deposit_paid");
        for role in ALL_ROLES {
            let expected = if role == Role::Admin {
                vec![BookingAction::IssueRefund]
            } else {
                Vec::new()
            };
            assert_eq!(cancelled_with_deposit.allowed_actions(role), expected);
        }
        assert!(
            state("rejected", "unpaid")
                .allowed_actions(Role::Admin)
                .is_empty()
        );
    }

    #[test]
    fn every_allowed_action_has_an_expected_next_state() {
        let states = [
            BookingState::Requested,
            BookingState::AwaitingDeposit,
            BookingState::Confirmed { prepaid: false },
            BookingState::Confirmed { prepaid: true },
            BookingState::AwaitingFinalPayment,
            BookingState::Settled,
            BookingState::Declined { refund_due: true },
            BookingState::Cancelled { refund_due: true },
        ];

        for current in states {
            for role in ALL_ROLES {
                for action in current.allowed_actions(role) {
                    assert!(
                        current.expected_after(action).is_some(),
                        "{action:?} offered to {role} in {current:?} has no successor"
                    );
                }
            }
        }
    }

    #[test]
    fn happy_path_walks_from_request_to_settlement() {
        let mut current = BookingState::Requested;
        for action in [
            BookingAction::Accept,
            BookingAction::PayDeposit,
            BookingAction::MarkDone,
            BookingAction::PayFinalAmount,
        ] {
            current = current.expected_after(action).unwrap();
        }
        assert_eq!(current, BookingState::Settled);
        assert!(!current.is_open());
    }
}
