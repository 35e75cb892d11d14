use std::sync::Arc;

use snafu::{ResultExt, Snafu, ensure};
use souk_booking::{Booking, BookingAction, BookingError, CheckoutRequest, Role};
use souk_chat::{IdError, MessagingChannel, UserId};

use crate::session::{ChatSession, LocalUser};
use crate::settings::ClientSettings;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AuthError {
    #[snafu(display("invalid user id on `{stage}`: {source}"))]
    InvalidUserId {
        stage: &'static str,
        source: IdError,
    },
    #[snafu(display("display name must not be blank on `{stage}`"))]
    BlankDisplayName { stage: &'static str },
    #[snafu(display("booking request refused on `{stage}`: {source}"))]
    Booking {
        stage: &'static str,
        source: BookingError,
    },
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Identity returned by the authentication backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: UserId,
    pub display_name: String,
    pub role: Role,
}

impl Credentials {
    pub fn new(user_id: &str, display_name: &str, role: Role) -> AuthResult<Self> {
        let user_id = UserId::parse(user_id).context(InvalidUserIdSnafu {
            stage: "credentials-user-id",
        })?;
        let display_name = display_name.trim();
        ensure!(
            !display_name.is_empty(),
            BlankDisplayNameSnafu {
                stage: "credentials-display-name",
            }
        );

        Ok(Self {
            user_id,
            display_name: display_name.to_string(),
            role,
        })
    }
}

/// Everything that lives between sign-in and sign-out.
pub struct AuthSession {
    credentials: Credentials,
    chat: ChatSession,
}

impl AuthSession {
    /// Starts the chat session for `credentials` and loads its conversations.
    pub async fn sign_in(
        credentials: Credentials,
        channel: Arc<dyn MessagingChannel>,
        settings: Arc<ClientSettings>,
    ) -> Self {
        tracing::info!(
            "signing in {} as {}",
            credentials.user_id,
            credentials.role
        );
        let local_user = LocalUser {
            id: credentials.user_id.clone(),
            display_name: credentials.display_name.clone(),
        };
        let mut chat = ChatSession::new(channel, local_user, settings);
        chat.load().await;

        Self { credentials, chat }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn role(&self) -> Role {
        self.credentials.role
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn chat_mut(&mut self) -> &mut ChatSession {
        &mut self.chat
    }

    /// Actions the signed-in role may offer for `booking`.
    pub fn booking_actions(&self, booking: &Booking) -> Vec<BookingAction> {
        booking.allowed_actions(self.role())
    }

    pub fn authorize(&self, booking: &Booking, action: BookingAction) -> AuthResult<()> {
        booking
            .authorize(self.role(), action)
            .context(BookingSnafu {
                stage: "authorize-booking-action",
            })
    }

    /// Prepares the hosted checkout redirect for a payment action.
    pub fn checkout(&self, booking: &Booking, action: BookingAction) -> AuthResult<CheckoutRequest> {
        self.authorize(booking, action)?;
        let request = booking.checkout(action).context(BookingSnafu {
            stage: "prepare-checkout",
        })?;
        tracing::info!(
            "checkout {:?} for booking {}: {} cents",
            request.step,
            request.booking_id,
            request.amount_cents
        );
        Ok(request)
    }

    /// Tears the chat session down and hands back the identity that was active.
    pub async fn sign_out(self) -> Credentials {
        self.chat.teardown().await;
        tracing::info!("signed out {}", self.credentials.user_id);
        self.credentials
    }
}
