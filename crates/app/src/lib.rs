#![deny(unsafe_code)]

//! Client shell around the messaging core: settings, notifications, and the
//! signed-in session that owns the chat state.

pub mod auth;
pub mod notifications;
pub mod session;
pub mod settings;

pub use auth::{AuthError, AuthResult, AuthSession, Credentials};
pub use notifications::{Notification, NotificationCenter, NotificationLevel};
pub use session::{ChatSession, LocalUser, SessionError, SessionEvent, SessionResult};
pub use settings::{ClientSettings, SettingsError, SettingsStore};
