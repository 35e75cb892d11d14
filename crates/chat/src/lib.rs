#![deny(unsafe_code)]

//! Client-side messaging core: conversation store, composer, and typing
//! presence, layered on an external [`MessagingChannel`].

pub mod channel;
pub mod composer;
pub mod error;
/// Event contracts between the store, composer, and channel.
pub mod events;
pub mod ids;
pub mod message;
pub mod store;
/// Typing presence state machine and its timer task.
pub mod typing;

pub use channel::loopback::{LoopbackChannel, PresenceSignal};
pub use channel::{BoxFuture, InboundStream, MessagingChannel, SendRequest};
pub use composer::{Key, KeyOutcome, KeyPress, MessageComposer};
pub use error::{ChannelError, ChannelResult, IdError, IdResult, StoreError, StoreResult};
pub use events::{ConversationSelected, InboundEvent, InboundOutcome, OutgoingMessage};
pub use ids::{ClientMessageId, ConversationId, MessageId, UserId};
pub use message::{
    Attachment, Conversation, ConversationEntry, Delivery, Message, wall_clock_label,
};
pub use store::{ConversationStore, DEFAULT_PREVIEW_MAX_CHARS};
pub use typing::{DEFAULT_TYPING_IDLE, TypingIndicator, TypingSession, TypingSignal};
