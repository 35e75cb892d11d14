use crate::ids::{ClientMessageId, ConversationId};
use crate::message::{Conversation, Message};

/// Emitted when the active conversation changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSelected {
    pub conversation_id: ConversationId,
    pub previous: Option<ConversationId>,
    /// Unread count the conversation had before selection cleared it.
    pub cleared_unread: u32,
}

/// Emitted by the composer when a draft is accepted for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub client_id: ClientMessageId,
    pub conversation_id: ConversationId,
    pub text: String,
}

impl OutgoingMessage {
    pub fn new(conversation_id: ConversationId, text: impl Into<String>) -> Self {
        Self {
            client_id: ClientMessageId::new_v7(),
            conversation_id,
            text: text.into(),
        }
    }
}

/// Events pushed by the messaging backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    MessageReceived {
        conversation_id: ConversationId,
        message: Message,
    },
    ConversationCreated(Conversation),
    PeerTyping {
        conversation_id: ConversationId,
        sender_name: String,
        is_typing: bool,
    },
}

/// Result of applying one inbound message to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    Appended { unread_count: u32 },
    /// Already present by message id, e.g. the echo of a confirmed send.
    Duplicate,
    /// Echo of a local send that still showed its provisional id; the local
    /// entry now carries the backend message.
    Reconciled { client_id: ClientMessageId },
}
