use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::ChannelResult;
use crate::events::InboundEvent;
use crate::ids::{ClientMessageId, ConversationId, UserId};
use crate::message::{Conversation, Message};

pub mod loopback;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outgoing message as handed to the messaging backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub client_id: ClientMessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub sender_name: String,
    pub text: String,
}

/// Receiving half of a channel subscription.
pub struct InboundStream {
    events: mpsc::UnboundedReceiver<InboundEvent>,
}

impl InboundStream {
    pub fn new(events: mpsc::UnboundedReceiver<InboundEvent>) -> Self {
        Self { events }
    }

    /// Creates a linked sender/stream pair for channel implementations.
    pub fn pair() -> (mpsc::UnboundedSender<InboundEvent>, Self) {
        let (sender, events) = mpsc::unbounded_channel();
        (sender, Self::new(events))
    }

    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<InboundEvent> {
        self.events.try_recv().ok()
    }
}

/// Real-time/REST messaging backend as seen from the client.
///
/// Presence signals are fire-and-forget: implementations swallow and log their
/// own delivery failures.
pub trait MessagingChannel: Send + Sync {
    fn id(&self) -> &str;
    fn fetch_conversations<'a>(&'a self) -> BoxFuture<'a, ChannelResult<Vec<Conversation>>>;
    fn fetch_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ChannelResult<Vec<Message>>>;
    /// Hands `request` to the backend as soon as it is called; the returned
    /// future only waits for the acknowledgement and owns everything it needs,
    /// so callers can spawn it. Resolves with the stored message when the
    /// backend returns one.
    fn send_message(
        self: Arc<Self>,
        request: SendRequest,
    ) -> BoxFuture<'static, ChannelResult<Option<Message>>>;
    fn typing_started(&self, conversation_id: &ConversationId);
    fn typing_stopped(&self, conversation_id: &ConversationId);
    fn subscribe(&self) -> InboundStream;
}
