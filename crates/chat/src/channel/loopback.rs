use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use super::{BoxFuture, InboundStream, MessagingChannel, SendRequest};
use crate::error::{ChannelError, ChannelResult};
use crate::events::InboundEvent;
use crate::ids::{ConversationId, MessageId};
use crate::message::{Conversation, Message, wall_clock_label};

pub const LOOPBACK_CHANNEL_ID: &str = "loopback";

/// Presence signal as recorded by the loopback backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceSignal {
    Started(ConversationId),
    Stopped(ConversationId),
}

#[derive(Default)]
struct LoopbackState {
    conversations: Vec<Conversation>,
    history: HashMap<ConversationId, Vec<Message>>,
    presence: Vec<PresenceSignal>,
    sent: Vec<SendRequest>,
    subscribers: Vec<mpsc::UnboundedSender<InboundEvent>>,
    send_failures: VecDeque<ChannelError>,
    fetch_failures: VecDeque<ChannelError>,
    send_latency: Duration,
    echo_sends: bool,
    void_acks: bool,
    next_message_seq: u64,
}

/// In-process messaging backend.
///
/// Keeps everything in memory, records presence signals and sends, and can be
/// told to fail upcoming calls. Used by tests and the QA runner.
#[derive(Default)]
pub struct LoopbackChannel {
    state: Mutex<LoopbackState>,
}

impl LoopbackChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversation(self, conversation: Conversation) -> Self {
        self.state().conversations.push(conversation);
        self
    }

    pub fn with_history(self, conversation_id: ConversationId, messages: Vec<Message>) -> Self {
        self.state().history.insert(conversation_id, messages);
        self
    }

    pub fn with_send_latency(self, latency: Duration) -> Self {
        self.state().send_latency = latency;
        self
    }

    /// Broadcast every accepted send back as an inbound message.
    pub fn with_echo(self, echo_sends: bool) -> Self {
        self.state().echo_sends = echo_sends;
        self
    }

    /// Acknowledge accepted sends without returning the stored message.
    pub fn with_void_ack(self, void_acks: bool) -> Self {
        self.state().void_acks = void_acks;
        self
    }

    pub fn fail_next_send(&self, error: ChannelError) {
        self.state().send_failures.push_back(error);
    }

    pub fn fail_next_fetch(&self, error: ChannelError) {
        self.state().fetch_failures.push_back(error);
    }

    /// Pushes an event to every live subscriber.
    pub fn announce(&self, event: InboundEvent) {
        let mut state = self.state();
        if let InboundEvent::ConversationCreated(conversation) = &event
            && !state
                .conversations
                .iter()
                .any(|existing| existing.id == conversation.id)
        {
            state.conversations.push(conversation.clone());
        }
        if let InboundEvent::MessageReceived {
            conversation_id,
            message,
        } = &event
        {
            state
                .history
                .entry(conversation_id.clone())
                .or_default()
                .push(message.clone());
        }
        state
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn deliver(&self, conversation_id: ConversationId, message: Message) {
        self.announce(InboundEvent::MessageReceived {
            conversation_id,
            message,
        });
    }

    pub fn presence_signals(&self) -> Vec<PresenceSignal> {
        self.state().presence.clone()
    }

    /// Every send handed to the backend, including ones that later failed.
    pub fn sent_requests(&self) -> Vec<SendRequest> {
        self.state().sent.clone()
    }

    fn state(&self) -> MutexGuard<'_, LoopbackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accept_send(&self, request: SendRequest) -> ChannelResult<Option<Message>> {
        let mut state = self.state();
        if let Some(error) = state.send_failures.pop_front() {
            return Err(error);
        }

        if !state
            .conversations
            .iter()
            .any(|conversation| conversation.id == request.conversation_id)
        {
            return Err(ChannelError::ConversationMissing {
                stage: "loopback-send",
                conversation_id: request.conversation_id,
            });
        }

        state.next_message_seq += 1;
        let stored = Message::new(
            MessageId::new(format!("srv-{}", state.next_message_seq)),
            request.sender_id.clone(),
            request.sender_name.clone(),
            request.text.clone(),
            wall_clock_label(),
        );

        state
            .history
            .entry(request.conversation_id.clone())
            .or_default()
            .push(stored.clone());

        if state.echo_sends {
            let event = InboundEvent::MessageReceived {
                conversation_id: request.conversation_id.clone(),
                message: stored.clone(),
            };
            state
                .subscribers
                .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        }

        if state.void_acks {
            return Ok(None);
        }
        Ok(Some(stored))
    }
}

impl MessagingChannel for LoopbackChannel {
    fn id(&self) -> &str {
        LOOPBACK_CHANNEL_ID
    }

    fn fetch_conversations<'a>(&'a self) -> BoxFuture<'a, ChannelResult<Vec<Conversation>>> {
        Box::pin(async move {
            let mut state = self.state();
            if let Some(error) = state.fetch_failures.pop_front() {
                return Err(error);
            }
            Ok(state.conversations.clone())
        })
    }

    fn fetch_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, ChannelResult<Vec<Message>>> {
        Box::pin(async move {
            let mut state = self.state();
            if let Some(error) = state.fetch_failures.pop_front() {
                return Err(error);
            }
            Ok(state
                .history
                .get(conversation_id)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn send_message(
        self: Arc<Self>,
        request: SendRequest,
    ) -> BoxFuture<'static, ChannelResult<Option<Message>>> {
        let latency = {
            let mut state = self.state();
            state.sent.push(request.clone());
            state.send_latency
        };
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            self.accept_send(request)
        })
    }

    fn typing_started(&self, conversation_id: &ConversationId) {
        self.state()
            .presence
            .push(PresenceSignal::Started(conversation_id.clone()));
    }

    fn typing_stopped(&self, conversation_id: &ConversationId) {
        self.state()
            .presence
            .push(PresenceSignal::Stopped(conversation_id.clone()));
    }

    fn subscribe(&self) -> InboundStream {
        let (sender, stream) = InboundStream::pair();
        self.state().subscribers.push(sender);
        stream
    }
}
