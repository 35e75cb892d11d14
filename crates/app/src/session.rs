use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::task::JoinHandle;
use souk_chat::{
    ChannelResult, ClientMessageId, ConversationId, ConversationSelected,
    ConversationStore, InboundEvent, InboundOutcome, InboundStream, KeyOutcome, KeyPress, Message,
    MessageComposer, MessageId, MessagingChannel, OutgoingMessage, SendRequest, StoreError,
    UserId, wall_clock_label,
};

use crate::notifications::{Notification, NotificationCenter};
use crate::settings::ClientSettings;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("conversation store rejected `{stage}`: {source}"))]
    Store {
        stage: &'static str,
        source: StoreError,
    },
    #[snafu(display("no conversation is open on `{stage}`"))]
    NoActiveConversation { stage: &'static str },
}

pub type SessionResult<T> = Result<T, SessionError>;

/// The signed-in user as seen by the chat layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub id: UserId,
    pub display_name: String,
}

/// What changed after one inbound event or send result was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    MessageAppended {
        conversation_id: ConversationId,
        unread_count: u32,
    },
    DuplicateIgnored {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    InboundRejected {
        conversation_id: ConversationId,
        reason: String,
    },
    ConversationAdded(ConversationId),
    PeerTyping {
        conversation_id: ConversationId,
        sender_name: String,
        is_typing: bool,
    },
    Delivered {
        conversation_id: ConversationId,
        client_id: ClientMessageId,
    },
    /// The backend echo of a local send took the place of its local entry.
    EchoReconciled {
        conversation_id: ConversationId,
        client_id: ClientMessageId,
    },
    SendFailed {
        conversation_id: ConversationId,
        client_id: ClientMessageId,
        draft_restored: bool,
    },
}

struct SendOutcome {
    conversation_id: ConversationId,
    client_id: ClientMessageId,
    text: String,
    result: ChannelResult<Option<Message>>,
}

/// Owns the conversation store, the composer of the open conversation, and
/// every send still waiting on the channel.
pub struct ChatSession {
    channel: Arc<dyn MessagingChannel>,
    local_user: LocalUser,
    settings: Arc<ClientSettings>,
    store: ConversationStore,
    composer: Option<MessageComposer>,
    inbound: InboundStream,
    inbound_closed: bool,
    in_flight: FuturesUnordered<JoinHandle<SendOutcome>>,
    notifications: NotificationCenter,
    loading: bool,
}

impl ChatSession {
    pub fn new(
        channel: Arc<dyn MessagingChannel>,
        local_user: LocalUser,
        settings: Arc<ClientSettings>,
    ) -> Self {
        let inbound = channel.subscribe();
        tracing::info!(
            "chat session for {} on channel {}",
            local_user.id,
            channel.id()
        );

        Self {
            store: ConversationStore::with_preview_limit(settings.preview_max_chars)
                .with_local_user(local_user.id.clone()),
            notifications: NotificationCenter::new(settings.notification_capacity),
            channel,
            local_user,
            settings,
            composer: None,
            inbound,
            inbound_closed: false,
            in_flight: FuturesUnordered::new(),
            loading: false,
        }
    }

    pub fn local_user(&self) -> &LocalUser {
        &self.local_user
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn composer(&self) -> Option<&MessageComposer> {
        self.composer.as_ref()
    }

    pub fn notifications(&mut self) -> &mut NotificationCenter {
        &mut self.notifications
    }

    /// True while a conversation list or history fetch is outstanding.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn sends_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Fetches the conversation list. A failure becomes a notification and
    /// leaves the current list untouched.
    pub async fn load(&mut self) -> bool {
        self.loading = true;
        let fetched = self.channel.fetch_conversations().await;
        self.loading = false;

        match fetched {
            Ok(conversations) => {
                tracing::info!("loaded {} conversations", conversations.len());
                self.store.replace_all(conversations);
                true
            }
            Err(error) => {
                tracing::warn!("failed to load conversations: {}", error);
                self.notifications
                    .push(Notification::error(format!("Could not load chats: {error}")));
                false
            }
        }
    }

    /// Makes `conversation_id` active, replaces the composer, and hydrates
    /// its history. Re-opening the active conversation keeps the draft.
    pub async fn open_conversation(
        &mut self,
        conversation_id: &ConversationId,
    ) -> SessionResult<ConversationSelected> {
        let selected = self.store.select(conversation_id).context(StoreSnafu {
            stage: "open-conversation",
        })?;

        let keep_composer = self
            .composer
            .as_ref()
            .is_some_and(|composer| composer.conversation_id() == conversation_id);
        if !keep_composer {
            if let Some(previous) = self.composer.take() {
                previous.close().await;
            }
            self.composer = Some(MessageComposer::new(
                conversation_id.clone(),
                self.channel.clone(),
                self.settings.typing_idle(),
            ));
        }

        self.loading = true;
        let history = self.channel.fetch_messages(conversation_id).await;
        self.loading = false;

        match history {
            Ok(messages) => self
                .store
                .replace_history(conversation_id, messages)
                .context(StoreSnafu {
                    stage: "hydrate-history",
                })?,
            Err(error) => {
                tracing::warn!("failed to load history of {}: {}", conversation_id, error);
                self.notifications.push(Notification::error(format!(
                    "Could not load messages: {error}"
                )));
            }
        }

        Ok(selected)
    }

    pub fn set_draft(&mut self, value: impl Into<String>) -> SessionResult<()> {
        self.composer_mut("set-draft")?.set_draft(value);
        Ok(())
    }

    pub fn set_disabled(&mut self, disabled: bool) -> SessionResult<()> {
        self.composer_mut("set-disabled")?.set_disabled(disabled);
        Ok(())
    }

    pub fn key_pressed(&mut self, key: KeyPress) -> SessionResult<KeyOutcome> {
        let outcome = self.composer_mut("key-pressed")?.key_pressed(key);
        if let KeyOutcome::Submitted(outgoing) = &outcome {
            self.dispatch(outgoing.clone())?;
        }
        Ok(outcome)
    }

    /// Submits the draft of the open conversation, if there is anything to send.
    pub fn submit(&mut self) -> SessionResult<Option<ClientMessageId>> {
        let Some(outgoing) = self.composer_mut("submit")?.submit() else {
            return Ok(None);
        };
        let client_id = outgoing.client_id;
        self.dispatch(outgoing)?;
        Ok(Some(client_id))
    }

    /// Resends a failed message under its original client id.
    pub fn retry(
        &mut self,
        conversation_id: &ConversationId,
        client_id: ClientMessageId,
    ) -> SessionResult<()> {
        let text = self
            .store
            .retry_failed(conversation_id, client_id)
            .context(StoreSnafu {
                stage: "retry-send",
            })?;

        tracing::info!("retrying {} in {}", client_id, conversation_id);
        self.start_send(OutgoingMessage {
            client_id,
            conversation_id: conversation_id.clone(),
            text,
        });
        Ok(())
    }

    /// Waits for the next inbound event or send result and applies it.
    ///
    /// Returns `None` once the inbound stream is closed and no sends remain.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            tokio::select! {
                biased;
                Some(joined) = self.in_flight.next(), if !self.in_flight.is_empty() => match joined {
                    Ok(outcome) => return Some(self.apply_send_outcome(outcome)),
                    Err(error) => tracing::warn!("send task ended without a result: {}", error),
                },
                event = self.inbound.recv(), if !self.inbound_closed => match event {
                    Some(event) => return Some(self.apply_inbound(event)),
                    None => {
                        tracing::info!("inbound stream of {} closed", self.channel.id());
                        self.inbound_closed = true;
                    }
                },
                else => return None,
            }
        }
    }

    /// Sends the final typing stop. Sends already handed to the channel run
    /// to completion, but their results are no longer applied.
    pub async fn teardown(mut self) {
        if let Some(composer) = self.composer.take() {
            composer.close().await;
        }
        if !self.in_flight.is_empty() {
            tracing::info!(
                "{} sends still awaiting an ack at teardown",
                self.in_flight.len()
            );
        }
        tracing::info!("chat session for {} closed", self.local_user.id);
    }

    fn composer_mut(&mut self, stage: &'static str) -> SessionResult<&mut MessageComposer> {
        self.composer
            .as_mut()
            .context(NoActiveConversationSnafu { stage })
    }

    fn dispatch(&mut self, outgoing: OutgoingMessage) -> SessionResult<()> {
        let local = Message::new(
            outgoing.client_id.provisional_message_id(),
            self.local_user.id.clone(),
            self.local_user.display_name.clone(),
            outgoing.text.clone(),
            wall_clock_label(),
        );
        self.store
            .push_pending(&outgoing.conversation_id, outgoing.client_id, local)
            .context(StoreSnafu {
                stage: "dispatch-pending",
            })?;

        tracing::debug!(
            "dispatching {} to {}",
            outgoing.client_id,
            outgoing.conversation_id
        );
        self.start_send(outgoing);
        Ok(())
    }

    /// Hands the message to the channel now and spawns the wait for its ack.
    fn start_send(&mut self, outgoing: OutgoingMessage) {
        let request = SendRequest {
            client_id: outgoing.client_id,
            conversation_id: outgoing.conversation_id.clone(),
            sender_id: self.local_user.id.clone(),
            sender_name: self.local_user.display_name.clone(),
            text: outgoing.text.clone(),
        };

        let ack = self.channel.clone().send_message(request);
        self.in_flight.push(tokio::spawn(async move {
            SendOutcome {
                conversation_id: outgoing.conversation_id,
                client_id: outgoing.client_id,
                text: outgoing.text,
                result: ack.await,
            }
        }));
    }

    fn apply_send_outcome(&mut self, outcome: SendOutcome) -> SessionEvent {
        let SendOutcome {
            conversation_id,
            client_id,
            text,
            result,
        } = outcome;

        if let Some(composer) = self.composer.as_mut() {
            composer.settle(client_id);
        }

        match result {
            Ok(delivered) => {
                if let Err(error) = self
                    .store
                    .confirm_pending(&conversation_id, client_id, delivered)
                {
                    tracing::warn!("could not confirm {}: {}", client_id, error);
                }
                tracing::debug!("delivered {} to {}", client_id, conversation_id);
                SessionEvent::Delivered {
                    conversation_id,
                    client_id,
                }
            }
            Err(error) => {
                tracing::warn!("send {} to {} failed: {}", client_id, conversation_id, error);
                if let Err(store_error) =
                    self.store
                        .fail_pending(&conversation_id, client_id, error.to_string())
                {
                    tracing::warn!("could not mark {} failed: {}", client_id, store_error);
                }
                self.notifications
                    .push(Notification::error(format!("Message not sent: {error}")));

                let draft_restored = self.store.is_active(&conversation_id)
                    && self
                        .composer
                        .as_mut()
                        .filter(|composer| composer.conversation_id() == &conversation_id)
                        .is_some_and(|composer| composer.restore_draft(&text));

                SessionEvent::SendFailed {
                    conversation_id,
                    client_id,
                    draft_restored,
                }
            }
        }
    }

    fn apply_inbound(&mut self, event: InboundEvent) -> SessionEvent {
        match event {
            InboundEvent::MessageReceived {
                conversation_id,
                message,
            } => {
                let message_id = message.id.clone();
                match self.store.apply_inbound_message(&conversation_id, message) {
                    Ok(InboundOutcome::Appended { unread_count }) => {
                        SessionEvent::MessageAppended {
                            conversation_id,
                            unread_count,
                        }
                    }
                    Ok(InboundOutcome::Duplicate) => SessionEvent::DuplicateIgnored {
                        conversation_id,
                        message_id,
                    },
                    Ok(InboundOutcome::Reconciled { client_id }) => {
                        SessionEvent::EchoReconciled {
                            conversation_id,
                            client_id,
                        }
                    }
                    Err(error) => {
                        tracing::warn!("dropping inbound {}: {}", message_id, error);
                        SessionEvent::InboundRejected {
                            conversation_id,
                            reason: error.to_string(),
                        }
                    }
                }
            }
            InboundEvent::ConversationCreated(conversation) => {
                let conversation_id = conversation.id.clone();
                self.store.upsert(conversation);
                SessionEvent::ConversationAdded(conversation_id)
            }
            InboundEvent::PeerTyping {
                conversation_id,
                sender_name,
                is_typing,
            } => {
                if let Err(error) =
                    self.store
                        .set_peer_typing(&conversation_id, &sender_name, is_typing)
                {
                    tracing::debug!("ignoring typing presence: {}", error);
                }
                SessionEvent::PeerTyping {
                    conversation_id,
                    sender_name,
                    is_typing,
                }
            }
        }
    }
}
