use std::sync::Arc;
use std::time::Duration;

use crate::channel::MessagingChannel;
use crate::events::OutgoingMessage;
use crate::ids::{ClientMessageId, ConversationId};
use crate::typing::TypingIndicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Other,
}

/// A key press delivered to the composer's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    /// Newline modifier (shift) held.
    pub modifier: bool,
}

impl KeyPress {
    pub const fn enter() -> Self {
        Self {
            key: Key::Enter,
            modifier: false,
        }
    }

    pub const fn modified_enter() -> Self {
        Self {
            key: Key::Enter,
            modifier: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    Submitted(OutgoingMessage),
    NewlineInserted,
    /// Enter was consumed without submitting (empty, disabled, or busy).
    Suppressed,
    /// Not handled here; the input applies its default behavior.
    PassThrough,
}

/// Draft buffer and submission for the active conversation.
///
/// One composer exists per active conversation. Switching conversations tears
/// it down, which discards the draft and stops the typing indicator.
pub struct MessageComposer {
    conversation_id: ConversationId,
    draft: String,
    disabled: bool,
    in_flight: Option<ClientMessageId>,
    typing: TypingIndicator,
}

impl MessageComposer {
    pub fn new(
        conversation_id: ConversationId,
        channel: Arc<dyn MessagingChannel>,
        typing_idle: Duration,
    ) -> Self {
        let typing = TypingIndicator::spawn(conversation_id.clone(), channel, typing_idle);
        Self {
            conversation_id,
            draft: String::new(),
            disabled: false,
            in_flight: None,
            typing,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// True while a submitted message awaits its delivery result.
    pub fn is_sending(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn can_submit(&self) -> bool {
        !self.disabled && self.in_flight.is_none() && !self.draft.trim().is_empty()
    }

    pub fn set_draft(&mut self, value: impl Into<String>) {
        self.draft = value.into();
        self.typing.input_changed(&self.draft, self.disabled);
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        if self.disabled == disabled {
            return;
        }
        self.disabled = disabled;
        self.typing.input_changed(&self.draft, self.disabled);
    }

    pub fn key_pressed(&mut self, key: KeyPress) -> KeyOutcome {
        match key {
            KeyPress {
                key: Key::Enter,
                modifier: true,
            } => {
                if self.disabled {
                    return KeyOutcome::Suppressed;
                }
                let mut draft = std::mem::take(&mut self.draft);
                draft.push('\n');
                self.set_draft(draft);
                KeyOutcome::NewlineInserted
            }
            KeyPress {
                key: Key::Enter,
                modifier: false,
            } => match self.submit() {
                Some(outgoing) => KeyOutcome::Submitted(outgoing),
                None => KeyOutcome::Suppressed,
            },
            KeyPress {
                key: Key::Other, ..
            } => KeyOutcome::PassThrough,
        }
    }

    /// Accepts the trimmed draft for sending and clears the buffer.
    ///
    /// Returns `None` without side effects when the draft is blank, the
    /// composer is disabled, or an earlier submission is still in flight.
    pub fn submit(&mut self) -> Option<OutgoingMessage> {
        if self.disabled || self.in_flight.is_some() {
            return None;
        }

        let text = self.draft.trim();
        if text.is_empty() {
            return None;
        }

        let outgoing = OutgoingMessage::new(self.conversation_id.clone(), text);
        self.typing.message_sent();
        self.draft.clear();
        self.in_flight = Some(outgoing.client_id);
        Some(outgoing)
    }

    /// Releases the in-flight lock once the send for `client_id` resolved.
    pub fn settle(&mut self, client_id: ClientMessageId) -> bool {
        if self.in_flight == Some(client_id) {
            self.in_flight = None;
            return true;
        }
        false
    }

    /// Puts failed text back into an untouched draft. Does not signal typing.
    pub fn restore_draft(&mut self, text: &str) -> bool {
        if !self.draft.is_empty() {
            return false;
        }
        self.draft = text.to_string();
        true
    }

    /// Teardown: waits for the typing indicator to emit its final signal.
    pub async fn close(self) {
        self.typing.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::loopback::{LoopbackChannel, PresenceSignal};
    use crate::typing::DEFAULT_TYPING_IDLE;

    fn composer(channel: &Arc<LoopbackChannel>) -> MessageComposer {
        MessageComposer::new(
            ConversationId::new("c-1"),
            channel.clone(),
            DEFAULT_TYPING_IDLE,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn submit_trims_and_clears_the_draft_immediately() {
        let channel = Arc::new(LoopbackChannel::new());
        let mut composer = composer(&channel);

        composer.set_draft("  hello  ");
        let outgoing = composer.submit().unwrap();

        assert_eq!(outgoing.text, "hello");
        assert_eq!(outgoing.conversation_id.as_str(), "c-1");
        assert_eq!(composer.draft(), "");
        assert!(composer.is_sending());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_or_disabled_submissions_are_silent_noops() {
        let channel = Arc::new(LoopbackChannel::new());
        let mut composer = composer(&channel);

        composer.set_draft(" \n\t ");
        assert_eq!(composer.submit(), None);
        assert_eq!(composer.draft(), " \n\t ");

        composer.set_draft("hi");
        composer.set_disabled(true);
        assert_eq!(composer.submit(), None);
        assert_eq!(composer.draft(), "hi");
        assert!(!composer.is_sending());
    }

    #[tokio::test(start_paused = true)]
    async fn second_submit_waits_for_the_first_to_settle() {
        let channel = Arc::new(LoopbackChannel::new());
        let mut composer = composer(&channel);

        composer.set_draft("first");
        let first = composer.submit().unwrap();
        composer.set_draft("second");
        assert_eq!(composer.submit(), None);
        assert_eq!(composer.draft(), "second");

        assert!(!composer.settle(ClientMessageId::new_v7()));
        assert!(composer.settle(first.client_id));
        assert_eq!(composer.submit().unwrap().text, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn enter_submits_once_and_modified_enter_inserts_newline() {
        let channel = Arc::new(LoopbackChannel::new());
        let mut composer = composer(&channel);

        composer.set_draft("line one");
        assert_eq!(
            composer.key_pressed(KeyPress::modified_enter()),
            KeyOutcome::NewlineInserted
        );
        assert_eq!(composer.draft(), "line one\n");
        assert!(!composer.is_sending());

        match composer.key_pressed(KeyPress::enter()) {
            KeyOutcome::Submitted(outgoing) => assert_eq!(outgoing.text, "line one"),
            other => panic!("expected submission, got {other:?}"),
        }
        assert_eq!(composer.key_pressed(KeyPress::enter()), KeyOutcome::Suppressed);
        assert_eq!(
            composer.key_pressed(KeyPress {
                key: Key::Other,
                modifier: false
            }),
            KeyOutcome::PassThrough
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sending_while_typing_stops_the_indicator_once() {
        let channel = Arc::new(LoopbackChannel::new());
        let mut composer = composer(&channel);
        let conversation_id = ConversationId::new("c-1");

        composer.set_draft("h");
        composer.set_draft("hey");
        composer.submit().unwrap();
        tokio::time::sleep(Duration::from_millis(5_000)).await;

        assert_eq!(
            channel.presence_signals(),
            [
                PresenceSignal::Started(conversation_id.clone()),
                PresenceSignal::Stopped(conversation_id),
            ]
        );
        composer.close().await;
        assert_eq!(channel.presence_signals().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_mid_typing_stops_and_suppresses_further_signals() {
        let channel = Arc::new(LoopbackChannel::new());
        let mut composer = composer(&channel);
        let conversation_id = ConversationId::new("c-1");

        composer.set_draft("draft");
        composer.set_disabled(true);
        composer.set_draft("draft more");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(
            channel.presence_signals(),
            [
                PresenceSignal::Started(conversation_id.clone()),
                PresenceSignal::Stopped(conversation_id),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restore_only_fills_an_empty_draft() {
        let channel = Arc::new(LoopbackChannel::new());
        let mut composer = composer(&channel);

        assert!(composer.restore_draft("lost text"));
        assert_eq!(composer.draft(), "lost text");
        assert!(!composer.restore_draft("other"));
        assert_eq!(composer.draft(), "lost text");
    }
}
