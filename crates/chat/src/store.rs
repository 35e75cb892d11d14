use snafu::OptionExt;

use crate::error::{StoreResult, UnknownConversationSnafu, UnknownPendingMessageSnafu};
use crate::events::{ConversationSelected, InboundOutcome};
use crate::ids::{ClientMessageId, ConversationId, UserId};
use crate::message::{Conversation, ConversationEntry, Delivery, Message};

pub const DEFAULT_PREVIEW_MAX_CHARS: usize = 80;

/// Conversation set plus the single active selection.
///
/// Display order is the order conversations were supplied in; nothing here
/// reorders by recency. Unread counts only fall to zero through [`select`],
/// and messages sent by the local user never raise them.
///
/// [`select`]: ConversationStore::select
#[derive(Debug, Clone)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active: Option<ConversationId>,
    preview_max_chars: usize,
    activity_clock: u64,
    local_user: Option<UserId>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::with_preview_limit(DEFAULT_PREVIEW_MAX_CHARS)
    }

    pub fn with_preview_limit(preview_max_chars: usize) -> Self {
        Self {
            conversations: Vec::new(),
            active: None,
            preview_max_chars: preview_max_chars.max(1),
            activity_clock: 0,
            local_user: None,
        }
    }

    pub fn with_local_user(mut self, user_id: UserId) -> Self {
        self.local_user = Some(user_id);
        self
    }

    pub fn local_user(&self) -> Option<&UserId> {
        self.local_user.as_ref()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn get(&self, conversation_id: &ConversationId) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| &conversation.id == conversation_id)
    }

    pub fn active_id(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active.as_ref().and_then(|id| self.get(id))
    }

    pub fn is_active(&self, conversation_id: &ConversationId) -> bool {
        self.active.as_ref() == Some(conversation_id)
    }

    pub fn total_unread(&self) -> u32 {
        self.conversations
            .iter()
            .map(|conversation| conversation.unread_count)
            .sum()
    }

    /// Replaces the whole set with a freshly fetched list.
    ///
    /// Local entries of conversations that survive the refresh are kept, and
    /// the active selection is dropped if its conversation disappeared.
    pub fn replace_all(&mut self, conversations: Vec<Conversation>) {
        let mut previous = std::mem::take(&mut self.conversations);
        for mut incoming in conversations {
            if let Some(index) = previous.iter().position(|old| old.id == incoming.id) {
                let old = previous.swap_remove(index);
                incoming.entries = old.entries;
                incoming.typing_peers = old.typing_peers;
                incoming.last_activity = old.last_activity;
            }
            if self.is_active(&incoming.id) {
                incoming.unread_count = 0;
            }
            self.conversations.push(incoming);
        }

        if let Some(active) = self.active.clone()
            && self.get(&active).is_none()
        {
            tracing::info!("active conversation {} vanished after refresh", active);
            self.active = None;
        }
    }

    /// Adds a conversation at the end, or refreshes its metadata if present.
    pub fn upsert(&mut self, conversation: Conversation) {
        if let Some(existing) = self.find_mut(&conversation.id) {
            existing.title = conversation.title;
            existing.avatar_url = conversation.avatar_url;
            return;
        }

        self.conversations.push(conversation);
    }

    pub fn select(
        &mut self,
        conversation_id: &ConversationId,
    ) -> StoreResult<ConversationSelected> {
        let conversation =
            self.find_mut(conversation_id)
                .context(UnknownConversationSnafu {
                    stage: "store-select",
                    conversation_id: conversation_id.clone(),
                })?;

        let cleared_unread = std::mem::take(&mut conversation.unread_count);
        let previous = self.active.replace(conversation_id.clone());

        tracing::debug!(
            "selected conversation {} (cleared {} unread)",
            conversation_id,
            cleared_unread
        );

        Ok(ConversationSelected {
            conversation_id: conversation_id.clone(),
            previous,
            cleared_unread,
        })
    }

    /// Appends an inbound message, or folds the echo of a local send into the
    /// entry that is still showing its provisional id.
    pub fn apply_inbound_message(
        &mut self,
        conversation_id: &ConversationId,
        message: Message,
    ) -> StoreResult<InboundOutcome> {
        message.validate()?;
        let counts_as_unread = !self.is_active(conversation_id)
            && self.local_user.as_ref() != Some(&message.sender_id);
        let tick = self.next_activity_tick();
        let preview_max_chars = self.preview_max_chars;

        let conversation =
            self.find_mut(conversation_id)
                .context(UnknownConversationSnafu {
                    stage: "store-apply-inbound",
                    conversation_id: conversation_id.clone(),
                })?;

        if conversation.contains_message(&message.id) {
            return Ok(InboundOutcome::Duplicate);
        }

        if let Some((index, client_id)) = conversation.provisional_match(&message) {
            tracing::debug!("echo {} reconciled with {}", message.id, client_id);
            if index + 1 == conversation.entries.len() {
                conversation.update_preview(&message, preview_max_chars);
            }
            let entry = &mut conversation.entries[index];
            entry.message = message;
            entry.delivery = Delivery::Delivered;
            return Ok(InboundOutcome::Reconciled { client_id });
        }

        conversation.update_preview(&message, preview_max_chars);
        conversation.last_activity = tick;
        conversation
            .typing_peers
            .retain(|name| name != &message.sender_name);
        conversation.entries.push(ConversationEntry::delivered(message));

        if counts_as_unread {
            conversation.unread_count = conversation.unread_count.saturating_add(1);
        }

        Ok(InboundOutcome::Appended {
            unread_count: conversation.unread_count,
        })
    }

    /// Appends an optimistic entry for a message that is still being sent.
    pub fn push_pending(
        &mut self,
        conversation_id: &ConversationId,
        client_id: ClientMessageId,
        message: Message,
    ) -> StoreResult<()> {
        message.validate()?;
        let tick = self.next_activity_tick();
        let preview_max_chars = self.preview_max_chars;

        let conversation =
            self.find_mut(conversation_id)
                .context(UnknownConversationSnafu {
                    stage: "store-push-pending",
                    conversation_id: conversation_id.clone(),
                })?;

        conversation.update_preview(&message, preview_max_chars);
        conversation.last_activity = tick;
        conversation
            .entries
            .push(ConversationEntry::pending(client_id, message));
        Ok(())
    }

    /// Marks a pending entry delivered, keeping its position in the sequence.
    ///
    /// When the backend returns the stored message it replaces the local copy.
    /// If that message already sits in the sequence as a separate entry, the
    /// local one is dropped instead, so it is never shown twice. A void ack
    /// leaves the provisional id in place for the echo to reconcile.
    pub fn confirm_pending(
        &mut self,
        conversation_id: &ConversationId,
        client_id: ClientMessageId,
        delivered: Option<Message>,
    ) -> StoreResult<()> {
        let preview_max_chars = self.preview_max_chars;
        let conversation = self.pending_conversation_mut(conversation_id, client_id)?;

        if let Some(delivered) = delivered.as_ref()
            && conversation.entries.iter().any(|entry| {
                entry.message.id == delivered.id && entry.client_id != Some(client_id)
            })
        {
            conversation
                .entries
                .retain(|entry| entry.client_id != Some(client_id));
            return Ok(());
        }

        let is_latest = conversation
            .latest_entry()
            .is_some_and(|entry| entry.client_id == Some(client_id));
        let Some(entry) = conversation.entry_by_client_id_mut(client_id) else {
            return UnknownPendingMessageSnafu {
                stage: "store-confirm-pending",
                conversation_id: conversation_id.clone(),
                client_id,
            }
            .fail();
        };

        if let Some(delivered) = delivered {
            entry.message = delivered;
        }
        entry.delivery = Delivery::Delivered;
        let message = entry.message.clone();

        if is_latest {
            conversation.update_preview(&message, preview_max_chars);
        }
        Ok(())
    }

    pub fn fail_pending(
        &mut self,
        conversation_id: &ConversationId,
        client_id: ClientMessageId,
        reason: impl Into<String>,
    ) -> StoreResult<()> {
        let reason = reason.into();
        let conversation = self.pending_conversation_mut(conversation_id, client_id)?;
        // An echo may already have proven delivery.
        if let Some(entry) = conversation
            .entry_by_client_id_mut(client_id)
            .filter(|entry| entry.delivery != Delivery::Delivered)
        {
            entry.delivery = Delivery::Failed(reason);
        }
        Ok(())
    }

    /// Moves a failed entry back to pending and returns its text for resending.
    pub fn retry_failed(
        &mut self,
        conversation_id: &ConversationId,
        client_id: ClientMessageId,
    ) -> StoreResult<String> {
        let conversation = self.pending_conversation_mut(conversation_id, client_id)?;
        let entry = conversation
            .entry_by_client_id_mut(client_id)
            .filter(|entry| entry.is_failed())
            .context(UnknownPendingMessageSnafu {
                stage: "store-retry-failed",
                conversation_id: conversation_id.clone(),
                client_id,
            })?;

        entry.delivery = Delivery::Pending;
        Ok(entry.message.text.clone())
    }

    /// Loads fetched history, keeping local entries that are still unconfirmed.
    pub fn replace_history(
        &mut self,
        conversation_id: &ConversationId,
        history: Vec<Message>,
    ) -> StoreResult<()> {
        let preview_max_chars = self.preview_max_chars;
        let conversation =
            self.find_mut(conversation_id)
                .context(UnknownConversationSnafu {
                    stage: "store-replace-history",
                    conversation_id: conversation_id.clone(),
                })?;

        let unconfirmed = conversation
            .entries
            .drain(..)
            .filter(|entry| entry.delivery != Delivery::Delivered)
            .collect::<Vec<_>>();

        let mut entries = Vec::with_capacity(history.len() + unconfirmed.len());
        for message in history {
            if let Err(error) = message.validate() {
                tracing::warn!("skipping history entry in {}: {}", conversation_id, error);
                continue;
            }
            entries.push(ConversationEntry::delivered(message));
        }
        entries.extend(unconfirmed);
        conversation.entries = entries;

        if let Some(latest) = conversation.latest_entry().map(|entry| entry.message.clone()) {
            conversation.update_preview(&latest, preview_max_chars);
        }
        Ok(())
    }

    pub fn set_peer_typing(
        &mut self,
        conversation_id: &ConversationId,
        sender_name: &str,
        is_typing: bool,
    ) -> StoreResult<()> {
        let conversation =
            self.find_mut(conversation_id)
                .context(UnknownConversationSnafu {
                    stage: "store-peer-typing",
                    conversation_id: conversation_id.clone(),
                })?;

        let already_listed = conversation
            .typing_peers
            .iter()
            .any(|name| name == sender_name);
        if is_typing && !already_listed {
            conversation.typing_peers.push(sender_name.to_string());
        } else if !is_typing {
            conversation.typing_peers.retain(|name| name != sender_name);
        }
        Ok(())
    }

    /// Case-insensitive substring match on titles; an empty query matches all.
    pub fn filter_by_title(&self, query: &str) -> Vec<&Conversation> {
        if query.is_empty() {
            return self.conversations.iter().collect();
        }

        let needle = query.to_lowercase();
        self.conversations
            .iter()
            .filter(|conversation| conversation.title.to_lowercase().contains(&needle))
            .collect()
    }

    /// Most recently active first. Does not change the stored order.
    pub fn sorted_by_recent_activity(&self) -> Vec<&Conversation> {
        let mut sorted = self.conversations.iter().collect::<Vec<_>>();
        sorted.sort_by(|left, right| right.last_activity.cmp(&left.last_activity));
        sorted
    }

    fn find_mut(&mut self, conversation_id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|conversation| &conversation.id == conversation_id)
    }

    fn pending_conversation_mut(
        &mut self,
        conversation_id: &ConversationId,
        client_id: ClientMessageId,
    ) -> StoreResult<&mut Conversation> {
        let conversation =
            self.find_mut(conversation_id)
                .context(UnknownConversationSnafu {
                    stage: "store-find-pending",
                    conversation_id: conversation_id.clone(),
                })?;

        if conversation.entry_by_client_id_mut(client_id).is_none() {
            return UnknownPendingMessageSnafu {
                stage: "store-find-pending",
                conversation_id: conversation_id.clone(),
                client_id,
            }
            .fail();
        }
        Ok(conversation)
    }

    fn next_activity_tick(&mut self) -> u64 {
        self.activity_clock = self.activity_clock.saturating_add(1);
        self.activity_clock
    }
}
