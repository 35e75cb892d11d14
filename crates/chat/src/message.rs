use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::error::{EmptyMessageSnafu, StoreResult};
use crate::ids::{ClientMessageId, ConversationId, MessageId, UserId};

/// Display timestamp for a message sent now: `HH:MM` in UTC.
pub fn wall_clock_label() -> String {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    let of_day = seconds % 86_400;
    format!("{:02}:{:02}", of_day / 3_600, (of_day / 60) % 60)
}

/// File or image reference attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
}

impl Attachment {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: None,
            url: url.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name when present, otherwise the url.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.url)
    }
}

/// One chat message as the messaging backend reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub sender_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Display string derived from the send time.
    #[serde(default)]
    pub timestamp: String,
}

impl Message {
    pub fn new(
        id: MessageId,
        sender_id: UserId,
        sender_name: impl Into<String>,
        text: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id,
            sender_id,
            sender_name: sender_name.into(),
            avatar_url: None,
            text: text.into(),
            attachments: Vec::new(),
            timestamp: timestamp.into(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        ensure!(
            !self.text.trim().is_empty() || !self.attachments.is_empty(),
            EmptyMessageSnafu {
                stage: "validate-message",
                message_id: self.id.to_string(),
            }
        );
        Ok(())
    }

    /// Single-line preview, truncated on a char boundary.
    pub fn preview(&self, max_chars: usize) -> String {
        let source = if self.text.trim().is_empty() {
            let labels = self
                .attachments
                .iter()
                .map(Attachment::label)
                .collect::<Vec<_>>()
                .join(", ");
            format!("Attachment: {labels}")
        } else {
            self.text.split_whitespace().collect::<Vec<_>>().join(" ")
        };

        if source.chars().count() <= max_chars {
            return source;
        }

        let mut truncated = source.chars().take(max_chars).collect::<String>();
        truncated.push('…');
        truncated
    }
}

/// Local delivery state of one conversation entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Delivery {
    Pending,
    #[default]
    Delivered,
    Failed(String),
}

/// A message placed in a conversation's sequence.
///
/// Entries created by local submission keep their client id for their whole
/// life; inbound messages never have one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub message: Message,
    pub client_id: Option<ClientMessageId>,
    pub delivery: Delivery,
}

impl ConversationEntry {
    pub fn delivered(message: Message) -> Self {
        Self {
            message,
            client_id: None,
            delivery: Delivery::Delivered,
        }
    }

    pub fn pending(client_id: ClientMessageId, message: Message) -> Self {
        Self {
            message,
            client_id: Some(client_id),
            delivery: Delivery::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.delivery, Delivery::Pending)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.delivery, Delivery::Failed(_))
    }}

/// Conversation aggregate held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(skip)]
    pub entries: Vec<ConversationEntry>,
    /// Display names of peers currently typing.
    #[serde(skip)]
    pub typing_peers: Vec<String>,
    // Store-assigned activity counter; only used for the recency view.
    #[serde(skip)]
    pub(crate) last_activity: u64,
}

impl Conversation {
    pub fn new(id: ConversationId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            avatar_url: None,
            last_message: None,
            last_message_at: None,
            unread_count: 0,
            entries: Vec::new(),
            typing_peers: Vec::new(),
            last_activity: 0,
        }
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    /// Entry the view keeps scrolled into view.
    pub fn latest_entry(&self) -> Option<&ConversationEntry> {
        self.entries.last()
    }

    pub fn contains_message(&self, message_id: &MessageId) -> bool {
        self.entries
            .iter()
            .any(|entry| &entry.message.id == message_id)
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_pending()).count()
    }

    pub(crate) fn entry_by_client_id_mut(
        &mut self,
        client_id: ClientMessageId,
    ) -> Option<&mut ConversationEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.client_id == Some(client_id))
    }

    /// First local entry, still under its `local-` id, that the backend copy
    /// `message` stands in for.
    pub(crate) fn provisional_match(
        &self,
        message: &Message,
    ) -> Option<(usize, ClientMessageId)> {
        self.entries.iter().enumerate().find_map(|(index, entry)| {
            let client_id = entry.client_id?;
            (entry.message.id == client_id.provisional_message_id()
                && entry.message.sender_id == message.sender_id
                && entry.message.text == message.text)
                .then_some((index, client_id))
        })
    }

    pub(crate) fn update_preview(&mut self, message: &Message, max_chars: usize) {
        self.last_message = Some(message.preview(max_chars));
        self.last_message_at = Some(message.timestamp.clone());
    }
}
