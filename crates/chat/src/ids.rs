use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use uuid::Uuid;

use super::error::{BlankIdSnafu, IdError, IdResult, InvalidUuidSnafu};

// Backend-issued ids are opaque strings; the wrappers only reject blanks.
macro_rules! define_opaque_id {
    ($name:ident, $id_type:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn parse(raw: &str) -> IdResult<Self> {
                let trimmed = raw.trim();
                ensure!(
                    !trimmed.is_empty(),
                    BlankIdSnafu {
                        stage: "parse-opaque-id",
                        id_type: $id_type,
                    }
                );
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(raw: &str) -> IdResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_opaque_id!(ConversationId, "conversation-id");
define_opaque_id!(MessageId, "message-id");
define_opaque_id!(UserId, "user-id");

/// Locally minted id for a message that has not been acknowledged yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientMessageId(Uuid);

impl ClientMessageId {
    pub fn new(raw: Uuid) -> Self {
        Self(raw)
    }

    /// Time-ordered, so ids minted later in one session sort later.
    pub fn new_v7() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn parse(raw: &str) -> IdResult<Self> {
        let parsed = Uuid::parse_str(raw).context(InvalidUuidSnafu {
            stage: "parse-client-message-id",
            id_type: "client-message-id",
            raw: raw.to_string(),
        })?;
        Ok(Self(parsed))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Placeholder message id shown until the backend copy replaces it.
    pub fn provisional_message_id(&self) -> MessageId {
        MessageId::new(format!("local-{}", self.0))
    }
}

impl fmt::Display for ClientMessageId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for ClientMessageId {
    type Err = IdError;

    fn from_str(raw: &str) -> IdResult<Self> {
        Self::parse(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_ids_trim_and_reject_blank_input() {
        let id = ConversationId::parse("  conv-42 ").unwrap();
        assert_eq!(id.as_str(), "conv-42");
        assert!(matches!(
            MessageId::parse("   "),
            Err(IdError::BlankId {
                id_type: "message-id",
                ..
            })
        ));
    }

    #[test]
    fn client_ids_parse_their_display_form() {
        let id = ClientMessageId::new_v7();
        let parsed: ClientMessageId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!(ClientMessageId::parse("not-a-uuid").is_err());
        assert!(id.provisional_message_id().as_str().starts_with("local-"));
    }
}
