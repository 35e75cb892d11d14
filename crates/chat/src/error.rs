use snafu::Snafu;

use crate::ids::{ClientMessageId, ConversationId};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IdError {
    #[snafu(display("id '{raw}' is invalid for {id_type}"))]
    InvalidUuid {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
        source: uuid::Error,
    },
    #[snafu(display("{id_type} must not be blank"))]
    BlankId {
        stage: &'static str,
        id_type: &'static str,
    },
}

pub type IdResult<T> = Result<T, IdError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("conversation '{conversation_id}' is not known on `{stage}`"))]
    UnknownConversation {
        stage: &'static str,
        conversation_id: ConversationId,
    },
    #[snafu(display(
        "no pending message '{client_id}' in conversation '{conversation_id}' on `{stage}`"
    ))]
    UnknownPendingMessage {
        stage: &'static str,
        conversation_id: ConversationId,
        client_id: ClientMessageId,
    },
    #[snafu(display("message '{message_id}' has neither text nor attachments"))]
    EmptyMessage {
        stage: &'static str,
        message_id: String,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum ChannelError {
    #[snafu(display("messaging transport failed on `{stage}`: {details}"))]
    Transport {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("messaging backend rejected `{stage}` with status {status}: {details}"))]
    Rejected {
        stage: &'static str,
        status: u16,
        details: String,
    },
    #[snafu(display("conversation '{conversation_id}' does not exist on the backend"))]
    ConversationMissing {
        stage: &'static str,
        conversation_id: ConversationId,
    },
    #[snafu(display("inbound message stream closed"))]
    Closed { stage: &'static str },
}

pub type ChannelResult<T> = Result<T, ChannelError>;
