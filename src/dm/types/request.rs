use serde::Serialize;
use strum_macros::Display;

use super::{ConversationId, MessageId};

#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Media,
}

/// Request sent on the direct-message channel.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DmRequest {
    SendMessage {
        conversation_id: ConversationId,
        content: String,
        /// Reference to an uploaded attachment
        media_file: Option<String>,
        message_type: MessageType,
    },
    Typing {
        conversation_id: ConversationId,
        is_typing: bool,
    },
    MarkRead {
        conversation_id: ConversationId,
        message_ids: Vec<MessageId>,
    },
    AddReaction {
        message_id: MessageId,
        emoji: String,
    },
}

impl DmRequest {
    /// A message with optional attachment; the message type follows from the attachment.
    #[must_use]
    pub fn send_message<S: Into<String>>(
        conversation_id: ConversationId,
        content: S,
        media_file: Option<String>,
    ) -> Self {
        let message_type = if media_file.is_some() {
            MessageType::Media
        } else {
            MessageType::Text
        };
        Self::SendMessage {
            conversation_id,
            content: content.into(),
            media_file,
            message_type,
        }
    }

    #[must_use]
    pub const fn typing(conversation_id: ConversationId, is_typing: bool) -> Self {
        Self::Typing {
            conversation_id,
            is_typing,
        }
    }

    #[must_use]
    pub fn mark_read(conversation_id: ConversationId, message_ids: Vec<MessageId>) -> Self {
        Self::MarkRead {
            conversation_id,
            message_ids,
        }
    }

    #[must_use]
    pub fn add_reaction<S: Into<String>>(message_id: MessageId, emoji: S) -> Self {
        Self::AddReaction {
            message_id,
            emoji: emoji.into(),
        }
    }
}
