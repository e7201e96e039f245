use serde::{Deserialize, Serialize};

use super::{ConversationId, MessageId};
use crate::Result;
use crate::types::{DateTime, UserId, UserSummary, Utc};
use crate::ws::Event;

pub const NEW_MESSAGE_EVENT: &str = "new_message";
pub const TYPING_STATUS_EVENT: &str = "typing_status";
pub const REACTION_ADDED_EVENT: &str = "reaction_added";

/// Inbound event on the direct-message channel.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DmEvent {
    /// A message was posted in a conversation the user takes part in
    NewMessage { message: Message },
    /// A participant started or stopped typing
    TypingStatus(TypingStatus),
    ReactionAdded { reaction: Reaction },
    /// A message arrived in a conversation that is not open
    DmNotification { message: Message },
}

impl DmEvent {
    /// Deserialize a raw event. Fails for other event types and malformed payloads.
    pub fn from_event(event: &Event) -> Result<Self> {
        event.parse()
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Conversation the message belongs to
    pub conversation: ConversationId,
    pub sender: UserSummary,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub media_file: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    #[serde(default)]
    pub id: Option<i64>,
    /// Absent when the reaction is embedded in its message
    #[serde(default)]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub user: Option<UserSummary>,
    pub emoji: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypingStatus {
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub is_typing: bool,
}
