//! Direct-message channel.
//!
//! Requests ([`DmRequest`]) and events ([`DmEvent`]) of `/ws/dm/`, and a [`Conversation`] view
//! that follows one conversation on a connected manager.

mod conversation;
pub mod types;

pub use conversation::{Conversation, TYPING_EXPIRY};
pub use types::{ConversationId, DmEvent, DmRequest, Message, MessageId, Reaction};
