pub mod request;
pub mod response;

pub type ConversationId = i64;
pub type MessageId = i64;

pub use request::{DmRequest, MessageType};
pub use response::{DmEvent, Message, Reaction, TypingStatus};
