use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::types::response::{NEW_MESSAGE_EVENT, REACTION_ADDED_EVENT, TYPING_STATUS_EVENT};
use super::types::{ConversationId, DmEvent, DmRequest, Message, MessageId, TypingStatus};
use crate::Result;
use crate::types::UserId;
use crate::ws::{ConnectionManager, Connector, Event, HandlerId, TungsteniteConnector};

/// A participant counts as typing for this long after their last `is_typing: true`.
pub const TYPING_EXPIRY: Duration = Duration::from_secs(3);

/// One open conversation on the direct-message channel.
///
/// While attached it collects the conversation's messages in arrival order, marks messages
/// from other participants as read, tracks who is typing and attaches reactions to their
/// message. Dropping the conversation (or calling [`detach`](Self::detach)) removes its
/// handlers from the manager.
///
/// # Example
///
/// ```rust, no_run
/// use realtime_client::dm::Conversation;
/// use realtime_client::registry::ConnectionRegistry;
/// use realtime_client::settings::Settings;
///
/// # async fn example() -> realtime_client::Result<()> {
/// let registry = ConnectionRegistry::new(Settings::from_env()?);
/// let connection = registry.direct_messages()?;
/// connection.connect().await?;
///
/// let conversation = Conversation::attach(&connection, 42, 7);
/// conversation.send_typing(true)?;
/// conversation.send_message("On my way", None)?;
/// # Ok(())
/// # }
/// ```
pub struct Conversation<C: Connector = TungsteniteConnector> {
    id: ConversationId,
    manager: ConnectionManager<C>,
    state: Arc<Mutex<State>>,
    handlers: Mutex<Vec<(&'static str, HandlerId)>>,
}

#[derive(Debug, Default)]
struct State {
    messages: Vec<Message>,
    /// Participant → when they last reported typing
    typing: HashMap<UserId, Instant>,
}

impl<C: Connector> fmt::Debug for Conversation<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("id", &self.id)
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Conversation<C> {
    /// Start following conversation `id` on `manager`. `me` is the current user, whose own
    /// messages are never marked read automatically.
    pub fn attach(manager: &ConnectionManager<C>, id: ConversationId, me: UserId) -> Self {
        let state = Arc::new(Mutex::new(State::default()));
        let mut handlers = Vec::with_capacity(3);

        for event_type in [NEW_MESSAGE_EVENT, TYPING_STATUS_EVENT, REACTION_ADDED_EVENT] {
            let state = Arc::clone(&state);
            let sender = manager.clone();
            let handler_id = manager.on(event_type, move |event| {
                handle(&sender, &state, id, me, event);
            });
            handlers.push((event_type, handler_id));
        }

        Self {
            id,
            manager: manager.clone(),
            state,
            handlers: Mutex::new(handlers),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Send a text message, or a media message when `media_file` is set.
    ///
    /// Returns whether the request was handed to an open connection.
    pub fn send_message<S: Into<String>>(
        &self,
        content: S,
        media_file: Option<String>,
    ) -> Result<bool> {
        request(
            &self.manager,
            &DmRequest::send_message(self.id, content, media_file),
        )
    }

    pub fn send_typing(&self, is_typing: bool) -> Result<bool> {
        request(&self.manager, &DmRequest::typing(self.id, is_typing))
    }

    /// Mark messages as read. Nothing is sent for an empty list.
    pub fn mark_read(&self, message_ids: Vec<MessageId>) -> Result<bool> {
        mark_read(&self.manager, self.id, message_ids)
    }

    pub fn add_reaction<S: Into<String>>(&self, message_id: MessageId, emoji: S) -> Result<bool> {
        request(&self.manager, &DmRequest::add_reaction(message_id, emoji))
    }

    /// Messages received since attaching, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        lock(&self.state).messages.clone()
    }

    /// Participants currently typing, in ascending id order.
    #[must_use]
    pub fn typing_users(&self) -> Vec<UserId> {
        let now = Instant::now();
        let mut state = lock(&self.state);
        state
            .typing
            .retain(|_, since| now.saturating_duration_since(*since) < TYPING_EXPIRY);

        let mut users: Vec<_> = state.typing.keys().copied().collect();
        users.sort_unstable();
        users
    }

    /// Remove this conversation's handlers and forget who was typing. Idempotent.
    pub fn detach(&self) {
        let handlers = mem::take(
            &mut *self
                .handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for (event_type, handler_id) in handlers {
            self.manager.off(event_type, handler_id);
        }
        lock(&self.state).typing.clear();
    }
}

impl<C: Connector> Drop for Conversation<C> {
    fn drop(&mut self) {
        self.detach();
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn request<C: Connector>(manager: &ConnectionManager<C>, dm_request: &DmRequest) -> Result<bool> {
    if !manager.is_connected() {
        tracing::warn!(request = ?dm_request, "Direct-message channel is not connected");
        return Ok(false);
    }
    manager.send(dm_request)?;
    Ok(true)
}

fn mark_read<C: Connector>(
    manager: &ConnectionManager<C>,
    conversation_id: ConversationId,
    message_ids: Vec<MessageId>,
) -> Result<bool> {
    if message_ids.is_empty() {
        return Ok(false);
    }
    request(manager, &DmRequest::mark_read(conversation_id, message_ids))
}

fn handle<C: Connector>(
    manager: &ConnectionManager<C>,
    state: &Mutex<State>,
    id: ConversationId,
    me: UserId,
    event: &Event,
) {
    let dm_event = match DmEvent::from_event(event) {
        Ok(dm_event) => dm_event,
        Err(e) => {
            tracing::debug!(event_type = event.event_type(), error = %e, "Ignoring malformed event");
            return;
        }
    };

    match dm_event {
        DmEvent::NewMessage { message } if message.conversation == id => {
            let unread_from_other = message.sender.id != me && !message.is_read;
            let message_id = message.id;
            {
                let mut state = lock(state);
                if state.messages.iter().any(|m| m.id == message_id) {
                    return;
                }
                state.messages.push(message);
            }

            if unread_from_other
                && let Err(e) = mark_read(manager, id, vec![message_id])
            {
                tracing::warn!(conversation = id, error = %e, "Unable to mark message read");
            }
        }
        DmEvent::TypingStatus(TypingStatus {
            conversation_id,
            user_id,
            is_typing,
        }) if conversation_id == id => {
            let mut state = lock(state);
            if is_typing {
                state.typing.insert(user_id, Instant::now());
            } else {
                state.typing.remove(&user_id);
            }
        }
        DmEvent::ReactionAdded { reaction } => {
            let Some(message_id) = reaction.message_id else {
                return;
            };
            let mut state = lock(state);
            if let Some(message) = state.messages.iter_mut().find(|m| m.id == message_id) {
                message.reactions.push(reaction);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::config::Config;

    fn manager() -> ConnectionManager {
        ConnectionManager::new("ws://localhost:8000/ws/dm/", Config::default()).unwrap()
    }

    #[test]
    fn sends_nothing_while_disconnected() {
        let manager = manager();
        let conversation = Conversation::attach(&manager, 1, 7);

        assert!(!conversation.send_message("hi", None).unwrap());
        assert!(!conversation.send_typing(true).unwrap());
        assert!(!conversation.add_reaction(3, "👍").unwrap());
    }

    #[test]
    fn empty_mark_read_is_noop() {
        let manager = manager();
        let conversation = Conversation::attach(&manager, 1, 7);

        assert!(!conversation.mark_read(Vec::new()).unwrap());
    }

    #[test]
    fn drop_removes_handlers() {
        let manager = manager();
        let other = manager.on(NEW_MESSAGE_EVENT, |_| {});

        let conversation = Conversation::attach(&manager, 1, 7);
        assert_eq!(manager.handler_count(NEW_MESSAGE_EVENT), 2);
        drop(conversation);

        assert_eq!(manager.handler_count(NEW_MESSAGE_EVENT), 1);
        assert_eq!(manager.handler_count(TYPING_STATUS_EVENT), 0);
        assert!(manager.off(NEW_MESSAGE_EVENT, other));
    }
}
