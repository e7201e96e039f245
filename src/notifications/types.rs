use serde::{Deserialize, Serialize};

use crate::types::{DateTime, UserId, UserSummary, Utc};
use crate::ws::Event;

pub type NotificationId = i64;

pub const NOTIFICATION_EVENT: &str = "notification";
pub const ACHIEVEMENT_UNLOCKED_EVENT: &str = "achievement_unlocked";
pub const LEVEL_UP_EVENT: &str = "level_up";
/// Sent on the direct-message channel when a message arrives outside the open conversation.
pub const DM_NOTIFICATION_EVENT: &str = "dm_notification";

/// What a notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    Mention,
    DmNotification,
    Achievement,
    LevelUp,
    GoalAchieved,
    Reminder,
    /// Unknown kind from the server (captures the raw value)
    #[serde(untagged)]
    Unknown(String),
}

/// A stored notification as sent inside `{"type":"notification","notification":{..}}`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub from_user: Option<UserSummary>,
    #[serde(default)]
    pub post_id: Option<i64>,
    #[serde(default)]
    pub conversation_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_read: bool,
}

/// Payload of a `notification` event.
#[derive(Debug, Clone, Deserialize)]
struct NotificationEvent {
    #[serde(default)]
    notification: Option<Notification>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AchievementUnlocked {
    achievement_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LevelUp {
    new_level: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct DmNotification {
    message: DmPreview,
}

#[derive(Debug, Clone, Deserialize)]
struct DmPreview {
    sender: UserSummary,
    #[serde(default)]
    content: String,
    #[serde(default)]
    conversation: Option<i64>,
}

/// Something worth surfacing to the user, derived from one inbound event.
///
/// `notification` is set only when the server sent a stored notification; those are the ones
/// an [`Inbox`](super::Inbox) keeps.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: NotificationKind,
    /// `None` when the server sent no title
    pub title: Option<String>,
    pub message: String,
    pub from_user: Option<UserId>,
    pub notification: Option<Notification>,
}

impl Alert {
    /// Interpret an event from the notification or direct-message channel.
    ///
    /// Returns `None` for event types that are not notifications and for payloads that do not
    /// have the expected shape.
    #[must_use]
    pub fn from_event(event: &Event) -> Option<Self> {
        let alert = match event.event_type() {
            NOTIFICATION_EVENT => {
                let payload: NotificationEvent = event.parse().ok()?;
                match payload.notification {
                    Some(notification) => Self {
                        kind: notification.kind.clone(),
                        title: payload.title.or_else(|| Some(notification.title.clone())),
                        message: payload
                            .message
                            .unwrap_or_else(|| notification.message.clone()),
                        from_user: notification.from_user.as_ref().map(|user| user.id),
                        notification: Some(notification),
                    },
                    None => Self {
                        kind: NotificationKind::Unknown(NOTIFICATION_EVENT.to_owned()),
                        title: payload.title,
                        message: payload.message.unwrap_or_default(),
                        from_user: None,
                        notification: None,
                    },
                }
            }
            ACHIEVEMENT_UNLOCKED_EVENT => {
                let payload: AchievementUnlocked = event.parse().ok()?;
                Self {
                    kind: NotificationKind::Achievement,
                    title: None,
                    message: payload.achievement_name,
                    from_user: None,
                    notification: None,
                }
            }
            LEVEL_UP_EVENT => {
                let payload: LevelUp = event.parse().ok()?;
                Self {
                    kind: NotificationKind::LevelUp,
                    title: None,
                    message: format!("Reached level {}", payload.new_level),
                    from_user: None,
                    notification: None,
                }
            }
            DM_NOTIFICATION_EVENT => {
                let payload: DmNotification = event.parse().ok()?;
                let sender = payload.message.sender;
                tracing::trace!(
                    conversation = payload.message.conversation,
                    "Direct message notification"
                );
                Self {
                    kind: NotificationKind::DmNotification,
                    title: None,
                    message: format!("{}: {}", sender.username, payload.message.content),
                    from_user: Some(sender.id),
                    notification: None,
                }
            }
            _ => return None,
        };
        Some(alert)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ws::parse_events;

    fn event(value: &serde_json::Value) -> Event {
        parse_events(value.to_string().as_bytes())
            .unwrap()
            .pop()
            .unwrap()
    }

    #[test]
    fn kind_parses_known_and_unknown() {
        let known: NotificationKind = serde_json::from_value(json!("goal_achieved")).unwrap();
        let unknown: NotificationKind = serde_json::from_value(json!("streak")).unwrap();

        assert_eq!(known, NotificationKind::GoalAchieved);
        assert_eq!(unknown, NotificationKind::Unknown("streak".to_owned()));
        assert_eq!(NotificationKind::DmNotification.to_string(), "dm_notification");
    }

    #[test]
    fn stored_notification_alert() {
        let alert = Alert::from_event(&event(&json!({
            "type": "notification",
            "notification": {
                "id": 7,
                "type": "like",
                "title": "New like",
                "message": "alice liked your post",
                "from_user": { "id": 3, "username": "alice" },
                "post_id": 99,
                "created_at": "2024-05-01T10:00:00Z"
            }
        })))
        .unwrap();

        assert_eq!(alert.kind, NotificationKind::Like);
        assert_eq!(alert.title.as_deref(), Some("New like"));
        assert_eq!(alert.from_user, Some(3));
        let notification = alert.notification.unwrap();
        assert_eq!(notification.id, 7);
        assert_eq!(notification.post_id, Some(99));
        assert!(!notification.is_read);
    }

    #[test]
    fn achievement_uses_name_as_message() {
        let alert = Alert::from_event(&event(&json!({
            "type": "achievement_unlocked",
            "achievement_name": "First 10k"
        })))
        .unwrap();

        assert_eq!(alert.kind, NotificationKind::Achievement);
        assert_eq!(alert.message, "First 10k");
        assert!(alert.notification.is_none());
    }

    #[test]
    fn level_up_mentions_level() {
        let alert =
            Alert::from_event(&event(&json!({ "type": "level_up", "new_level": 12 }))).unwrap();

        assert_eq!(alert.kind, NotificationKind::LevelUp);
        assert!(alert.message.contains("12"));
    }

    #[test]
    fn dm_notification_prefixes_sender() {
        let alert = Alert::from_event(&event(&json!({
            "type": "dm_notification",
            "message": {
                "id": 1,
                "conversation": 4,
                "sender": { "id": 8, "username": "bob" },
                "content": "hey"
            }
        })))
        .unwrap();

        assert_eq!(alert.message, "bob: hey");
        assert_eq!(alert.from_user, Some(8));
    }

    #[test]
    fn malformed_or_unrelated_events_are_ignored() {
        assert!(Alert::from_event(&event(&json!({ "type": "level_up" }))).is_none());
        assert!(Alert::from_event(&event(&json!({ "type": "new_message" }))).is_none());
    }
}
