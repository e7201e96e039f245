use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::broadcast;

use super::types::{
    ACHIEVEMENT_UNLOCKED_EVENT, Alert, DM_NOTIFICATION_EVENT, LEVEL_UP_EVENT, NOTIFICATION_EVENT,
    Notification, NotificationId,
};
use crate::ws::{ConnectionManager, Connector, Event};

const ALERT_CAPACITY: usize = 256;

type Detach = Box<dyn FnOnce() + Send>;

/// Received notifications, newest first, with their read state.
///
/// An inbox is fed by the handlers it registers on one or more managers. Every recognised event
/// is also published as an [`Alert`] to [`subscribe_alerts`](Self::subscribe_alerts) receivers;
/// only stored notifications are kept in the list.
///
/// Clones share the same inbox.
#[derive(Clone, Default)]
pub struct Inbox {
    shared: Arc<Shared>,
}

struct Shared {
    notifications: Mutex<Vec<Notification>>,
    alerts: broadcast::Sender<Alert>,
    detachers: Mutex<Vec<Detach>>,
}

impl Default for Shared {
    fn default() -> Self {
        let (alerts, _) = broadcast::channel(ALERT_CAPACITY);
        Self {
            notifications: Mutex::default(),
            alerts,
            detachers: Mutex::default(),
        }
    }
}

impl fmt::Debug for Inbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kept = self.shared.lock_notifications().len();
        let unread = self.unread_count();
        let attached = self.shared.lock_detachers().len();

        f.debug_struct("Inbox")
            .field("notifications", &kept)
            .field("unread", &unread)
            .field("attached", &attached)
            .finish()
    }
}

impl Inbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen for `notification`, `achievement_unlocked` and `level_up` on `manager`.
    pub fn attach<C: Connector>(&self, manager: &ConnectionManager<C>) {
        for event_type in [NOTIFICATION_EVENT, ACHIEVEMENT_UNLOCKED_EVENT, LEVEL_UP_EVENT] {
            self.watch(manager, event_type);
        }
    }

    /// Listen for `dm_notification` on the direct-message `manager`.
    pub fn attach_direct_messages<C: Connector>(&self, manager: &ConnectionManager<C>) {
        self.watch(manager, DM_NOTIFICATION_EVENT);
    }

    /// Remove every handler this inbox registered. Other handlers on the same managers stay.
    pub fn detach(&self) {
        let detachers = mem::take(&mut *self.shared.lock_detachers());
        for detach in detachers {
            detach();
        }
    }

    /// Snapshot of the kept notifications, newest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.shared.lock_notifications().clone()
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.shared
            .lock_notifications()
            .iter()
            .filter(|n| !n.is_read)
            .count()
    }

    /// Mark one notification as read. Returns `false` if it is unknown or already read.
    pub fn mark_as_read(&self, id: NotificationId) -> bool {
        let mut notifications = self.shared.lock_notifications();
        match notifications.iter_mut().find(|n| n.id == id) {
            Some(notification) if !notification.is_read => {
                notification.is_read = true;
                true
            }
            _ => false,
        }
    }

    pub fn mark_all_as_read(&self) {
        for notification in self.shared.lock_notifications().iter_mut() {
            notification.is_read = true;
        }
    }

    #[must_use]
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.shared.alerts.subscribe()
    }

    fn watch<C: Connector>(&self, manager: &ConnectionManager<C>, event_type: &'static str) {
        // The manager owns the handler; a strong reference would keep the inbox alive forever.
        let shared = Arc::downgrade(&self.shared);
        let id = manager.on(event_type, move |event| {
            if let Some(shared) = Weak::upgrade(&shared) {
                shared.receive(event);
            }
        });

        let manager = manager.clone();
        self.shared
            .lock_detachers()
            .push(Box::new(move || {
                manager.off(event_type, id);
            }));
    }
}

impl Shared {
    fn lock_notifications(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_detachers(&self) -> MutexGuard<'_, Vec<Detach>> {
        self.detachers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn receive(&self, event: &Event) {
        let Some(alert) = Alert::from_event(event) else {
            tracing::debug!(
                event_type = event.event_type(),
                "Ignoring malformed notification event"
            );
            return;
        };

        if let Some(notification) = &alert.notification {
            let mut notifications = self.lock_notifications();
            if notifications.iter().any(|n| n.id == notification.id) {
                tracing::debug!(id = notification.id, "Duplicate notification");
            } else {
                notifications.insert(0, notification.clone());
            }
        }

        // No subscribers is fine
        _ = self.alerts.send(alert);
    }
}
