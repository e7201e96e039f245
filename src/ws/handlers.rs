use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::event::Event;

/// Callback invoked for every event of the type it was registered for.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Identity of a registered handler, used to remove exactly that handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Event type → handlers, in registration order.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: DashMap<String, Vec<(HandlerId, Handler)>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("event_types", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl HandlerRegistry {
    pub(crate) fn register(&self, event_type: &str, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .entry(event_type.to_owned())
            .or_default()
            .push((id, handler));
        id
    }

    pub(crate) fn remove(&self, event_type: &str, id: HandlerId) -> bool {
        let Some(mut handlers) = self.handlers.get_mut(event_type) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;
        let now_empty = handlers.is_empty();
        drop(handlers);

        if now_empty {
            self.handlers
                .remove_if(event_type, |_, handlers| handlers.is_empty());
        }
        removed
    }

    pub(crate) fn clear(&self) {
        self.handlers.clear();
    }

    pub(crate) fn count(&self, event_type: &str) -> usize {
        self.handlers.get(event_type).map_or(0, |h| h.len())
    }

    /// Handlers registered for `event_type` right now.
    fn snapshot(&self, event_type: &str) -> Vec<Handler> {
        self.handlers
            .get(event_type)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    /// Invoke every handler of the event's type.
    ///
    /// Iterates over a snapshot, so handlers may call `on`/`off` re-entrantly; such changes
    /// apply from the next event on. A panicking handler is logged and does not stop the rest.
    pub(crate) fn dispatch(&self, event: &Event) {
        for handler in self.snapshot(event.event_type()) {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_owned());
                tracing::error!(
                    event_type = event.event_type(),
                    %reason,
                    "Event handler panicked"
                );
            }
        }
    }
}
