//! One [`ConnectionManager`] per purpose, created on first use and torn down explicitly.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::runtime::Handle;

use crate::Result;
use crate::settings::Settings;
use crate::ws::{ConnectionManager, Connector, TungsteniteConnector};

/// Purpose key of the notification channel.
pub const NOTIFICATIONS: &str = "notifications";
/// Purpose key of the direct-message channel.
pub const DIRECT_MESSAGES: &str = "direct_messages";

pub const NOTIFICATIONS_PATH: &str = "/ws/notifications/";
pub const DIRECT_MESSAGES_PATH: &str = "/ws/dm/";

/// Owns the connection managers of an application.
///
/// Managers are keyed by purpose (e.g. [`NOTIFICATIONS`]); asking twice for the same purpose
/// returns handles to the same connection. When [`Settings::enabled`] is set, a newly created
/// manager starts connecting in the background. Nothing is closed implicitly: call
/// [`teardown`](Self::teardown) or [`teardown_all`](Self::teardown_all).
///
/// # Example
///
/// ```rust, no_run
/// use realtime_client::registry::ConnectionRegistry;
/// use realtime_client::settings::Settings;
///
/// # async fn example() -> realtime_client::Result<()> {
/// let registry = ConnectionRegistry::new(Settings::from_env()?);
///
/// let notifications = registry.notifications()?;
/// notifications.connect().await?;
///
/// registry.teardown_all();
/// # Ok(())
/// # }
/// ```
pub struct ConnectionRegistry<C: Connector = TungsteniteConnector> {
    settings: Settings,
    connector: Arc<C>,
    managers: DashMap<String, ConnectionManager<C>>,
}

impl<C: Connector> fmt::Debug for ConnectionRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("settings", &self.settings)
            .field("managers", &self.managers.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry<TungsteniteConnector> {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self::with_connector(settings, Arc::new(TungsteniteConnector))
    }
}

impl<C: Connector> ConnectionRegistry<C> {
    #[must_use]
    pub fn with_connector(settings: Settings, connector: Arc<C>) -> Self {
        Self {
            settings,
            connector,
            managers: DashMap::new(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Create a manager for `purpose` at `path`, replacing (and disconnecting) any previous one.
    pub fn create(&self, purpose: &str, path: &str) -> Result<ConnectionManager<C>> {
        let manager = self.build(path)?;
        if let Some(previous) = self.managers.insert(purpose.to_owned(), manager.clone()) {
            tracing::debug!(purpose, "Replacing existing connection");
            previous.disconnect();
        }
        self.autoconnect(purpose, &manager);
        Ok(manager)
    }

    /// Return the manager for `purpose`, creating it at `path` on first use.
    pub fn get_or_create(&self, purpose: &str, path: &str) -> Result<ConnectionManager<C>> {
        let mut created = false;
        let manager = self
            .managers
            .entry(purpose.to_owned())
            .or_try_insert_with(|| {
                created = true;
                self.build(path)
            })?
            .clone();

        if created {
            self.autoconnect(purpose, &manager);
        }
        Ok(manager)
    }

    #[must_use]
    pub fn get(&self, purpose: &str) -> Option<ConnectionManager<C>> {
        self.managers.get(purpose).map(|manager| manager.clone())
    }

    /// The notification channel at [`NOTIFICATIONS_PATH`].
    pub fn notifications(&self) -> Result<ConnectionManager<C>> {
        self.get_or_create(NOTIFICATIONS, NOTIFICATIONS_PATH)
    }

    /// The direct-message channel at [`DIRECT_MESSAGES_PATH`].
    pub fn direct_messages(&self) -> Result<ConnectionManager<C>> {
        self.get_or_create(DIRECT_MESSAGES, DIRECT_MESSAGES_PATH)
    }

    /// Disconnect and forget the manager for `purpose`. Returns whether one existed.
    pub fn teardown(&self, purpose: &str) -> bool {
        match self.managers.remove(purpose) {
            Some((_, manager)) => {
                manager.disconnect();
                true
            }
            None => false,
        }
    }

    /// Disconnect and forget every manager.
    pub fn teardown_all(&self) {
        let purposes: Vec<String> = self
            .managers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for purpose in purposes {
            self.teardown(&purpose);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.managers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    fn build(&self, path: &str) -> Result<ConnectionManager<C>> {
        let endpoint = self.settings.endpoint(path)?;
        let manager = ConnectionManager::with_connector(
            &endpoint,
            self.settings.connection.clone(),
            Arc::clone(&self.connector),
        )?;
        manager.set_token(self.settings.token.clone());
        Ok(manager)
    }

    fn autoconnect(&self, purpose: &str, manager: &ConnectionManager<C>) {
        if !self.settings.enabled {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(purpose, "No Tokio runtime available, not connecting");
            return;
        };

        let manager = manager.clone();
        let purpose = purpose.to_owned();
        runtime.spawn(async move {
            if let Err(e) = manager.connect().await {
                tracing::info!(purpose, error = %e, "Realtime channel unavailable");
            }
        });
    }
}
