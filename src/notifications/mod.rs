//! Notification channel.
//!
//! The server pushes `notification`, `achievement_unlocked` and `level_up` events on
//! `/ws/notifications/`, and `dm_notification` on the direct-message channel. [`Alert`] gives
//! every one of them a common shape; an [`Inbox`] keeps the stored notifications and their read
//! state.
//!
//! # Example
//!
//! ```rust, no_run
//! use realtime_client::notifications::Inbox;
//! use realtime_client::registry::ConnectionRegistry;
//! use realtime_client::settings::Settings;
//!
//! # async fn example() -> realtime_client::Result<()> {
//! let registry = ConnectionRegistry::new(Settings::from_env()?);
//! let connection = registry.notifications()?;
//!
//! let inbox = Inbox::new();
//! inbox.attach(&connection);
//! connection.connect().await?;
//!
//! let mut alerts = inbox.subscribe_alerts();
//! while let Ok(alert) = alerts.recv().await {
//!     println!("[{}] {} ({} unread)", alert.kind, alert.message, inbox.unread_count());
//! }
//! # Ok(())
//! # }
//! ```

mod inbox;
pub mod types;

pub use inbox::Inbox;
pub use types::{Alert, Notification, NotificationId, NotificationKind};
