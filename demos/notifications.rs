//! Follow the notification channel and print every alert.
//!
//! Reads `WS_URL`, `ENABLE_WEBSOCKET` and `ACCESS_TOKEN` from the environment, connects to
//! `/ws/notifications/` and logs alerts along with the unread count. Connection state changes
//! are logged too, so stopping the server shows the reconnection schedule.
//!
//! Run with:
//! ```sh
//! WS_URL=ws://localhost:8000 ACCESS_TOKEN=... RUST_LOG=info,realtime_client=debug cargo run --example notifications
//! ```
//!
//! Optionally log to a file:
//! ```sh
//! LOG_FILE=notifications.log RUST_LOG=info cargo run --example notifications
//! ```

use std::fs::File;

use realtime_client::notifications::Inbox;
use realtime_client::registry::ConnectionRegistry;
use realtime_client::settings::Settings;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let registry = ConnectionRegistry::new(Settings::from_env()?);
    let connection = registry.notifications()?;

    let inbox = Inbox::new();
    inbox.attach(&connection);

    connection.on("connection_failed", |event| {
        error!(payload = %event.payload(), "Giving up on the notification channel");
    });

    let mut states = connection.state_receiver();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            info!(?state, "Connection state changed");
        }
    });

    if let Err(e) = connection.connect().await {
        warn!(error = %e, "Initial connection failed, retrying in the background");
    }

    let mut alerts = inbox.subscribe_alerts();
    loop {
        tokio::select! {
            alert = alerts.recv() => match alert {
                Ok(alert) => info!(
                    kind = %alert.kind,
                    title = alert.title.as_deref().unwrap_or_default(),
                    message = %alert.message,
                    unread = inbox.unread_count(),
                ),
                Err(RecvError::Lagged(count)) => warn!(count, "Missed alerts"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    inbox.mark_all_as_read();
    inbox.detach();
    registry.teardown_all();
    info!("Disconnected");

    Ok(())
}
