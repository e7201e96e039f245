//! Core WebSocket infrastructure.
//!
//! One [`ConnectionManager`] owns one logical socket. It routes inbound JSON messages to
//! handlers by their `type` field, keeps the connection alive with heartbeats and reconnects
//! with exponential backoff until the attempt budget runs out.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: connection lifecycle, dispatch, heartbeat and reconnection
//! - [`Connector`]: opens the transport; [`TungsteniteConnector`] dials the network
//! - [`Event`]: a parsed inbound message, see [`parse_events`]
//!
//! # Example
//!
//! ```rust, no_run
//! use realtime_client::ws::ConnectionManager;
//! use realtime_client::ws::config::Config;
//!
//! # async fn example() -> realtime_client::Result<()> {
//! let connection = ConnectionManager::new("ws://localhost:8000/ws/notifications/", Config::default())?;
//! let id = connection.on("notification", |event| println!("{}", event.payload()));
//! connection.connect().await?;
//!
//! connection.off("notification", id);
//! connection.disconnect();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod connector;
pub mod error;
pub mod event;
pub mod handlers;

pub use connection::{ConnectionManager, ConnectionState};
pub use connector::{Connector, TungsteniteConnector};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use event::{Event, parse_events};
pub use handlers::{Handler, HandlerId};
