//! Follow one direct-message conversation.
//!
//! Connects to `/ws/dm/`, sends a greeting with a typing indicator and logs every message,
//! typing change and reaction of the conversation until interrupted.
//!
//! Run with:
//! ```sh
//! WS_URL=ws://localhost:8000 ACCESS_TOKEN=... CONVERSATION_ID=3 USER_ID=7 RUST_LOG=info cargo run --example direct_messages
//! ```

use std::time::Duration;

use futures::StreamExt as _;
use realtime_client::dm::types::response::{NEW_MESSAGE_EVENT, TYPING_STATUS_EVENT};
use realtime_client::dm::{Conversation, DmEvent};
use realtime_client::registry::ConnectionRegistry;
use realtime_client::settings::Settings;
use tokio::time::sleep;
use tracing::{debug, info, warn};

fn env_id(name: &str) -> anyhow::Result<i64> {
    let value = std::env::var(name).map_err(|e| anyhow::anyhow!("{name}: {e}"))?;
    Ok(value.parse()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let conversation_id = env_id("CONVERSATION_ID")?;
    let me = env_id("USER_ID")?;

    let registry = ConnectionRegistry::new(Settings::from_env()?);
    let connection = registry.direct_messages()?;
    let conversation = Conversation::attach(&connection, conversation_id, me);

    connection.connect().await?;
    info!(endpoint = %connection.endpoint(), conversation = conversation.id(), "Connected");

    conversation.send_typing(true)?;
    sleep(Duration::from_millis(500)).await;
    if conversation.send_message("Hello from realtime-client", None)? {
        info!("Greeting sent");
    }
    conversation.send_typing(false)?;

    // Raw events of the whole channel; the conversation keeps its own state alongside
    let mut events = Box::pin(connection.stream(NEW_MESSAGE_EVENT));
    let mut typing = Box::pin(connection.stream(TYPING_STATUS_EVENT));

    loop {
        tokio::select! {
            Some(event) = events.next() => match event.and_then(|event| DmEvent::from_event(&event)) {
                Ok(DmEvent::NewMessage { message }) if message.conversation == conversation_id => {
                    info!(
                        from = %message.sender.username,
                        content = %message.content,
                        total = conversation.messages().len(),
                    );
                }
                Ok(other) => debug!(?other, "Message for another conversation"),
                Err(e) => warn!(error = %e, "Unreadable event"),
            },
            Some(_) = typing.next() => {
                info!(typing = ?conversation.typing_users());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    conversation.detach();
    registry.teardown_all();
    info!("Disconnected");

    Ok(())
}
