#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt as _, StreamExt as _};
use realtime_client::ws::config::Config;
use realtime_client::ws::{ConnectionManager, Connector, Event};
use serde_json::Value;
use tokio::io::DuplexStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

pub const ENDPOINT: &str = "ws://realtime.test/ws/dm/";

const DUPLEX_BUFFER: usize = 64 * 1024;

/// Server end of an in-memory connection.
pub type ServerSide = WebSocketStream<DuplexStream>;

/// Connector that hands out in-memory WebSocket pairs.
///
/// The server half of every successful attempt is delivered on the channel returned by
/// [`DuplexConnector::new`]. Attempts can be refused to exercise reconnection.
#[derive(Debug)]
pub struct DuplexConnector {
    servers: mpsc::UnboundedSender<ServerSide>,
    refuse_all: AtomicBool,
    refuse_next: AtomicU32,
    stall: AtomicBool,
    buffer: AtomicUsize,
    attempts: Mutex<Vec<(Instant, Url)>>,
}

impl DuplexConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerSide>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            servers,
            refuse_all: AtomicBool::new(false),
            refuse_next: AtomicU32::new(0),
            stall: AtomicBool::new(false),
            buffer: AtomicUsize::new(DUPLEX_BUFFER),
            attempts: Mutex::new(Vec::new()),
        };
        (Arc::new(connector), rx)
    }

    /// Refuse every attempt until called again with `false`.
    pub fn refuse_all(&self, refuse: bool) {
        self.refuse_all.store(refuse, Ordering::SeqCst);
    }

    /// Refuse the next `count` attempts.
    pub fn refuse_next(&self, count: u32) {
        self.refuse_next.store(count, Ordering::SeqCst);
    }

    /// Never complete new attempts while set.
    pub fn stall(&self, stall: bool) {
        self.stall.store(stall, Ordering::SeqCst);
    }

    /// Bytes the in-memory pipe holds before writes block, for connections made from now on.
    pub fn buffer(&self, bytes: usize) {
        self.buffer.store(bytes, Ordering::SeqCst);
    }

    /// When each attempt was made, in order.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, url)| url.clone())
            .collect()
    }

    fn should_refuse(&self) -> bool {
        self.refuse_all.load(Ordering::SeqCst)
            || self
                .refuse_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

#[async_trait]
impl Connector for DuplexConnector {
    type Io = DuplexStream;

    async fn connect(&self, url: &Url) -> Result<WebSocketStream<DuplexStream>, tungstenite::Error> {
        self.attempts
            .lock()
            .unwrap()
            .push((Instant::now(), url.clone()));

        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.should_refuse() {
            return Err(tungstenite::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        let (client, server) = tokio::io::duplex(self.buffer.load(Ordering::SeqCst));
        let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
        drop(self.servers.send(server));

        Ok(client)
    }
}

pub fn manager(config: Config) -> (
    ConnectionManager<DuplexConnector>,
    Arc<DuplexConnector>,
    mpsc::UnboundedReceiver<ServerSide>,
) {
    let (connector, servers) = DuplexConnector::new();
    let manager =
        ConnectionManager::with_connector(ENDPOINT, config, Arc::clone(&connector)).unwrap();
    (manager, connector, servers)
}

/// Next text frame from the client, skipping control frames. `None` once the client is gone.
pub async fn recv_text(server: &mut ServerSide) -> Option<String> {
    while let Some(message) = server.next().await {
        match message {
            Ok(Message::Text(text)) => return Some(text.to_string()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

pub async fn recv_json(server: &mut ServerSide) -> Value {
    let text = recv_text(server).await.unwrap();
    serde_json::from_str(&text).unwrap()
}

pub async fn send_json(server: &mut ServerSide, value: &Value) {
    server
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Next event of `event_type` seen by the manager; its handlers have run by then.
pub async fn next_event(events: &mut broadcast::Receiver<Event>, event_type: &str) -> Event {
    loop {
        let event = events.recv().await.unwrap();
        if event.event_type() == event_type {
            return event;
        }
    }
}
