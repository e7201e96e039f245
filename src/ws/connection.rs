#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_stream::try_stream;
use backoff::backoff::Backoff as _;
use futures::{SinkExt as _, Stream, StreamExt as _};
use secrecy::{ExposeSecret as _, SecretString};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Notify, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::Config;
use super::connector::{Connector, TungsteniteConnector};
use super::error::WsError;
use super::event::{Event, MAX_ATTEMPTS_REACHED, parse_events};
use super::handlers::{HandlerId, HandlerRegistry};
use crate::Result;
use crate::error::Error;

/// Broadcast channel capacity for incoming events.
const BROADCAST_CAPACITY: usize = 1024;

/// Query parameter carrying the access token.
const TOKEN_PARAM: &str = "token";

const HEARTBEAT_MESSAGE: &str = r#"{"type":"heartbeat"}"#;

const CLIENT_DISCONNECT_REASON: &str = "Client disconnect";

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected: never started, or closed on purpose
    Idle,
    /// Opening handshake in progress
    Connecting,
    /// Successfully connected
    Open {
        /// When the connection was established
        since: Instant,
    },
    /// The open connection dropped without being asked to
    Closed,
    /// Waiting out the backoff before the next attempt
    Reconnecting {
        /// Current reconnection attempt number, starting at 1
        attempt: u32,
        /// Backoff before this attempt starts
        delay: Duration,
    },
    /// Reconnect budget exhausted; only an explicit `connect` starts over
    Failed,
}

impl ConnectionState {
    /// Check if the connection is currently open.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

/// Manages one logical WebSocket connection: handshake, dispatch, heartbeat and reconnection.
///
/// - Inbound frames are parsed as JSON and routed by their `type` field to the handlers
///   registered with [`on`](Self::on), and to every [`subscribe`](Self::subscribe) receiver.
/// - While open, a `{"type":"heartbeat"}` message is sent every
///   [`Config::heartbeat_interval`].
/// - An unexpected close schedules a reconnect with exponential backoff. Once
///   [`ReconnectConfig::max_attempts`](super::config::ReconnectConfig::max_attempts) is
///   exhausted a single `connection_failed` event is dispatched and the manager stops.
/// - [`disconnect`](Self::disconnect) is final for the current session: no timer survives it.
///
/// Handles are cheap to clone and all refer to the same connection.
///
/// # Example
///
/// ```rust, no_run
/// use realtime_client::ws::ConnectionManager;
/// use realtime_client::ws::config::Config;
///
/// # async fn example() -> realtime_client::Result<()> {
/// let connection = ConnectionManager::new("ws://localhost:8000/ws/dm/", Config::default())?;
///
/// connection.on("new_message", |event| {
///     println!("{}", event.payload());
/// });
/// connection.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager<C: Connector = TungsteniteConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("state", &self.state())
            .field("handlers", &self.inner.handlers)
            .finish_non_exhaustive()
    }
}

struct Inner<C> {
    /// Endpoint without the token
    endpoint: Url,
    token: RwLock<Option<SecretString>>,
    config: Config,
    connector: Arc<C>,
    state_tx: watch::Sender<ConnectionState>,
    lifecycle: Mutex<Lifecycle>,
    handlers: HandlerRegistry,
    events_tx: broadcast::Sender<Event>,
}

/// Everything `connect`, `send` and `disconnect` must observe atomically.
#[derive(Default)]
struct Lifecycle {
    /// Running connection task, if any
    session: Option<Session>,
    /// `connect` callers waiting for the outcome of the next attempt
    waiters: Vec<oneshot::Sender<Result<()>>>,
    /// Outgoing queue of the open connection; `None` whenever not open
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Task of a disconnected session that may still be writing its close frame
    closing: Option<JoinHandle<()>>,
}

struct Session {
    cancel: CancellationToken,
    /// Cuts a pending backoff short
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ConnectionManager<TungsteniteConnector> {
    /// Create a manager for `endpoint` (a `ws://` or `wss://` URL).
    ///
    /// Nothing is opened until [`connect`](Self::connect) is called.
    pub fn new(endpoint: &str, config: Config) -> Result<Self> {
        Self::with_connector(endpoint, config, Arc::new(TungsteniteConnector))
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager that opens its transports through `connector`.
    pub fn with_connector(endpoint: &str, config: Config, connector: Arc<C>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(Error::invalid_endpoint(
                endpoint,
                "must use the ws or wss scheme",
            ));
        }

        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (events_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                endpoint,
                token: RwLock::new(None),
                config,
                connector,
                state_tx,
                lifecycle: Mutex::new(Lifecycle::default()),
                handlers: HandlerRegistry::default(),
                events_tx,
            }),
        })
    }

    /// Set the token appended as `?token=` on the next connection attempt.
    pub fn set_token(&self, token: Option<SecretString>) {
        *self
            .inner
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }

    /// Open the connection.
    ///
    /// Resolves immediately when already open. Otherwise resolves once the next handshake
    /// completes, or fails with that attempt's error. Concurrent calls share one attempt, and
    /// a call made while a reconnect backoff is pending starts that attempt right away.
    ///
    /// Right after [`disconnect`](Self::disconnect) the first attempt waits until the previous
    /// transport is closed, at most [`Config::close_timeout`].
    ///
    /// A failed attempt still enters the reconnect cycle in the background; only its error is
    /// reported here.
    pub async fn connect(&self) -> Result<()> {
        let outcome = {
            let mut lifecycle = self.inner.lock_lifecycle();
            let state = self.state();
            if state.is_open() {
                return Ok(());
            }

            let (tx, rx) = oneshot::channel();
            lifecycle.waiters.push(tx);

            match &lifecycle.session {
                Some(session) => {
                    // Wakes only the current backoff; no permit is left for a later one
                    if matches!(state, ConnectionState::Reconnecting { .. }) {
                        session.wake.notify_waiters();
                    }
                }
                None => {
                    let cancel = CancellationToken::new();
                    let wake = Arc::new(Notify::new());
                    let previous = lifecycle.closing.take();
                    let task = tokio::spawn(Arc::clone(&self.inner).run(
                        cancel.clone(),
                        Arc::clone(&wake),
                        previous,
                    ));
                    lifecycle.session = Some(Session { cancel, wake, task });
                }
            }
            rx
        };

        outcome.await.map_err(|_e| WsError::ConnectionClosed)?
    }

    /// Send a message if the connection is open.
    ///
    /// When it is not, the message is dropped with a warning; nothing is queued. Check
    /// [`is_connected`](Self::is_connected) first when delivery matters. Only serialization
    /// failures are returned as errors.
    pub fn send<R: Serialize + ?Sized>(&self, message: &R) -> Result<()> {
        let json = serde_json::to_string(message)?;

        let lifecycle = self.inner.lock_lifecycle();
        let queued = lifecycle
            .outbound
            .as_ref()
            .is_some_and(|tx| tx.send(json).is_ok());
        drop(lifecycle);

        if !queued {
            tracing::warn!(
                endpoint = %self.inner.endpoint,
                "WebSocket is not connected, dropping message"
            );
        }
        Ok(())
    }

    /// Register `handler` for events whose `type` is `event_type`.
    ///
    /// Handlers run on the connection task in registration order. A handler registered while
    /// an event is being dispatched first sees the next event.
    pub fn on<F>(&self, event_type: &str, handler: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.handlers.register(event_type, Arc::new(handler))
    }

    /// Remove the handler registered as `id`. Returns whether it was registered.
    pub fn off(&self, event_type: &str, id: HandlerId) -> bool {
        self.inner.handlers.remove(event_type, id)
    }

    /// Number of handlers currently registered for `event_type`.
    #[must_use]
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.inner.handlers.count(event_type)
    }

    /// Close the connection on purpose.
    ///
    /// Cancels any pending reconnect and the heartbeat, closes the transport with a normal
    /// close frame and removes every handler. Pending [`connect`](Self::connect) calls fail
    /// with [`WsError::ConnectionClosed`]. A later `connect` starts a fresh session once the
    /// close frame is out.
    pub fn disconnect(&self) {
        let (had_session, waiters) = {
            let mut lifecycle = self.inner.lock_lifecycle();
            let session = lifecycle.session.take();
            let had_session = session.is_some();
            if let Some(session) = session {
                session.cancel.cancel();
                lifecycle.closing = Some(session.task);
            }
            lifecycle.outbound = None;
            self.inner.state_tx.send_replace(ConnectionState::Idle);
            (had_session, mem::take(&mut lifecycle.waiters))
        };
        drop(waiters);
        self.inner.handlers.clear();

        tracing::info!(
            endpoint = %self.inner.endpoint,
            had_session,
            "WebSocket disconnected"
        );
    }

    /// Whether the transport is open right now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to every dispatched event.
    ///
    /// Each call returns a new independent receiver.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events_tx.subscribe()
    }

    /// Stream of the events whose `type` is `event_type`.
    ///
    /// Yields [`WsError::Lagged`] if the consumer falls behind, and ends when the manager is
    /// dropped.
    pub fn stream(&self, event_type: &str) -> impl Stream<Item = Result<Event>> + use<C> {
        let mut rx = self.subscribe();
        let event_type = event_type.to_owned();

        try_stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if event.event_type() == event_type {
                            yield event;
                        }
                    }
                    Err(RecvError::Lagged(count)) => {
                        tracing::warn!("Event stream lagged, missed {count} messages");
                        Err(WsError::Lagged { count })?;
                    }
                    Err(RecvError::Closed) => {
                        break;
                    }
                }
            }
        }
    }

    /// Endpoint this manager connects to, without the token.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl<C: Connector> Inner<C> {
    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        // Every field is replaced wholesale, so a poisoned lock holds no partial update.
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(token) = self
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            url.query_pairs_mut()
                .append_pair(TOKEN_PARAM, token.expose_secret());
        }
        url
    }

    /// Connection loop of one session, from the first attempt until disconnect or failure.
    ///
    /// `previous` is the task of the session disconnected before this one. It is awaited even
    /// when this session is cancelled meanwhile, so session tasks end in order and at most one
    /// transport is alive.
    async fn run(
        self: Arc<Self>,
        cancel: CancellationToken,
        wake: Arc<Notify>,
        previous: Option<JoinHandle<()>>,
    ) {
        if let Some(previous) = previous
            && let Err(e) = previous.await
        {
            tracing::debug!(error = %e, "Previous session ended abnormally");
        }

        let mut attempt = 0_u32;
        let mut backoff = self.config.reconnect.backoff();

        loop {
            if !self.publish(&cancel, ConnectionState::Connecting) {
                return;
            }

            let url = self.url();
            let connected = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                result = self.connector.connect(&url) => result,
            };

            match connected {
                Ok(ws_stream) => {
                    attempt = 0;
                    backoff.reset();

                    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                    if !self.opened(&cancel, outbound_tx) {
                        return;
                    }
                    tracing::info!(endpoint = %self.endpoint, "WebSocket connected");

                    match self
                        .handle_connection(ws_stream, outbound_rx, &cancel)
                        .await
                    {
                        Ok(()) => return,
                        Err(e) => {
                            tracing::warn!(
                                endpoint = %self.endpoint,
                                error = %e,
                                "WebSocket connection lost"
                            );
                            if !self.publish(&cancel, ConnectionState::Closed) {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        error = %e,
                        "Unable to connect"
                    );
                    self.fail_waiters(&cancel, e);
                }
            }

            if !self.config.reconnect.allows(attempt) {
                tracing::error!(
                    endpoint = %self.endpoint,
                    attempts = attempt,
                    "Max reconnection attempts reached"
                );
                if self.finish(&cancel) {
                    self.dispatch(Event::connection_failed(MAX_ATTEMPTS_REACHED));
                }
                return;
            }

            attempt = attempt.saturating_add(1);
            let delay = backoff
                .next_backoff()
                .unwrap_or(self.config.reconnect.max_backoff);

            // Registered before `Reconnecting` is visible to `connect`
            let woken = wake.notified();
            tokio::pin!(woken);
            woken.as_mut().enable();

            if !self.publish(&cancel, ConnectionState::Reconnecting { attempt, delay }) {
                return;
            }
            tracing::info!(endpoint = %self.endpoint, attempt, ?delay, "Reconnecting");

            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = &mut woken => {
                    tracing::debug!(attempt, "Reconnect requested, skipping remaining backoff");
                }
                () = sleep(delay) => {}
            }
        }
    }

    /// Drive an open connection until it drops (`Err`) or the session is cancelled (`Ok`).
    async fn handle_connection<S>(
        &self,
        ws_stream: WebSocketStream<S>,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut write, mut read) = ws_stream.split();

        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: CLIENT_DISCONNECT_REASON.into(),
                    };
                    match timeout(self.config.close_timeout, write.send(Message::Close(Some(frame)))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::debug!(error = %e, "Unable to send close frame"),
                        Err(_elapsed) => tracing::debug!("Timed out sending close frame"),
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            tracing::trace!(%text, "Received WebSocket text message");
                            self.handle_frame(text.as_bytes());
                        }
                        Some(Ok(Message::Binary(bytes))) => self.handle_frame(&bytes),
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|frame| (Some(u16::from(frame.code)), frame.reason.to_string()))
                                .unwrap_or_default();
                            return Err(WsError::ClosedByServer { code, reason }.into());
                        }
                        Some(Ok(_)) => {
                            // Ping/pong frames are answered by tungstenite itself.
                        }
                        Some(Err(e)) => return Err(WsError::Connection(e).into()),
                        None => return Err(WsError::ConnectionClosed.into()),
                    }
                }

                Some(text) = outbound_rx.recv() => {
                    write
                        .send(Message::Text(text.into()))
                        .await
                        .map_err(WsError::Connection)?;
                }

                _ = heartbeat.tick() => {
                    tracing::trace!("Sending heartbeat");
                    write
                        .send(Message::Text(HEARTBEAT_MESSAGE.into()))
                        .await
                        .map_err(WsError::Connection)?;
                }
            }
        }
    }

    fn handle_frame(&self, bytes: &[u8]) {
        match parse_events(bytes) {
            Ok(events) => {
                for event in events {
                    tracing::trace!(event_type = event.event_type(), "Dispatching event");
                    self.dispatch(event);
                }
            }
            Err(e) => {
                tracing::warn!(
                    frame = %String::from_utf8_lossy(bytes),
                    error = %e,
                    "Failed to parse WebSocket message"
                );
            }
        }
    }

    fn dispatch(&self, event: Event) {
        self.handlers.dispatch(&event);
        // No receivers is fine
        _ = self.events_tx.send(event);
    }

    /// Publish `state` unless the session was cancelled. Leaving `Open` closes the outbound queue.
    fn publish(&self, cancel: &CancellationToken, state: ConnectionState) -> bool {
        let mut lifecycle = self.lock_lifecycle();
        if cancel.is_cancelled() {
            return false;
        }
        lifecycle.outbound = None;
        self.state_tx.send_replace(state);
        true
    }

    fn opened(&self, cancel: &CancellationToken, outbound: mpsc::UnboundedSender<String>) -> bool {
        let waiters = {
            let mut lifecycle = self.lock_lifecycle();
            if cancel.is_cancelled() {
                return false;
            }
            lifecycle.outbound = Some(outbound);
            self.state_tx.send_replace(ConnectionState::Open {
                since: Instant::now(),
            });
            mem::take(&mut lifecycle.waiters)
        };

        for waiter in waiters {
            _ = waiter.send(Ok(()));
        }
        true
    }

    fn fail_waiters(&self, cancel: &CancellationToken, error: tungstenite::Error) {
        let waiters = {
            let mut lifecycle = self.lock_lifecycle();
            if cancel.is_cancelled() {
                return;
            }
            mem::take(&mut lifecycle.waiters)
        };

        let error = Arc::new(error);
        for waiter in waiters {
            _ = waiter.send(Err(WsError::Handshake(Arc::clone(&error)).into()));
        }
    }

    /// End the session in [`ConnectionState::Failed`]. Late waiters see the connection closed.
    fn finish(&self, cancel: &CancellationToken) -> bool {
        let waiters = {
            let mut lifecycle = self.lock_lifecycle();
            if cancel.is_cancelled() {
                return false;
            }
            lifecycle.session = None;
            lifecycle.outbound = None;
            self.state_tx.send_replace(ConnectionState::Failed);
            mem::take(&mut lifecycle.waiters)
        };
        drop(waiters);
        true
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn rejects_non_websocket_scheme() {
        let error = ConnectionManager::new("https://example.com/ws/", Config::default())
            .unwrap_err();

        assert_eq!(error.kind(), crate::error::Kind::Endpoint);
    }

    #[test]
    fn url_without_token_is_endpoint() {
        let manager =
            ConnectionManager::new("ws://localhost:8000/ws/dm/", Config::default()).unwrap();

        assert_eq!(manager.inner.url().as_str(), "ws://localhost:8000/ws/dm/");
    }

    #[test]
    fn token_is_appended_and_encoded() {
        let manager =
            ConnectionManager::new("ws://localhost:8000/ws/dm/", Config::default()).unwrap();
        manager.set_token(Some(SecretString::from("a b&c".to_owned())));

        assert_eq!(
            manager.inner.url().as_str(),
            "ws://localhost:8000/ws/dm/?token=a+b%26c"
        );
        assert_eq!(
            manager.endpoint().as_str(),
            "ws://localhost:8000/ws/dm/",
            "endpoint never carries the token"
        );
    }

    #[test]
    fn new_manager_is_idle() {
        let manager =
            ConnectionManager::new("wss://example.com/ws/notifications/", Config::default())
                .unwrap();

        assert_eq!(manager.state(), ConnectionState::Idle);
        assert!(!manager.is_connected());
    }

    #[test]
    fn send_while_idle_is_dropped() {
        let manager =
            ConnectionManager::new("ws://localhost:8000/ws/dm/", Config::default()).unwrap();

        manager
            .send(&serde_json::json!({ "type": "send_message" }))
            .unwrap();
    }

    #[test]
    fn disconnect_clears_handlers() {
        let manager =
            ConnectionManager::new("ws://localhost:8000/ws/dm/", Config::default()).unwrap();
        manager.on("new_message", |_| {});
        manager.on("typing_status", |_| {});

        manager.disconnect();

        assert_eq!(manager.handler_count("new_message"), 0);
        assert_eq!(manager.handler_count("typing_status"), 0);
        assert_eq!(manager.state(), ConnectionState::Idle);
    }
}
