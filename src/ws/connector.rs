//! Transport seam between [`ConnectionManager`](super::ConnectionManager) and the network.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

/// Opens WebSocket transports.
///
/// The manager calls [`Connector::connect`] once per connection attempt with the full URL,
/// token included. The default [`TungsteniteConnector`] dials the network; tests can hand back
/// in-memory streams instead (see [`WebSocketStream::from_raw_socket`]).
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Underlying byte stream of the WebSocket.
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Perform the opening handshake against `url`.
    async fn connect(&self, url: &Url) -> Result<WebSocketStream<Self::Io>, tungstenite::Error>;
}

/// Network connector backed by [`connect_async`], with TLS for `wss://` endpoints.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    type Io = MaybeTlsStream<TcpStream>;

    async fn connect(&self, url: &Url) -> Result<WebSocketStream<Self::Io>, tungstenite::Error> {
        let (stream, _response) = connect_async(url.as_str()).await?;
        Ok(stream)
    }
}
