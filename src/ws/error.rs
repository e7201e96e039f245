#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use tokio_tungstenite::tungstenite;

use crate::error::{Error, Kind};

/// Why a socket could not be opened or stopped working.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Reading from or writing to an open connection failed
    Connection(tungstenite::Error),
    /// The opening handshake failed; every caller waiting on the attempt gets the same cause
    Handshake(Arc<tungstenite::Error>),
    /// The server sent a close frame
    ClosedByServer {
        /// Close code, absent when the frame carried none
        code: Option<u16>,
        reason: String,
    },
    /// The connection ended without a close frame, or was closed by `disconnect`
    ConnectionClosed,
    /// An event stream fell behind and missed messages
    Lagged {
        /// Number of messages that were missed
        count: u64,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::Handshake(e) => write!(f, "WebSocket handshake failed: {e}"),
            Self::ClosedByServer {
                code: Some(code),
                reason,
            } => write!(f, "WebSocket closed by server ({code}): {reason}"),
            Self::ClosedByServer { code: None, .. } => write!(f, "WebSocket closed by server"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::Lagged { count } => write!(f, "Event stream lagged, missed {count} messages"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::Handshake(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<WsError> for Error {
    fn from(e: WsError) -> Self {
        Error::with_source(Kind::WebSocket, e)
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        WsError::Connection(e).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_error_keeps_source() {
        let error: Error = WsError::Handshake(Arc::new(tungstenite::Error::ConnectionClosed)).into();

        assert_eq!(error.kind(), Kind::WebSocket);
        let ws = error.websocket().unwrap();
        assert!(matches!(ws, WsError::Handshake(_)));
        assert!(ws.source().is_some());
    }

    #[test]
    fn server_close_display() {
        let with_code = WsError::ClosedByServer {
            code: Some(4001),
            reason: "token expired".to_owned(),
        };
        let without = WsError::ClosedByServer {
            code: None,
            reason: String::new(),
        };

        assert_eq!(
            with_code.to_string(),
            "WebSocket closed by server (4001): token expired"
        );
        assert_eq!(without.to_string(), "WebSocket closed by server");
    }

    #[test]
    fn lagged_display_reports_count() {
        assert_eq!(
            WsError::Lagged { count: 7 }.to_string(),
            "Event stream lagged, missed 7 messages"
        );
    }
}
