use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use crate::ws::WsError;

/// Broad category of an [`Error`], for callers that branch on what went wrong.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Kind {
    /// The server URL or a channel path cannot be used
    Endpoint,
    /// A message could not be encoded or an event payload did not have the expected shape
    Serialization,
    /// Opening, using or closing the socket failed
    #[strum(serialize = "websocket")]
    WebSocket,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub(crate) fn invalid_endpoint<U, R>(url: U, reason: R) -> Self
    where
        U: Into<String>,
        R: Into<String>,
    {
        InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
        .into()
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    #[must_use]
    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    /// The socket-level cause, if this is a [`Kind::WebSocket`] error.
    #[must_use]
    pub fn websocket(&self) -> Option<&WsError> {
        self.downcast_ref::<WsError>()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{} error: {src}", self.kind),
            None => write!(f, "{} error", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// A URL that cannot be dialled as a realtime channel.
#[non_exhaustive]
#[derive(Debug)]
pub struct InvalidEndpoint {
    pub url: String,
    pub reason: String,
}

impl fmt::Display for InvalidEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` {}", self.url, self.reason)
    }
}

impl StdError for InvalidEndpoint {}

impl From<InvalidEndpoint> for Error {
    fn from(err: InvalidEndpoint) -> Self {
        Error::with_source(Kind::Endpoint, err)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::Endpoint, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Serialization, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_endpoint_display() {
        let error = Error::invalid_endpoint("https://example.com", "must use ws or wss");

        assert_eq!(error.kind(), Kind::Endpoint);
        assert_eq!(
            error.to_string(),
            "endpoint error: `https://example.com` must use ws or wss"
        );
    }

    #[test]
    fn downcast_should_reach_source() {
        let error = Error::invalid_endpoint("ftp://host", "nope");

        let invalid = error.downcast_ref::<InvalidEndpoint>().unwrap();
        assert_eq!(invalid.url, "ftp://host");
        assert!(error.websocket().is_none());
    }

    #[test]
    fn url_parse_error_is_endpoint() {
        let error: Error = url::Url::parse("not a url").unwrap_err().into();

        assert_eq!(error.kind(), Kind::Endpoint);
    }

    #[test]
    fn websocket_accessor_finds_closed() {
        let error: Error = WsError::ConnectionClosed.into();

        assert_eq!(error.kind(), Kind::WebSocket);
        assert!(matches!(error.websocket(), Some(WsError::ConnectionClosed)));
        assert_eq!(error.to_string(), "websocket error: WebSocket connection closed");
    }
}
