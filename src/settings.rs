//! Environment-driven settings shared by every channel.

use bon::Builder;
use secrecy::SecretString;
use url::Url;

use crate::Result;
use crate::error::Error;
use crate::ws::config::Config;

/// Base URL of the realtime server, e.g. `wss://api.example.com`.
pub const WS_URL_VAR: &str = "WS_URL";

/// Set to `true` to connect channels as soon as they are created.
pub const ENABLE_WEBSOCKET_VAR: &str = "ENABLE_WEBSOCKET";

/// Access token sent as the `token` query parameter.
pub const ACCESS_TOKEN_VAR: &str = "ACCESS_TOKEN";

pub const DEFAULT_WS_URL: &str = "ws://localhost:8000";

#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Settings {
    /// Scheme, host and port of the realtime server, without a channel path
    #[builder(into, default = DEFAULT_WS_URL.to_owned())]
    pub base_url: String,
    /// Whether channels connect automatically when created
    #[builder(default)]
    pub enabled: bool,
    pub token: Option<SecretString>,
    /// Connection tuning applied to every channel
    #[builder(default)]
    pub connection: Config,
}

impl Default for Settings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Settings {
    /// Read [`WS_URL_VAR`], [`ENABLE_WEBSOCKET_VAR`] and [`ACCESS_TOKEN_VAR`] from the process
    /// environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(WS_URL_VAR)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_WS_URL.to_owned());
        // Only the exact string enables it
        let enabled = lookup(ENABLE_WEBSOCKET_VAR).as_deref() == Some("true");
        let token = lookup(ACCESS_TOKEN_VAR)
            .filter(|token| !token.is_empty())
            .map(SecretString::from);

        let settings = Self::builder()
            .base_url(base_url)
            .enabled(enabled)
            .maybe_token(token)
            .build();
        settings.validate()?;

        Ok(settings)
    }

    /// Full URL of the channel at `path`.
    pub fn endpoint(&self, path: &str) -> Result<String> {
        self.validate()?;
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            Ok(format!("{base}{path}"))
        } else {
            Ok(format!("{base}/{path}"))
        }
    }

    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)?;
        if matches!(url.scheme(), "ws" | "wss") {
            Ok(())
        } else {
            Err(Error::invalid_endpoint(
                url,
                format!("from {WS_URL_VAR} must use the ws or wss scheme"),
            ))
        }
    }
}
