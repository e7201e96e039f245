#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use bon::Builder;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const BACKOFF_MULTIPLIER: f64 = 2.0;
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Tuning of one connection.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Interval between `{"type":"heartbeat"}` messages while the connection is open
    #[builder(default = HEARTBEAT_INTERVAL)]
    pub heartbeat_interval: Duration,
    /// How long `disconnect` waits for the close frame to be written
    #[builder(default = CLOSE_TIMEOUT)]
    pub close_timeout: Duration,
    #[builder(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// When to retry after a lost connection or a refused attempt.
///
/// The delay before retry `n` (1-based) is `initial_backoff * backoff_multiplier^(n - 1)`,
/// capped at `max_backoff`. No jitter is applied.
///
/// ```rust
/// use std::time::Duration;
///
/// use realtime_client::ws::config::ReconnectConfig;
///
/// let reconnect = ReconnectConfig::default()
///     .with_max_attempts(None)
///     .with_max_backoff(Duration::from_secs(10));
/// assert!(reconnect.allows(u32::MAX));
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Retries allowed in a row before the connection is given up; `None` retries forever
    pub max_attempts: Option<u32>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(MAX_RECONNECT_ATTEMPTS),
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
            backoff_multiplier: BACKOFF_MULTIPLIER,
        }
    }
}

impl ReconnectConfig {
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    #[must_use]
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    #[must_use]
    pub fn with_backoff_multiplier(mut self, backoff_multiplier: f64) -> Self {
        self.backoff_multiplier = backoff_multiplier;
        self
    }

    /// Whether another retry may follow `retries` consecutive ones.
    #[must_use]
    pub fn allows(&self, retries: u32) -> bool {
        self.max_attempts.is_none_or(|max| retries < max)
    }

    /// Delay schedule, restarted with `reset` after every successful open.
    pub(crate) fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_multiplier(self.backoff_multiplier)
            .with_randomization_factor(0.0)
            // The retry budget is counted in attempts, not elapsed time
            .with_max_elapsed_time(None)
            .build()
    }
}
