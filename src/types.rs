//! Types shared by the notification and direct-message channels.

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Timestamp type used in payloads, re-exported so users don't need `chrono` in their
/// `Cargo.toml`.
pub use chrono::{DateTime, Utc};

pub type UserId = i64;

/// The fields of a user the realtime server embeds in its payloads.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct UserSummary {
    pub id: UserId,
    #[builder(into)]
    pub username: String,
    #[serde(default, alias = "profile_picture_url")]
    #[builder(into)]
    pub avatar_url: Option<String>,
}
