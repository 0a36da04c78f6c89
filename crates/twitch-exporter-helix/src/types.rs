use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use twitch_exporter_common::error::{ExporterError, Result};

/// Helix caps `login`, `user_login` and `id` query parameters at 100 values.
pub const MAX_IDS_PER_REQUEST: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub broadcaster_type: String,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(rename = "type", default)]
    pub stream_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewer_count: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Follower {
    pub user_id: String,
    #[serde(default)]
    pub user_login: String,
    #[serde(default)]
    pub followed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: String,
    pub tier: String,
    #[serde(default)]
    pub is_gift: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chatter {
    pub user_id: String,
    pub user_login: String,
}

/// Rate-limit budget reported by the `Ratelimit-*` headers of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp (seconds) at which the bucket is refilled.
    pub reset: i64,
}

impl RateLimit {
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.reset, 0).single()
    }
}

/// One Helix call's outcome as seen by the transport: the HTTP status, the
/// remote error text when there is one, and the decoded payload.
///
/// A response with a non-2xx status is still a value here; callers turn it
/// into an error with [`HelixResponse::ensure_success`].
#[derive(Debug, Clone, PartialEq)]
pub struct HelixResponse<T> {
    pub status: u16,
    pub error_message: Option<String>,
    pub data: Vec<T>,
    pub cursor: Option<String>,
    pub total: Option<u64>,
    pub rate_limit: Option<RateLimit>,
}

impl<T> HelixResponse<T> {
    pub fn ok(data: Vec<T>) -> Self {
        Self {
            status: 200,
            error_message: None,
            data,
            cursor: None,
            total: None,
            rate_limit: None,
        }
    }

    pub fn failed(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            error_message: Some(message.into()),
            data: Vec::new(),
            cursor: None,
            total: None,
            rate_limit: None,
        }
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        let cursor = cursor.into();
        self.cursor = if cursor.is_empty() { None } else { Some(cursor) };
        self
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn ensure_success(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }

        Err(ExporterError::Api {
            status: self.status,
            message: self
                .error_message
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| "no error message returned".to_string()),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamsParams {
    pub user_logins: Vec<String>,
    pub game_ids: Vec<String>,
    pub first: Option<usize>,
    /// `live` or `all`; Helix defaults to `all`.
    pub stream_type: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClipsParams {
    pub broadcaster_id: String,
    pub first: usize,
    pub after: Option<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Pagination {
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}
