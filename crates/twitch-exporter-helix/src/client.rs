use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use tracing::debug;
use twitch_exporter_common::error::{ExporterError, Result};

use crate::{
    api::HelixApi,
    types::{
        Chatter, Clip, ClipsParams, Envelope, ErrorBody, Follower, Game, HelixResponse, RateLimit,
        Stream, StreamsParams, Subscription, User,
    },
};

pub const DEFAULT_BASE_URL: &str = "https://api.twitch.tv/helix";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const HEADER_RATELIMIT_LIMIT: &str = "ratelimit-limit";
const HEADER_RATELIMIT_REMAINING: &str = "ratelimit-remaining";
const HEADER_RATELIMIT_RESET: &str = "ratelimit-reset";

type Query = Vec<(&'static str, String)>;

#[derive(Clone)]
pub struct HelixClient {
    base_url: String,
    client_id: String,
    access_token: String,
    client: reqwest::Client,
}

impl HelixClient {
    pub fn new(client_id: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                ExporterError::InternalError(format!("failed to create helix client: {err}"))
            })?;

        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: client_id.into(),
            access_token: access_token.into(),
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &Query) -> Result<HelixResponse<T>> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let response = self
            .client
            .get(&url)
            .header("Client-Id", &self.client_id)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(|err| ExporterError::Transport(format!("GET {url}: {err}")))?;

        let status = response.status().as_u16();
        let rate_limit = parse_rate_limit(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|err| ExporterError::Transport(format!("GET {url}: {err}")))?;

        debug!(path, status, "helix response");
        decode_response(status, rate_limit, &body)
    }
}

#[async_trait]
impl HelixApi for HelixClient {
    async fn get_users(&self, logins: &[String]) -> Result<HelixResponse<User>> {
        let query = logins.iter().map(|login| ("login", login.clone())).collect();
        self.get("users", &query).await
    }

    async fn get_streams(&self, params: &StreamsParams) -> Result<HelixResponse<Stream>> {
        let mut query: Query = Vec::new();
        query.extend(params.user_logins.iter().map(|login| ("user_login", login.clone())));
        query.extend(params.game_ids.iter().map(|id| ("game_id", id.clone())));
        if let Some(first) = params.first {
            query.push(("first", first.to_string()));
        }
        if let Some(stream_type) = &params.stream_type {
            query.push(("type", stream_type.clone()));
        }
        if let Some(after) = &params.after {
            query.push(("after", after.clone()));
        }
        self.get("streams", &query).await
    }

    async fn get_channel_follows(&self, broadcaster_id: &str) -> Result<HelixResponse<Follower>> {
        // only `total` is read, so one follower per page is enough
        let query = vec![
            ("broadcaster_id", broadcaster_id.to_string()),
            ("first", "1".to_string()),
        ];
        self.get("channels/followers", &query).await
    }

    async fn get_subscriptions(
        &self,
        broadcaster_id: &str,
        after: Option<&str>,
    ) -> Result<HelixResponse<Subscription>> {
        let mut query = vec![
            ("broadcaster_id", broadcaster_id.to_string()),
            ("first", "100".to_string()),
        ];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        self.get("subscriptions", &query).await
    }

    async fn get_clips(&self, params: &ClipsParams) -> Result<HelixResponse<Clip>> {
        let mut query = vec![
            ("broadcaster_id", params.broadcaster_id.clone()),
            ("first", params.first.to_string()),
            ("started_at", params.started_at.to_rfc3339()),
        ];
        if let Some(after) = &params.after {
            query.push(("after", after.clone()));
        }
        self.get("clips", &query).await
    }

    async fn get_top_games(&self, first: usize) -> Result<HelixResponse<Game>> {
        let query = vec![("first", first.to_string())];
        self.get("games/top", &query).await
    }

    async fn get_channel_chat_chatters(
        &self,
        broadcaster_id: &str,
        moderator_id: &str,
    ) -> Result<HelixResponse<Chatter>> {
        let query = vec![
            ("broadcaster_id", broadcaster_id.to_string()),
            ("moderator_id", moderator_id.to_string()),
            ("first", "1".to_string()),
        ];
        self.get("chat/chatters", &query).await
    }

    async fn get_games(&self, ids: &[String]) -> Result<HelixResponse<Game>> {
        let query = ids.iter().map(|id| ("id", id.clone())).collect();
        self.get("games", &query).await
    }
}

pub fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimit> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
    };

    Some(RateLimit {
        limit: read(HEADER_RATELIMIT_LIMIT)?.parse().ok()?,
        remaining: read(HEADER_RATELIMIT_REMAINING)?.parse().ok()?,
        reset: read(HEADER_RATELIMIT_RESET)?.parse().ok()?,
    })
}

pub(crate) fn decode_response<T: DeserializeOwned>(
    status: u16,
    rate_limit: Option<RateLimit>,
    body: &[u8],
) -> Result<HelixResponse<T>> {
    if !(200..300).contains(&status) {
        let message = match serde_json::from_slice::<ErrorBody>(body) {
            Ok(error) if !error.message.is_empty() => error.message,
            Ok(error) if !error.error.is_empty() => error.error,
            _ => String::from_utf8_lossy(body).trim().to_string(),
        };
        let mut response = HelixResponse::failed(status, message);
        response.rate_limit = rate_limit;
        return Ok(response);
    }

    let envelope: Envelope<T> = serde_json::from_slice(body)
        .map_err(|err| ExporterError::Decode(format!("helix response body: {err}")))?;

    let mut response = HelixResponse::ok(envelope.data)
        .with_cursor(envelope.pagination.and_then(|p| p.cursor).unwrap_or_default());
    response.total = envelope.total;
    response.rate_limit = rate_limit;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, extract::RawQuery, http::HeaderMap as AxumHeaders, routing::get};
    use reqwest::header::{HeaderMap, HeaderValue};

    use super::{HelixClient, decode_response, parse_rate_limit};
    use crate::{
        api::HelixApi,
        types::{Chatter, Stream},
    };

    async fn stub_users(
        headers: AxumHeaders,
        RawQuery(query): RawQuery,
    ) -> (AxumHeaders, Json<serde_json::Value>) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        let mut response = AxumHeaders::new();
        response.insert("ratelimit-limit", "800".parse().unwrap());
        response.insert("ratelimit-remaining", "2".parse().unwrap());
        response.insert("ratelimit-reset", "1700000005".parse().unwrap());
        let body = serde_json::json!({"data": [{
            "id": "1",
            "login": query.unwrap_or_default(),
            "display_name": header("client-id"),
            "broadcaster_type": header("authorization"),
        }]});
        (response, Json(body))
    }

    #[tokio::test]
    async fn requests_go_to_configured_base_url_with_credentials() {
        let app = Router::new().route("/helix/users", get(stub_users));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = HelixClient::new("client", "token")
            .unwrap()
            .with_base_url(format!("http://{address}/helix/"));
        let response = client
            .get_users(&["foo".to_string()])
            .await
            .unwrap()
            .ensure_success()
            .unwrap();

        let user = &response.data[0];
        assert_eq!(user.login, "login=foo");
        assert_eq!(user.display_name, "client");
        assert_eq!(user.broadcaster_type, "Bearer token");
        let rate = response.rate_limit.expect("rate limit");
        assert_eq!(rate.remaining, 2);
        assert_eq!(rate.reset_at().map(|at| at.timestamp()), Some(1_700_000_005));
    }

    #[test]
    fn rate_limit_headers_are_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert("Ratelimit-Limit", HeaderValue::from_static("800"));
        headers.insert("Ratelimit-Remaining", HeaderValue::from_static("3"));
        headers.insert("Ratelimit-Reset", HeaderValue::from_static("1700000005"));

        let rate = parse_rate_limit(&headers).expect("rate limit");
        assert_eq!(rate.limit, 800);
        assert_eq!(rate.remaining, 3);
        assert_eq!(rate.reset, 1_700_000_005);
    }

    #[test]
    fn missing_rate_limit_header_yields_none() {
        let mut headers = HeaderMap::new();
        headers.insert("Ratelimit-Limit", HeaderValue::from_static("800"));
        assert!(parse_rate_limit(&headers).is_none());
    }

    #[test]
    fn success_body_keeps_cursor_and_total() {
        let body = br#"{
            "data": [{"user_id": "1", "user_login": "a"}],
            "pagination": {"cursor": "abc"},
            "total": 42
        }"#;

        let response = decode_response::<Chatter>(200, None, body).expect("decode");
        assert_eq!(response.data.len(), 1);
        assert_eq!(response.cursor.as_deref(), Some("abc"));
        assert_eq!(response.total, Some(42));
    }

    #[test]
    fn stream_payload_decodes() {
        let body = br#"{"data": [{
            "id": "123", "user_id": "9", "user_login": "foo", "user_name": "Foo",
            "game_id": "33214", "game_name": "Fortnite", "type": "live",
            "title": "hi", "viewer_count": 78, "started_at": "2024-02-01T10:00:00Z"
        }], "pagination": {}}"#;

        let response = decode_response::<Stream>(200, None, body).expect("decode");
        let stream = &response.data[0];
        assert_eq!(stream.user_login, "foo");
        assert_eq!(stream.viewer_count, 78);
        assert_eq!(stream.stream_type, "live");
        assert!(response.cursor.is_none());
    }

    #[test]
    fn error_body_message_is_kept_without_failing_decode() {
        let body = br#"{"error": "Unauthorized", "status": 401, "message": "Invalid OAuth token"}"#;

        let response = decode_response::<Stream>(401, None, body).expect("decode");
        assert_eq!(response.status, 401);
        assert_eq!(response.error_message.as_deref(), Some("Invalid OAuth token"));
        assert!(response.ensure_success().is_err());
    }
}
