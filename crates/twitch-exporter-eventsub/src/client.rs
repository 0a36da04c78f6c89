use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use http::HeaderMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use twitch_exporter_common::{
    error::{ExporterError, Result},
    time::{Clock, system_clock},
};

use crate::{
    signature::verify_signature,
    types::{
        AppTokenResponse, Condition, ErrorBody, HEADER_MESSAGE_ID, HEADER_MESSAGE_SIGNATURE,
        HEADER_MESSAGE_TIMESTAMP, HEADER_MESSAGE_TYPE, MESSAGE_TYPE_NOTIFICATION,
        MESSAGE_TYPE_REVOCATION, MESSAGE_TYPE_VERIFICATION, NotificationBody, RevocationBody,
        SubscriptionRequest, VerificationBody, WebhookTransport,
    },
};

pub const DEFAULT_HELIX_URL: &str = "https://api.twitch.tv/helix";
pub const DEFAULT_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
pub const MAX_MESSAGE_AGE_SECS: i64 = 10 * 60;

const RECENT_MESSAGE_CAPACITY: usize = 1_024;
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

pub type EventReceiver = mpsc::UnboundedReceiver<serde_json::Value>;

#[derive(Debug, Clone)]
pub struct EventSubConfig {
    pub client_id: String,
    pub client_secret: String,
    pub webhook_url: String,
    pub webhook_secret: String,
}

impl EventSubConfig {
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(ExporterError::InvalidConfig(
                "eventsub requires a client id".to_string(),
            ));
        }
        if self.client_secret.trim().is_empty() {
            return Err(ExporterError::InvalidConfig(
                "eventsub requires a client secret".to_string(),
            ));
        }
        if !self.webhook_url.starts_with("https://") {
            return Err(ExporterError::InvalidConfig(
                "eventsub webhook url must be an https url".to_string(),
            ));
        }
        // Twitch rejects secrets outside 10..=100 ASCII characters
        let secret_len = self.webhook_secret.len();
        if !(10..=100).contains(&secret_len) || !self.webhook_secret.is_ascii() {
            return Err(ExporterError::InvalidConfig(
                "eventsub webhook secret must be 10 to 100 ascii characters".to_string(),
            ));
        }
        Ok(())
    }
}

/// What a verified webhook delivery turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Subscription handshake; the challenge must be echoed back as plain text.
    Challenge(String),
    Notification { event_type: String, listeners: usize },
    Revocation { event_type: String, status: String },
    /// Twitch retried a message that was already handled.
    Duplicate,
    Ignored(String),
}

#[derive(Debug, Clone)]
struct AppToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// EventSub webhook endpoint and subscription manager.
///
/// Deliveries are verified, de-duplicated by message id and handed to every
/// listener registered for the event type through an unbounded channel, so
/// the HTTP handler never waits on a consumer.
pub struct EventSubClient {
    config: EventSubConfig,
    helix_url: String,
    token_url: String,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    listeners: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<serde_json::Value>>>>,
    recent: Mutex<VecDeque<String>>,
    app_token: tokio::sync::Mutex<Option<AppToken>>,
}

impl EventSubClient {
    pub fn new(config: EventSubConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| {
                ExporterError::InternalError(format!("failed to create eventsub client: {err}"))
            })?;

        Ok(Self {
            config,
            helix_url: DEFAULT_HELIX_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            http,
            clock: system_clock(),
            listeners: Mutex::new(HashMap::new()),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_MESSAGE_CAPACITY)),
            app_token: tokio::sync::Mutex::new(None),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_endpoints(mut self, helix_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.helix_url = helix_url.into().trim_end_matches('/').to_string();
        self.token_url = token_url.into();
        self
    }

    pub fn config(&self) -> &EventSubConfig {
        &self.config
    }

    /// Registers a listener for `event_type`. Events arrive as the raw
    /// `event` object of each notification.
    pub fn on(&self, event_type: &str) -> Result<EventReceiver> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.listeners_lock()?
            .entry(event_type.to_string())
            .or_default()
            .push(sender);
        Ok(receiver)
    }

    pub fn handle_delivery(&self, headers: &HeaderMap, body: &[u8]) -> Result<Delivery> {
        let message_id = required_header(headers, HEADER_MESSAGE_ID)?;
        let timestamp = required_header(headers, HEADER_MESSAGE_TIMESTAMP)?;
        let signature = required_header(headers, HEADER_MESSAGE_SIGNATURE)?;
        let message_type = required_header(headers, HEADER_MESSAGE_TYPE)?;

        if !verify_signature(&self.config.webhook_secret, message_id, timestamp, body, signature) {
            return Err(ExporterError::Signature);
        }

        let sent_at = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|err| {
                ExporterError::InvalidArgument(format!("invalid message timestamp {timestamp}: {err}"))
            })?
            .with_timezone(&Utc);
        let age = self.clock.now().signed_duration_since(sent_at);
        if age.num_seconds() > MAX_MESSAGE_AGE_SECS {
            return Err(ExporterError::InvalidArgument(format!(
                "message {message_id} is {}s old",
                age.num_seconds()
            )));
        }

        if !self.remember_message(message_id)? {
            debug!(message_id, "duplicate eventsub delivery");
            return Ok(Delivery::Duplicate);
        }

        match message_type {
            MESSAGE_TYPE_VERIFICATION => {
                let body: VerificationBody = decode(body)?;
                info!(
                    event_type = %body.subscription.event_type,
                    subscription_id = %body.subscription.id,
                    "eventsub subscription verified"
                );
                Ok(Delivery::Challenge(body.challenge))
            }
            MESSAGE_TYPE_NOTIFICATION => {
                let body: NotificationBody = decode(body)?;
                let event_type = body.subscription.event_type;
                let listeners = self.dispatch(&event_type, body.event)?;
                Ok(Delivery::Notification {
                    event_type,
                    listeners,
                })
            }
            MESSAGE_TYPE_REVOCATION => {
                let body: RevocationBody = decode(body)?;
                warn!(
                    event_type = %body.subscription.event_type,
                    status = %body.subscription.status,
                    "eventsub subscription revoked"
                );
                Ok(Delivery::Revocation {
                    event_type: body.subscription.event_type,
                    status: body.subscription.status,
                })
            }
            other => {
                warn!(message_type = other, "unknown eventsub message type");
                Ok(Delivery::Ignored(other.to_string()))
            }
        }
    }

    /// Creates a webhook subscription. An already existing subscription for
    /// the same type and condition counts as success.
    pub async fn subscribe(&self, event_type: &str, version: &str, condition: &Condition) -> Result<()> {
        let token = self.app_access_token().await?;
        let url = format!("{}/eventsub/subscriptions", self.helix_url);
        let request = SubscriptionRequest {
            event_type,
            version,
            condition,
            transport: WebhookTransport {
                method: "webhook",
                callback: &self.config.webhook_url,
                secret: &self.config.webhook_secret,
            },
        };

        let response = self
            .http
            .post(&url)
            .header("Client-Id", &self.config.client_id)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|err| ExporterError::Transport(format!("POST {url}: {err}")))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::CONFLICT {
            debug!(event_type, status = status.as_u16(), "eventsub subscription requested");
            return Ok(());
        }

        Err(ExporterError::Api {
            status: status.as_u16(),
            message: error_message(response).await,
        })
    }

    async fn app_access_token(&self) -> Result<String> {
        let mut cached = self.app_token.lock().await;
        let now = self.clock.now();
        if let Some(token) = cached.as_ref()
            && token.expires_at > now + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS)
        {
            return Ok(token.access_token.clone());
        }

        let response = self
            .http
            .post(&self.token_url)
            .query(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|err| ExporterError::Transport(format!("app token request: {err}")))?;

        if !response.status().is_success() {
            return Err(ExporterError::Api {
                status: response.status().as_u16(),
                message: error_message(response).await,
            });
        }

        let body: AppTokenResponse = response
            .json()
            .await
            .map_err(|err| ExporterError::Decode(format!("app token response: {err}")))?;

        let token = AppToken {
            access_token: body.access_token.clone(),
            expires_at: now + chrono::Duration::seconds(body.expires_in.max(0)),
        };
        *cached = Some(token);
        Ok(body.access_token)
    }

    fn dispatch(&self, event_type: &str, event: serde_json::Value) -> Result<usize> {
        let mut listeners = self.listeners_lock()?;
        let Some(senders) = listeners.get_mut(event_type) else {
            warn!(event_type, "no listener registered for eventsub event");
            return Ok(0);
        };

        senders.retain(|sender| sender.send(event.clone()).is_ok());
        Ok(senders.len())
    }

    fn remember_message(&self, message_id: &str) -> Result<bool> {
        let mut recent = self
            .recent
            .lock()
            .map_err(|_| ExporterError::InternalError("eventsub message log poisoned".to_string()))?;

        if recent.iter().any(|seen| seen == message_id) {
            return Ok(false);
        }
        if recent.len() == RECENT_MESSAGE_CAPACITY {
            recent.pop_front();
        }
        recent.push_back(message_id.to_string());
        Ok(true)
    }

    fn listeners_lock(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, Vec<mpsc::UnboundedSender<serde_json::Value>>>>> {
        self.listeners
            .lock()
            .map_err(|_| ExporterError::InternalError("eventsub listeners poisoned".to_string()))
    }
}

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ExporterError::InvalidArgument(format!("missing header {name}")))
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|err| ExporterError::InvalidArgument(format!("malformed eventsub payload: {err}")))
}

async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) if !body.message.is_empty() => body.message,
        _ => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU16, AtomicUsize, Ordering},
    };

    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use chrono::{Duration, TimeZone, Utc};
    use http::{HeaderMap, HeaderValue};
    use twitch_exporter_common::{ExporterError, ManualClock};

    use super::{Delivery, EventSubClient, EventSubConfig};
    use crate::{
        signature::compute_signature,
        types::{CHANNEL_CHAT_MESSAGE, Condition},
    };

    const SECRET: &str = "s3cre7-webhook-secret";
    const SENT_AT: &str = "2024-05-01T12:00:00Z";

    fn client() -> EventSubClient {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 30).unwrap(),
        ));
        EventSubClient::new(EventSubConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            webhook_url: "https://exporter.example.com/eventsub".to_string(),
            webhook_secret: SECRET.to_string(),
        })
        .expect("client")
        .with_clock(clock)
    }

    fn headers(message_id: &str, message_type: &str, timestamp: &str, body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let signature = compute_signature(SECRET, message_id, timestamp, body);
        headers.insert("Twitch-Eventsub-Message-Id", HeaderValue::from_str(message_id).unwrap());
        headers.insert(
            "Twitch-Eventsub-Message-Timestamp",
            HeaderValue::from_str(timestamp).unwrap(),
        );
        headers.insert(
            "Twitch-Eventsub-Message-Signature",
            HeaderValue::from_str(&signature).unwrap(),
        );
        headers.insert(
            "Twitch-Eventsub-Message-Type",
            HeaderValue::from_str(message_type).unwrap(),
        );
        headers
    }

    fn chat_notification(broadcaster: &str) -> Vec<u8> {
        serde_json::json!({
            "subscription": {"id": "sub", "type": CHANNEL_CHAT_MESSAGE, "version": "1", "status": "enabled"},
            "event": {
                "broadcaster_user_id": "1",
                "broadcaster_user_login": broadcaster,
                "chatter_user_id": "2",
                "chatter_user_login": "viewer",
                "message": {"text": "hello", "fragments": []}
            }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn verification_echoes_challenge() {
        let client = client();
        let body = br#"{"challenge": "pogchamp-kappa-360noscope",
            "subscription": {"type": "channel.chat.message", "status": "webhook_callback_verification_pending"}}"#;

        let delivery = client
            .handle_delivery(&headers("m-1", "webhook_callback_verification", SENT_AT, body), body)
            .expect("delivery");
        assert_eq!(delivery, Delivery::Challenge("pogchamp-kappa-360noscope".to_string()));
    }

    #[tokio::test]
    async fn notification_reaches_listener_once() {
        let client = client();
        let mut receiver = client.on(CHANNEL_CHAT_MESSAGE).expect("listener");
        let body = chat_notification("streamer");
        let headers = headers("m-2", "notification", SENT_AT, &body);

        let first = client.handle_delivery(&headers, &body).expect("delivery");
        assert_eq!(
            first,
            Delivery::Notification {
                event_type: CHANNEL_CHAT_MESSAGE.to_string(),
                listeners: 1
            }
        );
        let retried = client.handle_delivery(&headers, &body).expect("delivery");
        assert_eq!(retried, Delivery::Duplicate);

        let event = receiver.recv().await.expect("event");
        assert_eq!(event["broadcaster_user_login"], "streamer");
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn bad_signature_is_rejected() {
        let client = client();
        let body = chat_notification("streamer");
        let mut headers = headers("m-3", "notification", SENT_AT, &body);
        headers.insert(
            "Twitch-Eventsub-Message-Signature",
            HeaderValue::from_static("sha256=00"),
        );

        assert!(matches!(
            client.handle_delivery(&headers, &body),
            Err(ExporterError::Signature)
        ));
    }

    #[test]
    fn stale_message_is_rejected() {
        let client = client();
        let body = chat_notification("streamer");
        let stale = (Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 30).unwrap() - Duration::minutes(11))
            .to_rfc3339();

        let result = client.handle_delivery(&headers("m-4", "notification", &stale, &body), &body);
        assert!(matches!(result, Err(ExporterError::InvalidArgument(_))));
    }

    #[test]
    fn malformed_notification_is_rejected_not_dispatched() {
        let client = client();
        let _receiver = client.on(CHANNEL_CHAT_MESSAGE).expect("listener");
        let body = b"{\"subscription\": 5}";

        let result = client.handle_delivery(&headers("m-5", "notification", SENT_AT, body), body);
        assert!(matches!(result, Err(ExporterError::InvalidArgument(_))));
    }

    #[test]
    fn closed_listeners_are_dropped() {
        let client = client();
        drop(client.on(CHANNEL_CHAT_MESSAGE).expect("listener"));
        let body = chat_notification("streamer");

        let delivery = client
            .handle_delivery(&headers("m-6", "notification", SENT_AT, &body), &body)
            .expect("delivery");
        assert_eq!(
            delivery,
            Delivery::Notification {
                event_type: CHANNEL_CHAT_MESSAGE.to_string(),
                listeners: 0
            }
        );
    }

    struct TwitchStub {
        token_requests: AtomicUsize,
        subscription_status: AtomicU16,
        bearer: std::sync::Mutex<Option<String>>,
    }

    async fn stub_token(State(stub): State<Arc<TwitchStub>>) -> Json<serde_json::Value> {
        stub.token_requests.fetch_add(1, Ordering::SeqCst);
        Json(serde_json::json!({"access_token": "app-token", "expires_in": 3600, "token_type": "bearer"}))
    }

    async fn stub_subscribe(
        State(stub): State<Arc<TwitchStub>>,
        headers: HeaderMap,
    ) -> (StatusCode, Json<serde_json::Value>) {
        *stub.bearer.lock().unwrap() = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let status = StatusCode::from_u16(stub.subscription_status.load(Ordering::SeqCst)).unwrap();
        (
            status,
            Json(serde_json::json!({"error": "Error", "status": status.as_u16(), "message": "subscription rejected"})),
        )
    }

    async fn serve_stub(status: u16) -> (Arc<TwitchStub>, String) {
        let stub = Arc::new(TwitchStub {
            token_requests: AtomicUsize::new(0),
            subscription_status: AtomicU16::new(status),
            bearer: std::sync::Mutex::new(None),
        });
        let app = Router::new()
            .route("/oauth2/token", post(stub_token))
            .route("/helix/eventsub/subscriptions", post(stub_subscribe))
            .with_state(Arc::clone(&stub));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (stub, format!("http://{address}"))
    }

    fn condition() -> Condition {
        Condition {
            broadcaster_user_id: Some("1".to_string()),
            user_id: Some("1".to_string()),
        }
    }

    #[tokio::test]
    async fn subscribe_reuses_cached_app_token() {
        let (stub, base) = serve_stub(202).await;
        let client = client().with_endpoints(format!("{base}/helix"), format!("{base}/oauth2/token"));

        client.subscribe(CHANNEL_CHAT_MESSAGE, "1", &condition()).await.unwrap();
        client.subscribe(CHANNEL_CHAT_MESSAGE, "1", &condition()).await.unwrap();

        assert_eq!(stub.token_requests.load(Ordering::SeqCst), 1);
        assert_eq!(stub.bearer.lock().unwrap().as_deref(), Some("Bearer app-token"));
    }

    #[tokio::test]
    async fn expired_app_token_is_refreshed() {
        let (stub, base) = serve_stub(202).await;
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 30).unwrap(),
        ));
        let client = client()
            .with_clock(clock.clone())
            .with_endpoints(format!("{base}/helix"), format!("{base}/oauth2/token"));

        client.subscribe(CHANNEL_CHAT_MESSAGE, "1", &condition()).await.unwrap();
        clock.advance(Duration::hours(1));
        client.subscribe(CHANNEL_CHAT_MESSAGE, "1", &condition()).await.unwrap();

        assert_eq!(stub.token_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn existing_subscription_counts_as_success() {
        let (_stub, base) = serve_stub(409).await;
        let client = client().with_endpoints(format!("{base}/helix"), format!("{base}/oauth2/token"));

        assert!(client.subscribe(CHANNEL_CHAT_MESSAGE, "1", &condition()).await.is_ok());
    }

    #[tokio::test]
    async fn rejected_subscription_carries_remote_message() {
        let (_stub, base) = serve_stub(500).await;
        let client = client().with_endpoints(format!("{base}/helix"), format!("{base}/oauth2/token"));

        let result = client.subscribe(CHANNEL_CHAT_MESSAGE, "1", &condition()).await;
        assert!(matches!(
            result,
            Err(ExporterError::Api { status: 500, message }) if message == "subscription rejected"
        ));
    }

    #[test]
    fn short_webhook_secret_is_invalid_config() {
        let config = EventSubConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            webhook_url: "https://exporter.example.com/eventsub".to_string(),
            webhook_secret: "short".to_string(),
        };
        assert!(matches!(config.validate(), Err(ExporterError::InvalidConfig(_))));
    }
}
