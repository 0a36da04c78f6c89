use serde::{Deserialize, Serialize};

pub const CHANNEL_CHAT_MESSAGE: &str = "channel.chat.message";

pub const HEADER_MESSAGE_ID: &str = "twitch-eventsub-message-id";
pub const HEADER_MESSAGE_TIMESTAMP: &str = "twitch-eventsub-message-timestamp";
pub const HEADER_MESSAGE_SIGNATURE: &str = "twitch-eventsub-message-signature";
pub const HEADER_MESSAGE_TYPE: &str = "twitch-eventsub-message-type";

pub const MESSAGE_TYPE_VERIFICATION: &str = "webhook_callback_verification";
pub const MESSAGE_TYPE_NOTIFICATION: &str = "notification";
pub const MESSAGE_TYPE_REVOCATION: &str = "revocation";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub cost: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcaster_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Body of a `notification` message. The event payload is kept raw so each
/// listener decodes the shape it subscribed to.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationBody {
    pub subscription: SubscriptionInfo,
    pub event: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerificationBody {
    pub challenge: String,
    pub subscription: SubscriptionInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevocationBody {
    pub subscription: SubscriptionInfo,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelChatMessageEvent {
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    #[serde(default)]
    pub broadcaster_user_name: String,
    pub chatter_user_id: String,
    pub chatter_user_login: String,
    #[serde(default)]
    pub chatter_user_name: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub message: ChatMessage,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub badges: Vec<Badge>,
    #[serde(default)]
    pub message_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub fragments: Vec<Fragment>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Fragment {
    #[serde(rename = "type")]
    pub fragment_type: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Badge {
    pub set_id: String,
    pub id: String,
    #[serde(default)]
    pub info: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SubscriptionRequest<'a> {
    #[serde(rename = "type")]
    pub event_type: &'a str,
    pub version: &'a str,
    pub condition: &'a Condition,
    pub transport: WebhookTransport<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WebhookTransport<'a> {
    pub method: &'static str,
    pub callback: &'a str,
    pub secret: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AppTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
}
