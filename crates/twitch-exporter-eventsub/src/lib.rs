pub mod client;
pub mod signature;
pub mod types;

pub use client::{Delivery, EventReceiver, EventSubClient, EventSubConfig};
pub use signature::{compute_signature, verify_signature};
pub use types::{CHANNEL_CHAT_MESSAGE, ChannelChatMessageEvent, Condition};
