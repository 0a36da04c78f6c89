use std::{
    collections::HashMap,
    mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use twitch_exporter_eventsub::{ChannelChatMessageEvent, EventReceiver};

/// Chat messages seen per channel since the last drain.
#[derive(Debug, Default)]
pub struct ChatMessageCounter {
    counts: Mutex<HashMap<String, u64>>,
}

impl ChatMessageCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, identity: &str) {
        *self.lock().entry(identity.to_string()).or_default() += 1;
    }

    /// Takes every count accumulated so far and leaves the counter empty.
    /// Increments racing the drain land either in the returned map or in the
    /// next one, never in both.
    pub fn drain_and_reset(&self) -> HashMap<String, u64> {
        mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Feeds `channel.chat.message` events into the counter until the sending
/// side is dropped.
pub fn spawn_chat_ingest(counter: Arc<ChatMessageCounter>, mut events: EventReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(raw) = events.recv().await {
            match serde_json::from_value::<ChannelChatMessageEvent>(raw) {
                Ok(event) => counter.increment(&event.broadcaster_user_login),
                Err(err) => warn!(error = %err, "dropping malformed chat message event"),
            }
        }
        debug!("chat message ingest stopped");
    })
}
