use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use twitch_exporter_common::error::{ExporterError, Result};
use twitch_exporter_eventsub::{CHANNEL_CHAT_MESSAGE, Condition, EventSubClient};

use crate::{
    collector::{Collector, CollectorContext, CollectorFactory, registry::factory_fn},
    counter::{ChatMessageCounter, spawn_chat_ingest},
    metrics::{MetricDescriptor, SampleBuffer},
};

pub const NAME: &str = "channel_chat_messages_total";

pub fn factory() -> CollectorFactory {
    factory_fn(|context| async move {
        let collector = ChannelChatMessagesCollector::new(context)?;
        collector.subscribe().await;
        Ok(collector)
    })
}

/// Chat messages received over EventSub since the previous scrape.
pub struct ChannelChatMessagesCollector {
    context: CollectorContext,
    eventsub: Arc<EventSubClient>,
    counter: Arc<ChatMessageCounter>,
    channel_chat_messages: Arc<MetricDescriptor>,
}

impl ChannelChatMessagesCollector {
    /// Registers the chat listener and starts the ingest task. Fails with
    /// `PrerequisiteNotConfigured` when EventSub is not enabled.
    pub fn new(context: CollectorContext) -> Result<Self> {
        let eventsub = context
            .eventsub
            .clone()
            .ok_or_else(|| ExporterError::PrerequisiteNotConfigured("eventsub".to_string()))?;

        let counter = Arc::new(ChatMessageCounter::new());
        let events = eventsub.on(CHANNEL_CHAT_MESSAGE)?;
        spawn_chat_ingest(Arc::clone(&counter), events);

        Ok(Self {
            context,
            eventsub,
            counter,
            channel_chat_messages: MetricDescriptor::gauge(
                NAME,
                "The number of chat messages sent in a channel.",
                &["username"],
            ),
        })
    }

    /// Creates a `channel.chat.message` subscription per resolvable channel.
    /// Failures are logged; the listener stays registered either way.
    pub async fn subscribe(&self) {
        if let Err(err) = self
            .context
            .identities
            .resolve(&self.context.lookups, &self.context.channels)
            .await
        {
            warn!(collector = NAME, error = %err, "could not resolve channel ids for eventsub");
        }

        for login in &self.context.channels {
            let Some(id) = self.context.identities.get(login) else {
                continue;
            };
            let condition = Condition {
                broadcaster_user_id: Some(id.clone()),
                user_id: Some(id),
            };
            match self.eventsub.subscribe(CHANNEL_CHAT_MESSAGE, "1", &condition).await {
                Ok(()) => info!(collector = NAME, login = %login, "subscribed to chat messages"),
                Err(err) => {
                    warn!(collector = NAME, login = %login, error = %err, "chat message subscription failed")
                }
            }
        }
    }
}

#[async_trait]
impl Collector for ChannelChatMessagesCollector {
    async fn update(&self, buffer: &mut SampleBuffer) -> Result<()> {
        self.context.ensure_channels()?;

        let mut counts = self.counter.drain_and_reset();
        for login in &self.context.channels {
            let count = counts.remove(login.as_str()).unwrap_or_default();
            buffer.push(&self.channel_chat_messages, count as f64, &[login]);
        }
        if !counts.is_empty() {
            debug!(collector = NAME, channels = counts.len(), "dropping counts for unwatched channels");
        }
        Ok(())
    }
}
