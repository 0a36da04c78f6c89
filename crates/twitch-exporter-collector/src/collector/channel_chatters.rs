use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use twitch_exporter_common::error::Result;

use crate::{
    collector::{Collector, CollectorContext, CollectorFactory, fan_out, registry::factory_fn},
    metrics::{MetricDescriptor, SampleBuffer},
};

pub const NAME: &str = "channel_chatters_total";

pub fn factory() -> CollectorFactory {
    factory_fn(|context| async move { Ok(ChannelChattersCollector::new(context).await) })
}

/// Chatters currently connected to each channel. Helix only accepts ids
/// here, and the token must belong to a moderator; the broadcaster is used as
/// its own moderator.
pub struct ChannelChattersCollector {
    context: CollectorContext,
    channel_chatters: Arc<MetricDescriptor>,
}

impl ChannelChattersCollector {
    pub async fn new(context: CollectorContext) -> Self {
        if let Err(err) = context
            .identities
            .resolve(&context.lookups, &context.channels)
            .await
        {
            warn!(collector = NAME, error = %err, "could not resolve channel ids, retrying on scrape");
        }

        Self {
            context,
            channel_chatters: MetricDescriptor::gauge(
                NAME,
                "The number of chatters in a channel.",
                &["username"],
            ),
        }
    }
}

#[async_trait]
impl Collector for ChannelChattersCollector {
    async fn update(&self, buffer: &mut SampleBuffer) -> Result<()> {
        self.context.ensure_channels()?;
        self.context
            .identities
            .resolve(&self.context.lookups, &self.context.channels)
            .await?;

        let mut targets = Vec::new();
        for login in &self.context.channels {
            match self.context.identities.get(login) {
                Some(id) => targets.push((login.as_str(), id)),
                None => debug!(collector = NAME, login = %login, "skipping channel without id"),
            }
        }

        let totals = fan_out(targets, |(login, id)| async move {
            let response = self
                .context
                .api
                .get_channel_chat_chatters(&id, &id)
                .await?
                .ensure_success()?;
            Ok((login, response.total.unwrap_or_default()))
        })
        .await?;

        for (login, total) in totals {
            buffer.push(&self.channel_chatters, total as f64, &[login]);
        }
        Ok(())
    }
}
