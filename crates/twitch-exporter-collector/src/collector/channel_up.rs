use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use twitch_exporter_common::error::Result;

use crate::{
    collector::{Collector, CollectorContext, CollectorFactory, registry::factory_fn},
    metrics::{MetricDescriptor, SampleBuffer},
};

pub const NAME: &str = "channel_up";

pub fn factory() -> CollectorFactory {
    factory_fn(|context| async move { Ok(ChannelUpCollector::new(context)) })
}

/// 1 for every watched channel that is live, 0 for every other channel that
/// exists on Twitch.
pub struct ChannelUpCollector {
    context: CollectorContext,
    channel_up: Arc<MetricDescriptor>,
}

impl ChannelUpCollector {
    pub fn new(context: CollectorContext) -> Self {
        Self {
            context,
            channel_up: MetricDescriptor::gauge(NAME, "Is the channel live.", &["username", "game"]),
        }
    }
}

#[async_trait]
impl Collector for ChannelUpCollector {
    async fn update(&self, buffer: &mut SampleBuffer) -> Result<()> {
        self.context.ensure_channels()?;

        let streams = self.context.live_streams().await?;
        let mut live = HashSet::new();
        for stream in &streams {
            let game = self.context.game_label(stream).await;
            buffer.push(&self.channel_up, 1.0, &[&stream.user_login, &game]);
            live.insert(stream.user_login.as_str());
        }

        let users = self
            .context
            .lookups
            .users_by_login(self.context.channels.as_slice())
            .await?;
        for user in users.iter().filter(|user| !live.contains(user.login.as_str())) {
            buffer.push(&self.channel_up, 0.0, &[&user.login, ""]);
        }

        Ok(())
    }
}
