use std::sync::Arc;

use async_trait::async_trait;
use twitch_exporter_common::error::Result;

use crate::{
    collector::{Collector, CollectorContext, CollectorFactory, registry::factory_fn},
    metrics::{MetricDescriptor, SampleBuffer},
};

pub const NAME: &str = "channel_viewers_total";

pub fn factory() -> CollectorFactory {
    factory_fn(|context| async move { Ok(ChannelViewersCollector::new(context)) })
}

pub struct ChannelViewersCollector {
    context: CollectorContext,
    channel_viewers: Arc<MetricDescriptor>,
}

impl ChannelViewersCollector {
    pub fn new(context: CollectorContext) -> Self {
        Self {
            context,
            channel_viewers: MetricDescriptor::gauge(
                NAME,
                "How many viewers on this live channel.",
                &["username", "game"],
            ),
        }
    }
}

#[async_trait]
impl Collector for ChannelViewersCollector {
    async fn update(&self, buffer: &mut SampleBuffer) -> Result<()> {
        self.context.ensure_channels()?;

        for stream in self.context.live_streams().await? {
            let game = self.context.game_label(&stream).await;
            buffer.push(
                &self.channel_viewers,
                stream.viewer_count as f64,
                &[&stream.user_login, &game],
            );
        }
        Ok(())
    }
}
