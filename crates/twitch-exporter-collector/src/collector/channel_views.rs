use std::sync::Arc;

use async_trait::async_trait;
use twitch_exporter_common::error::Result;

use crate::{
    collector::{Collector, CollectorContext, CollectorFactory, registry::factory_fn},
    metrics::{MetricDescriptor, SampleBuffer},
};

pub const NAME: &str = "channel_views_total";

pub fn factory() -> CollectorFactory {
    factory_fn(|context| async move { Ok(ChannelViewsCollector::new(context)) })
}

/// View count as reported on the user object, fetched fresh every scrape.
/// The refreshed users also update the identity cache.
pub struct ChannelViewsCollector {
    context: CollectorContext,
    channel_views: Arc<MetricDescriptor>,
}

impl ChannelViewsCollector {
    pub fn new(context: CollectorContext) -> Self {
        Self {
            context,
            channel_views: MetricDescriptor::gauge(
                NAME,
                "The number of view of a channel.",
                &["username"],
            ),
        }
    }
}

#[async_trait]
impl Collector for ChannelViewsCollector {
    async fn update(&self, buffer: &mut SampleBuffer) -> Result<()> {
        self.context.ensure_channels()?;

        let users = self
            .context
            .lookups
            .refresh_users(self.context.channels.as_slice())
            .await?;
        for user in users {
            buffer.push(&self.channel_views, user.view_count as f64, &[&user.login]);
        }
        Ok(())
    }
}
