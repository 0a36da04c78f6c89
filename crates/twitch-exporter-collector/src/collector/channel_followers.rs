use std::sync::Arc;

use async_trait::async_trait;
use twitch_exporter_common::error::Result;

use crate::{
    collector::{Collector, CollectorContext, CollectorFactory, fan_out, registry::factory_fn},
    metrics::{MetricDescriptor, SampleBuffer},
};

pub const NAME: &str = "channel_followers_total";

pub fn factory() -> CollectorFactory {
    factory_fn(|context| async move { Ok(ChannelFollowersCollector::new(context)) })
}

pub struct ChannelFollowersCollector {
    context: CollectorContext,
    channel_followers: Arc<MetricDescriptor>,
}

impl ChannelFollowersCollector {
    pub fn new(context: CollectorContext) -> Self {
        Self {
            context,
            channel_followers: MetricDescriptor::gauge(
                NAME,
                "The number of followers of a channel.",
                &["username"],
            ),
        }
    }
}

#[async_trait]
impl Collector for ChannelFollowersCollector {
    async fn update(&self, buffer: &mut SampleBuffer) -> Result<()> {
        self.context.ensure_channels()?;

        let users = self
            .context
            .lookups
            .users_by_login(self.context.channels.as_slice())
            .await?;

        // `total` is reported on the first page, no need to paginate
        let totals = fan_out(&users, |user| async move {
            let response = self
                .context
                .api
                .get_channel_follows(&user.id)
                .await?
                .ensure_success()?;
            Ok((user.login.as_str(), response.total.unwrap_or_default()))
        })
        .await?;

        for (login, total) in totals {
            buffer.push(&self.channel_followers, total as f64, &[login]);
        }
        Ok(())
    }
}
