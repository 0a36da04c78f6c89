use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use twitch_exporter_common::error::Result;

use crate::{
    collector::{Collector, CollectorContext, CollectorFactory, collect_pages, registry::factory_fn},
    metrics::{MetricDescriptor, SampleBuffer},
};

pub const NAME: &str = "channel_subscribers_total";

pub fn factory() -> CollectorFactory {
    factory_fn(|context| async move { Ok(ChannelSubscribersCollector::new(context)) })
}

/// Subscriber counts per tier, split into gifted and paid subscriptions.
pub struct ChannelSubscribersCollector {
    context: CollectorContext,
    channel_subscribers: Arc<MetricDescriptor>,
}

impl ChannelSubscribersCollector {
    pub fn new(context: CollectorContext) -> Self {
        Self {
            context,
            channel_subscribers: MetricDescriptor::gauge(
                NAME,
                "The number of subscriber of a channel.",
                &["username", "tier", "gifted"],
            ),
        }
    }
}

#[async_trait]
impl Collector for ChannelSubscribersCollector {
    async fn update(&self, buffer: &mut SampleBuffer) -> Result<()> {
        self.context.ensure_channels()?;

        let users = self
            .context
            .lookups
            .users_by_login(self.context.channels.as_slice())
            .await?;

        for user in users {
            let api = &self.context.api;
            let broadcaster_id = user.id.as_str();
            let subscriptions = collect_pages(&self.context.governor, |cursor| async move {
                api.get_subscriptions(broadcaster_id, cursor.as_deref()).await
            })
            .await?;

            let mut counts: BTreeMap<(String, bool), u64> = BTreeMap::new();
            for subscription in subscriptions {
                *counts.entry((subscription.tier, subscription.is_gift)).or_default() += 1;
            }
            for ((tier, gifted), count) in counts {
                let gifted = if gifted { "true" } else { "false" };
                buffer.push(&self.channel_subscribers, count as f64, &[&user.login, &tier, gifted]);
            }
        }
        Ok(())
    }
}
