use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use twitch_exporter_common::error::Result;
use twitch_exporter_helix::ClipsParams;

use crate::{
    collector::{Collector, CollectorContext, CollectorFactory, collect_pages, registry::factory_fn},
    metrics::{MetricDescriptor, SampleBuffer},
};

pub const NAME: &str = "channel_clips_total";

const CLIPS_PAGE_SIZE: usize = 100;

pub fn factory() -> CollectorFactory {
    factory_fn(|context| async move { Ok(ChannelClipsCollector::new(context)) })
}

fn window() -> Duration {
    Duration::hours(24)
}

/// Clips created for each channel over the last 24 hours.
pub struct ChannelClipsCollector {
    context: CollectorContext,
    channel_clips: Arc<MetricDescriptor>,
}

impl ChannelClipsCollector {
    pub fn new(context: CollectorContext) -> Self {
        Self {
            context,
            channel_clips: MetricDescriptor::gauge(
                NAME,
                "Number of clips created in the last 24 hours.",
                &["username"],
            ),
        }
    }
}

#[async_trait]
impl Collector for ChannelClipsCollector {
    async fn update(&self, buffer: &mut SampleBuffer) -> Result<()> {
        self.context.ensure_channels()?;

        let users = self
            .context
            .lookups
            .users_by_login(self.context.channels.as_slice())
            .await?;
        let started_at = self.context.clock.now() - window();

        for user in users {
            let api = &self.context.api;
            let broadcaster_id = &user.id;
            let clips = collect_pages(&self.context.governor, |after| async move {
                let params = ClipsParams {
                    broadcaster_id: broadcaster_id.clone(),
                    first: CLIPS_PAGE_SIZE,
                    after,
                    started_at,
                };
                api.get_clips(&params).await
            })
            .await?;

            buffer.push(&self.channel_clips, clips.len() as f64, &[&user.login]);
        }
        Ok(())
    }
}
