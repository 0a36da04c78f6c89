use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use twitch_exporter_common::error::{ExporterError, Result};

use crate::{
    collector::{Collector, CollectorContext, CollectorFactory, registry::factory_fn},
    metrics::{MetricDescriptor, SampleBuffer},
};

pub const NAME: &str = "channel_uptime_total";

pub fn factory() -> CollectorFactory {
    factory_fn(|context| async move { Ok(ChannelUptimeCollector::new(context)) })
}

/// Seconds each live channel has been up since it was last reported.
///
/// The first scrape that sees a channel live reports the time since the
/// stream started; every later scrape reports the time since the previous
/// one, so summing the samples gives the total uptime. A channel that is not
/// live in a successful scrape, or whose stream restarted between two
/// scrapes, starts over.
pub struct ChannelUptimeCollector {
    context: CollectorContext,
    channel_uptime: Arc<MetricDescriptor>,
    last_reported: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl ChannelUptimeCollector {
    pub fn new(context: CollectorContext) -> Self {
        Self {
            context,
            channel_uptime: MetricDescriptor::counter(
                NAME,
                "Channel uptime total in seconds.",
                &["username"],
            ),
            last_reported: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Collector for ChannelUptimeCollector {
    async fn update(&self, buffer: &mut SampleBuffer) -> Result<()> {
        self.context.ensure_channels()?;

        let streams = self.context.live_streams().await?;
        let now = self.context.clock.now();

        let mut last_reported = self
            .last_reported
            .lock()
            .map_err(|_| ExporterError::InternalError("uptime state lock poisoned".to_string()))?;
        last_reported.retain(|login, _| streams.iter().any(|stream| &stream.user_login == login));

        for stream in &streams {
            // a stream that started after the last report is a new broadcast
            let since = last_reported
                .get(&stream.user_login)
                .copied()
                .map_or(stream.started_at, |reported| reported.max(stream.started_at));
            let seconds = (now - since).num_milliseconds().max(0) as f64 / 1000.0;
            buffer.push(&self.channel_uptime, seconds, &[&stream.user_login]);
            last_reported.insert(stream.user_login.clone(), now);
        }
        Ok(())
    }
}
