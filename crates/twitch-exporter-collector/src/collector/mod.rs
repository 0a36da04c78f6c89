pub mod channel_chat_messages;
pub mod channel_chatters;
pub mod channel_clips;
pub mod channel_followers;
pub mod channel_subscribers;
pub mod channel_up;
pub mod channel_uptime;
pub mod channel_viewers;
pub mod channel_views;
pub mod registry;
pub mod top_games;

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};
use twitch_exporter_common::{
    error::{ExporterError, Result},
    time::Clock,
    types::ChannelNames,
};
use twitch_exporter_eventsub::EventSubClient;
use twitch_exporter_helix::{HelixApi, HelixResponse, MAX_IDS_PER_REQUEST, Stream, StreamsParams};

use crate::{
    cache::Cache,
    governor::RateLimitGovernor,
    lookup::{ChannelIdentityMap, Lookups},
    metrics::SampleBuffer,
};

pub use registry::{CollectorFactory, CollectorRegistry, RegisteredCollector};

/// A named producer of samples, invoked once per scrape.
///
/// Everything a collector emits goes into the buffer it is handed. When
/// `update` fails the orchestrator discards that buffer, so a collector may
/// push partial results before returning an error.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn update(&self, buffer: &mut SampleBuffer) -> Result<()>;
}

/// Shared handles every collector factory receives.
#[derive(Clone)]
pub struct CollectorContext {
    pub api: Arc<dyn HelixApi>,
    pub eventsub: Option<Arc<EventSubClient>>,
    pub channels: ChannelNames,
    pub lookups: Arc<Lookups>,
    pub identities: Arc<ChannelIdentityMap>,
    pub governor: Arc<RateLimitGovernor>,
    pub clock: Arc<dyn Clock>,
}

impl CollectorContext {
    pub fn new(
        api: Arc<dyn HelixApi>,
        channels: ChannelNames,
        cache: Arc<dyn Cache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lookups: Arc::new(Lookups::new(Arc::clone(&api), cache)),
            identities: Arc::new(ChannelIdentityMap::new()),
            governor: Arc::new(RateLimitGovernor::new(Arc::clone(&clock))),
            api,
            eventsub: None,
            channels,
            clock,
        }
    }

    pub fn with_eventsub(mut self, eventsub: Arc<EventSubClient>) -> Self {
        self.eventsub = Some(eventsub);
        self
    }

    pub fn with_governor(mut self, governor: RateLimitGovernor) -> Self {
        self.governor = Arc::new(governor);
        self
    }

    pub(crate) fn ensure_channels(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(ExporterError::NoData);
        }
        Ok(())
    }

    /// Streams of the watched channels that are currently live, requested
    /// in batches of at most 100 logins.
    pub(crate) async fn live_streams(&self) -> Result<Vec<Stream>> {
        let mut streams = Vec::new();
        for chunk in self.channels.as_slice().chunks(MAX_IDS_PER_REQUEST) {
            let params = StreamsParams {
                user_logins: chunk.to_vec(),
                first: Some(MAX_IDS_PER_REQUEST),
                ..StreamsParams::default()
            };
            let response = self.api.get_streams(&params).await?.ensure_success()?;
            self.governor.throttle(response.rate_limit.as_ref()).await;
            streams.extend(response.data);
        }
        Ok(streams)
    }

    /// Game name of a stream, resolved through the cache when the stream
    /// payload does not carry it. Lookup failures yield an empty label.
    pub(crate) async fn game_label(&self, stream: &Stream) -> String {
        if !stream.game_name.is_empty() {
            return stream.game_name.clone();
        }
        match self.lookups.game_name(&stream.game_id).await {
            Ok(name) => name.unwrap_or_default(),
            Err(err) => {
                warn!(game_id = %stream.game_id, error = %err, "failed to resolve game name");
                String::new()
            }
        }
    }
}

/// Follows cursors until Helix stops returning one and collects every page.
/// The governor is consulted after each page.
pub(crate) async fn collect_pages<T, F, Fut>(governor: &RateLimitGovernor, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<HelixResponse<T>>>,
{
    let mut items = Vec::new();
    let mut cursor = None;

    loop {
        let response = fetch(cursor.take()).await?.ensure_success()?;
        governor.throttle(response.rate_limit.as_ref()).await;

        let page_len = response.data.len();
        items.extend(response.data);
        match response.cursor {
            Some(next) if page_len > 0 => cursor = Some(next),
            _ => break,
        }
    }

    Ok(items)
}

/// Runs one fetch per item concurrently and waits for all of them. The first
/// error is returned only after every fetch has completed.
pub(crate) async fn fan_out<I, F, Fut, T>(items: I, fetch: F) -> Result<Vec<T>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut pending: FuturesUnordered<Fut> = items.into_iter().map(fetch).collect();
    let mut results = Vec::new();
    let mut first_error = None;

    while let Some(result) = pending.next().await {
        match result {
            Ok(value) => results.push(value),
            Err(err) if first_error.is_none() => first_error = Some(err),
            Err(err) => debug!(error = %err, "additional sub-fetch failure"),
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(results),
    }
}
