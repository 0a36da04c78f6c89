use std::sync::Arc;

use async_trait::async_trait;
use twitch_exporter_common::error::Result;
use twitch_exporter_helix::StreamsParams;

use crate::{
    collector::{Collector, CollectorContext, CollectorFactory, registry::factory_fn},
    metrics::{MetricDescriptor, SampleBuffer},
};

pub const NAME: &str = "top_games_viewers_total";

pub const TOP_GAMES_LIMIT: usize = 100;
pub const STREAMS_PER_GAME: usize = 100;

pub fn factory() -> CollectorFactory {
    factory_fn(|context| async move { Ok(TopGamesCollector::new(context)) })
}

/// Viewers of the biggest live streams of each top game. This walks one
/// streams request per game, so it leans on the rate-limit governor.
pub struct TopGamesCollector {
    context: CollectorContext,
    top_games: Arc<MetricDescriptor>,
}

impl TopGamesCollector {
    pub fn new(context: CollectorContext) -> Self {
        Self {
            context,
            top_games: MetricDescriptor::gauge(
                NAME,
                "The number of live viewers for streamers of top x games",
                &["username", "game"],
            ),
        }
    }
}

#[async_trait]
impl Collector for TopGamesCollector {
    async fn update(&self, buffer: &mut SampleBuffer) -> Result<()> {
        self.context.ensure_channels()?;

        let games = self
            .context
            .api
            .get_top_games(TOP_GAMES_LIMIT)
            .await?
            .ensure_success()?;
        self.context.governor.throttle(games.rate_limit.as_ref()).await;

        for game in games.data {
            self.context.lookups.remember_game(&game).await;

            let params = StreamsParams {
                game_ids: vec![game.id.clone()],
                first: Some(STREAMS_PER_GAME),
                stream_type: Some("live".to_string()),
                ..StreamsParams::default()
            };
            let streams = self.context.api.get_streams(&params).await?.ensure_success()?;

            for stream in &streams.data {
                buffer.push(
                    &self.top_games,
                    stream.viewer_count as f64,
                    &[&stream.user_login, &game.name],
                );
            }
            self.context.governor.throttle(streams.rate_limit.as_ref()).await;
        }
        Ok(())
    }
}
