use async_trait::async_trait;
use twitch_exporter_common::error::Result;

use crate::types::{
    Chatter, Clip, ClipsParams, Follower, Game, HelixResponse, Stream, StreamsParams,
    Subscription, User,
};

/// The subset of the Helix API the exporter consumes.
///
/// Transport failures surface as `Err`; a response the remote answered with a
/// non-2xx status comes back as `Ok` with that status so the caller can decide
/// how to report it (see [`HelixResponse::ensure_success`]).
#[async_trait]
pub trait HelixApi: Send + Sync {
    async fn get_users(&self, logins: &[String]) -> Result<HelixResponse<User>>;

    async fn get_streams(&self, params: &StreamsParams) -> Result<HelixResponse<Stream>>;

    async fn get_channel_follows(&self, broadcaster_id: &str) -> Result<HelixResponse<Follower>>;

    async fn get_subscriptions(
        &self,
        broadcaster_id: &str,
        after: Option<&str>,
    ) -> Result<HelixResponse<Subscription>>;

    async fn get_clips(&self, params: &ClipsParams) -> Result<HelixResponse<Clip>>;

    async fn get_top_games(&self, first: usize) -> Result<HelixResponse<Game>>;

    async fn get_channel_chat_chatters(
        &self,
        broadcaster_id: &str,
        moderator_id: &str,
    ) -> Result<HelixResponse<Chatter>>;

    async fn get_games(&self, ids: &[String]) -> Result<HelixResponse<Game>>;
}
