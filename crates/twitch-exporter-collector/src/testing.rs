use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use twitch_exporter_common::{
    ChannelNames, ManualClock,
    error::{ExporterError, Result},
};
use twitch_exporter_helix::{
    Chatter, Clip, ClipsParams, Follower, Game, HelixApi, HelixResponse, RateLimit, Stream,
    StreamsParams, Subscription, User,
};

use crate::{
    cache::{Cache, MemoryCache, identity_ttl},
    collector::CollectorContext,
    metrics::{MetricSample, SampleBuffer},
};

pub(crate) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub(crate) fn user(id: &str, login: &str) -> User {
    User {
        id: id.to_string(),
        login: login.to_string(),
        display_name: login.to_string(),
        broadcaster_type: String::new(),
        view_count: 0,
        created_at: None,
    }
}

pub(crate) fn stream(user_id: &str, login: &str, game: &str, viewers: u64, started_at: DateTime<Utc>) -> Stream {
    Stream {
        id: format!("stream-{user_id}"),
        user_id: user_id.to_string(),
        user_login: login.to_string(),
        user_name: login.to_string(),
        game_id: format!("game-{game}"),
        game_name: game.to_string(),
        stream_type: "live".to_string(),
        title: String::new(),
        viewer_count: viewers,
        started_at,
    }
}

/// In-memory Helix double. Every call is recorded by method name.
#[derive(Default)]
pub(crate) struct FakeHelix {
    users: Vec<User>,
    streams: Vec<Stream>,
    followers: HashMap<String, u64>,
    chatters: HashMap<String, u64>,
    subscriptions: HashMap<String, Vec<Subscription>>,
    clip_pages: HashMap<String, Vec<usize>>,
    top_games: Vec<Game>,
    games: Vec<Game>,
    failures: HashMap<&'static str, (u16, String)>,
    rate_limit: Option<RateLimit>,
    calls: Mutex<Vec<&'static str>>,
    login_requests: Mutex<Vec<Vec<String>>>,
    stream_requests: Mutex<Vec<StreamsParams>>,
}

impl FakeHelix {
    pub(crate) fn with_users(mut self, users: Vec<User>) -> Self {
        self.users = users;
        self
    }

    pub(crate) fn with_streams(mut self, streams: Vec<Stream>) -> Self {
        self.streams = streams;
        self
    }

    pub(crate) fn with_followers(mut self, broadcaster_id: &str, total: u64) -> Self {
        self.followers.insert(broadcaster_id.to_string(), total);
        self
    }

    pub(crate) fn with_chatters(mut self, broadcaster_id: &str, total: u64) -> Self {
        self.chatters.insert(broadcaster_id.to_string(), total);
        self
    }

    pub(crate) fn with_subscriptions(mut self, broadcaster_id: &str, subscriptions: Vec<Subscription>) -> Self {
        self.subscriptions.insert(broadcaster_id.to_string(), subscriptions);
        self
    }

    /// Clip page sizes returned for a broadcaster, chained by cursor.
    pub(crate) fn with_clip_pages(mut self, broadcaster_id: &str, pages: &[usize]) -> Self {
        self.clip_pages.insert(broadcaster_id.to_string(), pages.to_vec());
        self
    }

    pub(crate) fn with_top_games(mut self, games: Vec<Game>) -> Self {
        self.top_games = games;
        self
    }

    pub(crate) fn with_games(mut self, games: Vec<Game>) -> Self {
        self.games = games;
        self
    }

    pub(crate) fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Makes `method` answer with a non-2xx status.
    pub(crate) fn failing(mut self, method: &'static str, status: u16, message: &str) -> Self {
        self.failures.insert(method, (status, message.to_string()));
        self
    }

    pub(crate) fn calls(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == method)
            .count()
    }

    pub(crate) fn requested_logins(&self) -> Vec<Vec<String>> {
        self.login_requests.lock().unwrap().clone()
    }

    pub(crate) fn stream_requests(&self) -> Vec<StreamsParams> {
        self.stream_requests.lock().unwrap().clone()
    }

    fn respond<T>(&self, method: &'static str, data: Vec<T>) -> HelixResponse<T> {
        self.calls.lock().unwrap().push(method);
        let mut response = match self.failures.get(method) {
            Some((status, message)) => HelixResponse::failed(*status, message.clone()),
            None => HelixResponse::ok(data),
        };
        response.rate_limit = self.rate_limit;
        response
    }
}

#[async_trait]
impl HelixApi for FakeHelix {
    async fn get_users(&self, logins: &[String]) -> Result<HelixResponse<User>> {
        self.login_requests.lock().unwrap().push(logins.to_vec());
        let users = self
            .users
            .iter()
            .filter(|user| logins.contains(&user.login))
            .cloned()
            .collect();
        Ok(self.respond("get_users", users))
    }

    async fn get_streams(&self, params: &StreamsParams) -> Result<HelixResponse<Stream>> {
        self.stream_requests.lock().unwrap().push(params.clone());
        let streams = self
            .streams
            .iter()
            .filter(|stream| {
                (params.user_logins.is_empty() || params.user_logins.contains(&stream.user_login))
                    && (params.game_ids.is_empty() || params.game_ids.contains(&stream.game_id))
            })
            .take(params.first.unwrap_or(20))
            .cloned()
            .collect();
        Ok(self.respond("get_streams", streams))
    }

    async fn get_channel_follows(&self, broadcaster_id: &str) -> Result<HelixResponse<Follower>> {
        let total = self.followers.get(broadcaster_id).copied().unwrap_or_default();
        Ok(self.respond("get_channel_follows", Vec::new()).with_total(total))
    }

    async fn get_subscriptions(
        &self,
        broadcaster_id: &str,
        after: Option<&str>,
    ) -> Result<HelixResponse<Subscription>> {
        let all = self.subscriptions.get(broadcaster_id).cloned().unwrap_or_default();
        let offset: usize = after.and_then(|cursor| cursor.parse().ok()).unwrap_or_default();
        let page: Vec<Subscription> = all.iter().skip(offset).take(100).cloned().collect();
        let next = offset + page.len();
        let response = self.respond("get_subscriptions", page);
        if next < all.len() {
            Ok(response.with_cursor(next.to_string()))
        } else {
            Ok(response)
        }
    }

    async fn get_clips(&self, params: &ClipsParams) -> Result<HelixResponse<Clip>> {
        let pages = self.clip_pages.get(&params.broadcaster_id).cloned().unwrap_or_default();
        let index: usize = params
            .after
            .as_deref()
            .and_then(|cursor| cursor.parse().ok())
            .unwrap_or_default();
        let clips = (0..pages.get(index).copied().unwrap_or_default())
            .map(|n| Clip {
                id: format!("clip-{index}-{n}"),
                view_count: 0,
                created_at: None,
            })
            .collect();
        let response = self.respond("get_clips", clips);
        if index + 1 < pages.len() {
            Ok(response.with_cursor((index + 1).to_string()))
        } else {
            Ok(response)
        }
    }

    async fn get_top_games(&self, first: usize) -> Result<HelixResponse<Game>> {
        let games = self.top_games.iter().take(first).cloned().collect();
        Ok(self.respond("get_top_games", games))
    }

    async fn get_channel_chat_chatters(
        &self,
        broadcaster_id: &str,
        moderator_id: &str,
    ) -> Result<HelixResponse<Chatter>> {
        if broadcaster_id != moderator_id {
            return Err(ExporterError::InvalidArgument(
                "moderator must be the broadcaster".to_string(),
            ));
        }
        let total = self.chatters.get(broadcaster_id).copied().unwrap_or_default();
        Ok(self.respond("get_channel_chat_chatters", Vec::new()).with_total(total))
    }

    async fn get_games(&self, ids: &[String]) -> Result<HelixResponse<Game>> {
        let games = self
            .games
            .iter()
            .filter(|game| ids.contains(&game.id))
            .cloned()
            .collect();
        Ok(self.respond("get_games", games))
    }
}

/// Cache whose every operation fails.
pub(crate) struct FailingCache;

#[async_trait]
impl Cache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(ExporterError::Cache("unavailable".to_string()))
    }

    async fn set(&self, _key: &str, _payload: Vec<u8>) -> Result<()> {
        Err(ExporterError::Cache("unavailable".to_string()))
    }
}

pub(crate) fn context(api: Arc<FakeHelix>, channels: &[&str]) -> (CollectorContext, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start_time()));
    let cache = Arc::new(MemoryCache::new(identity_ttl(), clock.clone()));
    let channels: ChannelNames = channels.iter().collect();
    (CollectorContext::new(api, channels, cache, clock.clone()), clock)
}

pub(crate) fn find<'a>(samples: &'a [MetricSample], name: &str, username: &str) -> Vec<&'a MetricSample> {
    samples
        .iter()
        .filter(|sample| sample.name() == name && sample.label("username") == Some(username))
        .collect()
}

pub(crate) fn value_of(buffer: &SampleBuffer, name: &str, username: &str) -> Option<f64> {
    find(buffer.samples(), name, username)
        .first()
        .map(|sample| sample.value)
}
