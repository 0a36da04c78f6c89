use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use twitch_exporter_common::{
    error::{ExporterError, Result},
    types::ChannelNames,
};
use twitch_exporter_helix::{Game, HelixApi, MAX_IDS_PER_REQUEST, User};

use crate::cache::{Cache, cache_key};

/// Identity lookups that go through the cache before calling Helix.
///
/// Cache failures never fail a lookup: they are logged and the remote result
/// is used as is. Empty remote results are not cached.
pub struct Lookups {
    api: Arc<dyn HelixApi>,
    cache: Arc<dyn Cache>,
}

impl Lookups {
    pub fn new(api: Arc<dyn HelixApi>, cache: Arc<dyn Cache>) -> Self {
        Self { api, cache }
    }

    pub async fn user_by_login(&self, login: &str) -> Result<Option<User>> {
        let mut users = self.users_by_login(&[login.to_string()]).await?;
        Ok(users.pop())
    }

    /// Resolves logins to users, in input order. Logins that do not exist are
    /// left out of the result.
    pub async fn users_by_login(&self, logins: &[String]) -> Result<Vec<User>> {
        let mut found: HashMap<String, User> = HashMap::new();
        let mut missing = Vec::new();

        for login in logins {
            match self.read::<User>(&user_key(login)).await {
                Some(user) => {
                    found.insert(login.clone(), user);
                }
                None => missing.push(login.clone()),
            }
        }

        self.fetch_users(&missing, &mut found).await?;

        Ok(logins
            .iter()
            .filter_map(|login| found.remove(login.as_str()))
            .collect())
    }

    /// Like [`Lookups::users_by_login`] but always asks Helix, then
    /// overwrites the cached entries with the fresh users.
    pub async fn refresh_users(&self, logins: &[String]) -> Result<Vec<User>> {
        let mut found = HashMap::new();
        self.fetch_users(logins, &mut found).await?;

        Ok(logins
            .iter()
            .filter_map(|login| found.remove(login.as_str()))
            .collect())
    }

    async fn fetch_users(&self, logins: &[String], found: &mut HashMap<String, User>) -> Result<()> {
        for chunk in logins.chunks(MAX_IDS_PER_REQUEST) {
            let response = self.api.get_users(chunk).await?.ensure_success()?;
            for user in response.data {
                self.write(&user_key(&user.login), &user).await;
                found.insert(user.login.clone(), user);
            }
        }
        Ok(())
    }

    pub async fn game_name(&self, game_id: &str) -> Result<Option<String>> {
        if game_id.is_empty() {
            return Ok(None);
        }
        if let Some(game) = self.read::<Game>(&game_key(game_id)).await {
            return Ok(Some(game.name));
        }

        let response = self
            .api
            .get_games(&[game_id.to_string()])
            .await?
            .ensure_success()?;

        let Some(game) = response.data.into_iter().next() else {
            debug!(game_id, "game not found");
            return Ok(None);
        };
        self.write(&game_key(&game.id), &game).await;
        Ok(Some(game.name))
    }

    pub async fn remember_game(&self, game: &Game) {
        self.write(&game_key(&game.id), game).await;
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = match self.cache.get(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(err) => {
                warn!(key, error = %err, "cache read failed");
                return None;
            }
        };

        match serde_json::from_slice(&payload) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "discarding undecodable cache entry");
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) {
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key, error = %err, "could not encode value for cache");
                return;
            }
        };

        if let Err(err) = self.cache.set(key, payload).await {
            warn!(key, error = %err, "cache write failed");
        }
    }
}

fn user_key(login: &str) -> String {
    cache_key("channel", "username", login)
}

fn game_key(id: &str) -> String {
    cache_key("game", "id", id)
}

/// Login to user id map shared by collectors that address channels by id.
#[derive(Default)]
pub struct ChannelIdentityMap {
    ids: RwLock<HashMap<String, String>>,
}

impl ChannelIdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, login: &str) -> Option<String> {
        self.ids
            .read()
            .ok()
            .and_then(|ids| ids.get(login).cloned())
    }

    pub fn insert(&self, login: &str, id: &str) -> Result<()> {
        self.ids
            .write()
            .map_err(|_| ExporterError::InternalError("identity map lock poisoned".to_string()))?
            .insert(login.to_string(), id.to_string());
        Ok(())
    }

    pub fn missing(&self, channels: &ChannelNames) -> Vec<String> {
        let ids = match self.ids.read() {
            Ok(ids) => ids,
            Err(_) => return channels.iter().cloned().collect(),
        };
        channels
            .iter()
            .filter(|login| !ids.contains_key(login.as_str()))
            .cloned()
            .collect()
    }

    /// Looks up every channel that has no id yet. The map lock is not held
    /// while Helix is called.
    pub async fn resolve(&self, lookups: &Lookups, channels: &ChannelNames) -> Result<()> {
        let missing = self.missing(channels);
        if missing.is_empty() {
            return Ok(());
        }

        let users = lookups.users_by_login(&missing).await?;
        for user in &users {
            self.insert(&user.login, &user.id)?;
        }

        if users.len() < missing.len() {
            let unresolved: Vec<&String> = missing
                .iter()
                .filter(|login| !users.iter().any(|user| &user.login == *login))
                .collect();
            warn!(?unresolved, "channels could not be resolved to user ids");
        }
        Ok(())
    }
}
