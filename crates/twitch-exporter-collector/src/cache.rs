use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use twitch_exporter_common::{
    error::{ExporterError, Result},
    time::Clock,
};

pub const KEY_PREFIX: &str = "twitch_exporter";

pub fn identity_ttl() -> Duration {
    Duration::hours(24)
}

/// `twitch_exporter:<kind>:<field>:<value>`
pub fn cache_key(kind: &str, field: &str, value: &str) -> String {
    format!("{KEY_PREFIX}:{kind}:{field}:{value}")
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, payload: Vec<u8>) -> Result<()>;
}

struct CacheEntry {
    payload: Vec<u8>,
    inserted_at: DateTime<Utc>,
}

/// In-process cache with a single TTL checked at read time. Expired entries
/// are pruned whenever a new entry is written.
pub struct MemoryCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.inserted_at) < self.ttl
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now();
        let entries = self
            .entries
            .read()
            .map_err(|_| ExporterError::Cache("cache lock poisoned".to_string()))?;

        Ok(entries
            .get(key)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.payload.clone()))
    }

    async fn set(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        let now = self.clock.now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ExporterError::Cache("cache lock poisoned".to_string()))?;

        entries.retain(|_, entry| self.is_fresh(entry, now));
        entries.insert(
            key.to_string(),
            CacheEntry {
                payload,
                inserted_at: now,
            },
        );
        Ok(())
    }
}
