use std::sync::Arc;

use futures::future::BoxFuture;
use twitch_exporter_common::error::{ExporterError, Result};

use crate::collector::{
    Collector, CollectorContext, channel_chat_messages, channel_chatters, channel_clips,
    channel_followers, channel_subscribers, channel_up, channel_uptime, channel_viewers,
    channel_views, top_games,
};

/// Builds a collector. Construction may call Helix, so it is async.
pub type CollectorFactory =
    Arc<dyn Fn(CollectorContext) -> BoxFuture<'static, Result<Box<dyn Collector>>> + Send + Sync>;

#[derive(Clone)]
pub struct RegisteredCollector {
    pub name: String,
    pub enabled_by_default: bool,
    pub factory: CollectorFactory,
}

/// Every collector the exporter knows about, in registration order.
#[derive(Clone, Default)]
pub struct CollectorRegistry {
    collectors: Vec<RegisteredCollector>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(channel_up::NAME, true, channel_up::factory())?;
        registry.register(channel_viewers::NAME, true, channel_viewers::factory())?;
        registry.register(channel_followers::NAME, true, channel_followers::factory())?;
        registry.register(channel_views::NAME, true, channel_views::factory())?;
        // needs a token of the broadcaster itself
        registry.register(channel_subscribers::NAME, false, channel_subscribers::factory())?;
        // needs a moderator token for every channel
        registry.register(channel_chatters::NAME, false, channel_chatters::factory())?;
        registry.register(channel_clips::NAME, true, channel_clips::factory())?;
        registry.register(channel_uptime::NAME, true, channel_uptime::factory())?;
        // needs a public EventSub webhook
        registry.register(
            channel_chat_messages::NAME,
            false,
            channel_chat_messages::factory(),
        )?;
        registry.register(top_games::NAME, false, top_games::factory())?;
        Ok(registry)
    }

    pub fn register(
        &mut self,
        name: &str,
        enabled_by_default: bool,
        factory: CollectorFactory,
    ) -> Result<()> {
        if self.contains(name) {
            return Err(ExporterError::DuplicateCollector(name.to_string()));
        }

        self.collectors.push(RegisteredCollector {
            name: name.to_string(),
            enabled_by_default,
            factory,
        });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collectors.iter().any(|collector| collector.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.collectors
            .iter()
            .map(|collector| collector.name.as_str())
            .collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RegisteredCollector> {
        self.collectors.iter()
    }
}

/// Wraps a constructor into a [`CollectorFactory`].
pub(crate) fn factory_fn<F, Fut, C>(build: F) -> CollectorFactory
where
    F: Fn(CollectorContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C>> + Send + 'static,
    C: Collector + 'static,
{
    Arc::new(move |context| -> BoxFuture<'static, Result<Box<dyn Collector>>> {
        let built = build(context);
        Box::pin(async move { Ok(Box::new(built.await?) as Box<dyn Collector>) })
    })
}

#[cfg(test)]
mod tests {
    use twitch_exporter_common::ExporterError;

    use super::CollectorRegistry;
    use crate::collector::channel_up;

    #[test]
    fn builtin_registry_has_expected_defaults() {
        let registry = CollectorRegistry::builtin().unwrap();
        let enabled: Vec<&str> = registry
            .iter()
            .filter(|collector| collector.enabled_by_default)
            .map(|collector| collector.name.as_str())
            .collect();

        assert_eq!(registry.names().len(), 10);
        assert_eq!(
            enabled,
            vec![
                "channel_up",
                "channel_viewers_total",
                "channel_followers_total",
                "channel_views_total",
                "channel_clips_total",
                "channel_uptime_total",
            ]
        );
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut registry = CollectorRegistry::builtin().unwrap();
        let result = registry.register(channel_up::NAME, true, channel_up::factory());

        assert!(matches!(result, Err(ExporterError::DuplicateCollector(name)) if name == "channel_up"));
    }
}
