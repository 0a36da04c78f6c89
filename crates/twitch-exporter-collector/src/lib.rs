pub mod cache;
pub mod collector;
pub mod config;
pub mod counter;
pub mod governor;
pub mod handlers;
pub mod lookup;
pub mod metrics;
pub mod orchestrator;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{Cache, MemoryCache, cache_key};
pub use collector::{Collector, CollectorContext, CollectorRegistry};
pub use config::{CollectorOverrides, EventSubSettings, ExporterConfig};
pub use counter::ChatMessageCounter;
pub use governor::RateLimitGovernor;
pub use lookup::{ChannelIdentityMap, Lookups};
pub use orchestrator::{Orchestrator, Snapshot};
pub use router::{ExporterState, exporter_router};
