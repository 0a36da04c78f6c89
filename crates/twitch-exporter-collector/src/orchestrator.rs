use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, error, info, warn};
use twitch_exporter_common::error::Result;

use crate::{
    collector::{Collector, CollectorContext, CollectorRegistry},
    config::CollectorOverrides,
    metrics::{MetricDescriptor, MetricSample, MetricType, SampleBuffer, metric_name, render_prometheus},
};

pub const EXPORTER_NAMESPACE: &str = "twitch_exporter";

/// Samples produced by one scrape.
#[derive(Debug, Default)]
pub struct Snapshot {
    samples: Vec<MetricSample>,
}

impl Snapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, MetricSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn render(&self) -> String {
        render_prometheus(&self.samples)
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a MetricSample;
    type IntoIter = std::slice::Iter<'a, MetricSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

struct ScrapeDescriptors {
    duration: Arc<MetricDescriptor>,
    success: Arc<MetricDescriptor>,
    errors: Arc<MetricDescriptor>,
    build_info: Arc<MetricDescriptor>,
}

impl ScrapeDescriptors {
    fn new() -> Self {
        Self {
            duration: MetricDescriptor::new(
                metric_name(EXPORTER_NAMESPACE, "scrape_collector_duration_seconds"),
                "Duration of a collector scrape.",
                MetricType::Gauge,
                &["collector"],
            ),
            success: MetricDescriptor::new(
                metric_name(EXPORTER_NAMESPACE, "scrape_collector_success"),
                "Whether a collector succeeded.",
                MetricType::Gauge,
                &["collector"],
            ),
            errors: MetricDescriptor::new(
                metric_name(EXPORTER_NAMESPACE, "scrape_errors_total"),
                "Total number of failed collector scrapes.",
                MetricType::Counter,
                &["collector"],
            ),
            build_info: MetricDescriptor::new(
                metric_name(EXPORTER_NAMESPACE, "build_info"),
                "A metric with a constant '1' value labeled by the exporter version.",
                MetricType::Gauge,
                &["version"],
            ),
        }
    }
}

struct NamedCollector {
    name: String,
    collector: Box<dyn Collector>,
}

/// Runs every enabled collector concurrently on each scrape and merges their
/// output with per-collector scrape metrics.
pub struct Orchestrator {
    collectors: Vec<NamedCollector>,
    error_counts: Mutex<HashMap<String, u64>>,
    descriptors: ScrapeDescriptors,
    version: String,
}

impl Orchestrator {
    /// Builds the enabled collectors. A collector whose prerequisite is not
    /// configured is skipped; any other construction error is returned.
    pub async fn build(
        registry: &CollectorRegistry,
        overrides: &CollectorOverrides,
        context: CollectorContext,
    ) -> Result<Self> {
        overrides.validate(registry)?;

        let mut collectors = Vec::new();
        for entry in registry.iter() {
            if !overrides.is_enabled(&entry.name, entry.enabled_by_default) {
                debug!(collector = %entry.name, "collector disabled");
                continue;
            }

            match (entry.factory)(context.clone()).await {
                Ok(collector) => {
                    info!(collector = %entry.name, "collector enabled");
                    collectors.push(NamedCollector {
                        name: entry.name.clone(),
                        collector,
                    });
                }
                Err(err) if err.is_prerequisite() => {
                    warn!(collector = %entry.name, error = %err, "collector skipped");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(Self::from_collectors(collectors))
    }

    fn from_collectors(collectors: Vec<NamedCollector>) -> Self {
        let error_counts = collectors
            .iter()
            .map(|entry| (entry.name.clone(), 0))
            .collect();

        Self {
            collectors,
            error_counts: Mutex::new(error_counts),
            descriptors: ScrapeDescriptors::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn collector_names(&self) -> Vec<&str> {
        self.collectors.iter().map(|entry| entry.name.as_str()).collect()
    }

    pub async fn scrape(&self) -> Snapshot {
        let mut pending: FuturesUnordered<_> = self
            .collectors
            .iter()
            .map(|entry| async move {
                let started_at = Instant::now();
                let mut buffer = SampleBuffer::new();
                let result = entry.collector.update(&mut buffer).await;
                (entry.name.as_str(), started_at.elapsed(), result, buffer)
            })
            .collect();

        let mut samples = Vec::new();
        let mut meta = SampleBuffer::new();
        while let Some((name, elapsed, result, buffer)) = pending.next().await {
            let success = match result {
                Ok(()) => {
                    debug!(
                        collector = name,
                        samples = buffer.len(),
                        duration_seconds = elapsed.as_secs_f64(),
                        "collector succeeded"
                    );
                    samples.extend(buffer.into_samples());
                    1.0
                }
                Err(err) if err.is_no_data() => {
                    debug!(collector = name, "collector returned no data");
                    0.0
                }
                Err(err) => {
                    error!(
                        collector = name,
                        error = %err,
                        duration_seconds = elapsed.as_secs_f64(),
                        "collector failed"
                    );
                    self.record_error(name);
                    0.0
                }
            };
            meta.push(&self.descriptors.duration, elapsed.as_secs_f64(), &[name]);
            meta.push(&self.descriptors.success, success, &[name]);
        }

        for entry in &self.collectors {
            let errors = self.error_count(&entry.name);
            meta.push(&self.descriptors.errors, errors as f64, &[&entry.name]);
        }
        meta.push(&self.descriptors.build_info, 1.0, &[&self.version]);

        samples.extend(meta.into_samples());
        Snapshot { samples }
    }

    fn record_error(&self, name: &str) {
        let mut counts = self.error_counts.lock().unwrap_or_else(PoisonError::into_inner);
        *counts.entry(name.to_string()).or_default() += 1;
    }

    fn error_count(&self, name: &str) -> u64 {
        self.error_counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or_default()
    }
}
