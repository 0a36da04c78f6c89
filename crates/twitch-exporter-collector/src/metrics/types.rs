use std::sync::Arc;

pub const NAMESPACE: &str = "twitch";

pub fn metric_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}_{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Untyped,
}

impl MetricType {
    pub fn as_prometheus_type(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Untyped => "untyped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub variable_labels: Vec<String>,
}

impl MetricDescriptor {
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        metric_type: MetricType,
        variable_labels: &[&str],
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            help: help.into(),
            metric_type,
            variable_labels: variable_labels.iter().map(|label| (*label).to_string()).collect(),
        })
    }

    pub fn gauge(name: &str, help: &str, variable_labels: &[&str]) -> Arc<Self> {
        Self::new(metric_name(NAMESPACE, name), help, MetricType::Gauge, variable_labels)
    }

    pub fn counter(name: &str, help: &str, variable_labels: &[&str]) -> Arc<Self> {
        Self::new(metric_name(NAMESPACE, name), help, MetricType::Counter, variable_labels)
    }
}

/// One value of a family for one set of label values. Label values are
/// always as many as the descriptor has label names.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub descriptor: Arc<MetricDescriptor>,
    pub label_values: Vec<String>,
    pub value: f64,
}

impl MetricSample {
    pub fn new(descriptor: &Arc<MetricDescriptor>, labels: &[&str], value: f64) -> Self {
        Self {
            descriptor: Arc::clone(descriptor),
            label_values: normalize_labels(descriptor, labels),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.descriptor
            .variable_labels
            .iter()
            .position(|label| label == name)
            .and_then(|index| self.label_values.get(index))
            .map(String::as_str)
    }

    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.descriptor
            .variable_labels
            .iter()
            .zip(self.label_values.iter())
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// Samples written by one collector during one scrape.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    samples: Vec<MetricSample>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, descriptor: &Arc<MetricDescriptor>, value: f64, labels: &[&str]) {
        self.samples.push(MetricSample::new(descriptor, labels, value));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<MetricSample> {
        self.samples
    }
}

fn normalize_labels(descriptor: &MetricDescriptor, labels: &[&str]) -> Vec<String> {
    let expected = descriptor.variable_labels.len();
    (0..expected)
        .map(|index| labels.get(index).copied().unwrap_or_default().to_string())
        .collect()
}
