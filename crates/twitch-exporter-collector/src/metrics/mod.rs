pub mod render;
pub mod types;

pub use render::{CONTENT_TYPE, render_prometheus};
pub use types::{MetricDescriptor, MetricSample, MetricType, NAMESPACE, SampleBuffer, metric_name};
