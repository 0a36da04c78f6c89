use std::collections::BTreeMap;

use crate::metrics::types::{MetricDescriptor, MetricSample};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Renders samples in the Prometheus text exposition format, one HELP/TYPE
/// block per family. Families are ordered by name; samples keep the order in
/// which they were produced.
pub fn render_prometheus<'a, I>(samples: I) -> String
where
    I: IntoIterator<Item = &'a MetricSample>,
{
    let mut families: BTreeMap<&str, (&MetricDescriptor, Vec<&MetricSample>)> = BTreeMap::new();
    for sample in samples {
        families
            .entry(sample.descriptor.name.as_str())
            .or_insert_with(|| (sample.descriptor.as_ref(), Vec::new()))
            .1
            .push(sample);
    }

    let mut output = String::new();
    for (name, (descriptor, samples)) in families {
        output.push_str("# HELP ");
        output.push_str(name);
        output.push(' ');
        output.push_str(&escape_help(&descriptor.help));
        output.push('\n');

        output.push_str("# TYPE ");
        output.push_str(name);
        output.push(' ');
        output.push_str(descriptor.metric_type.as_prometheus_type());
        output.push('\n');

        for sample in samples {
            output.push_str(&render_sample_line(sample));
        }
    }

    output
}

fn render_sample_line(sample: &MetricSample) -> String {
    let mut rendered = String::new();
    rendered.push_str(sample.name());

    if !sample.label_values.is_empty() {
        rendered.push('{');
        for (index, (key, value)) in sample.labels().enumerate() {
            if index > 0 {
                rendered.push(',');
            }
            rendered.push_str(key);
            rendered.push_str("=\"");
            rendered.push_str(&escape_label_value(value));
            rendered.push('"');
        }
        rendered.push('}');
    }

    rendered.push(' ');
    rendered.push_str(&format_metric_value(sample.value));
    rendered.push('\n');
    rendered
}

fn format_metric_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('"', "\\\"")
}
