//! Plain-text exposition bodies for a push-based metrics gateway.

use crate::metrics::{MetricLeaf, MetricValue};

/// Sample type declared when the caller does not pick one.
pub const DEFAULT_SAMPLE_TYPE: &str = "untyped";

/// A single sample ready to be rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub kind: &'static str,
    pub help: Option<String>,
    pub label: Option<String>,
    pub value: MetricValue,
}

impl Sample {
    /// Sample for one metric-tree leaf published under `series`.
    pub fn from_leaf(series: &str, leaf: &MetricLeaf) -> Self {
        Self {
            name: metric_name(series, leaf.path.as_slice()),
            kind: DEFAULT_SAMPLE_TYPE,
            help: None,
            label: Some(series.to_string()),
            value: leaf.value,
        }
    }
}

/// `series` followed by each path segment, joined by `_` and sanitized into a
/// valid metric name.
pub fn metric_name<S: AsRef<str>>(series: &str, path: &[S]) -> String {
    let joined = std::iter::once(series)
        .chain(path.iter().map(AsRef::as_ref))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    sanitize(&joined)
}

fn sanitize(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Render the request body: type line, optional help line, sample line.
pub fn render_sample(sample: &Sample) -> String {
    let mut body = format!("# TYPE {} {}\n", sample.name, sample.kind);
    if let Some(help) = sample.help.as_deref().filter(|h| !h.is_empty()) {
        body.push_str(&format!("# HELP {} {}\n", sample.name, escape_help(help)));
    }
    match sample.label.as_deref() {
        Some(label) => body.push_str(&format!(
            "{}{{label=\"{}\"}} {}\n",
            sample.name,
            escape_label(label),
            sample.value
        )),
        None => body.push_str(&format!("{} {}\n", sample.name, sample.value)),
    }
    body
}

/// Grouping-key path segments: `metrics/job/<job>/provider/<provider>` plus
/// `/instance/<instance>` when one is set. Segments are returned unescaped;
/// URL encoding is left to the caller.
pub fn grouping_segments(job: &str, provider: &str, instance: Option<&str>) -> Vec<String> {
    let mut segments = vec![
        "metrics".to_string(),
        "job".to_string(),
        job.to_string(),
        "provider".to_string(),
        provider.to_string(),
    ];
    if let Some(instance) = instance.filter(|i| !i.is_empty()) {
        segments.push("instance".to_string());
        segments.push(instance.to_string());
    }
    segments
}

fn escape_label(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\n', "\\n")
}
