//! Prometheus text exposition rendering.
//!
//! Turns a [`MetricsSnapshot`] into the plaintext wire format scraped by
//! a Prometheus-compatible collector: samples grouped by metric name,
//! one `# HELP`/`# TYPE` header pair per group, one
//! `name{labels} value timestamp` line per label set.

use std::collections::HashMap;

use super::metrics::{MetricSample, MetricsSnapshot};

/// Content type advertised by the scrape endpoint.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render a full snapshot to exposition text.
///
/// Groups preserve first-seen sample order; within a group, lines keep
/// their snapshot order. Service identity labels are merged under each
/// sample's own labels (sample labels win on collision).
pub fn render(snapshot: &MetricsSnapshot) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&MetricSample>> = HashMap::new();

    for sample in &snapshot.samples {
        groups
            .entry(sample.name.as_str())
            .or_insert_with(|| {
                order.push(sample.name.as_str());
                Vec::new()
            })
            .push(sample);
    }

    let service_labels = snapshot.service_labels.merged_with(
        &super::metrics::LabelSet::from_pairs([
            ("service", snapshot.service_name.as_str()),
            ("environment", snapshot.environment.as_str()),
        ]),
    );

    let mut out = String::with_capacity(snapshot.samples.len() * 64);
    for name in order {
        let samples = &groups[name];

        if let Some(help) = samples.iter().find_map(|s| s.help.as_deref()) {
            out.push_str("# HELP ");
            out.push_str(name);
            out.push(' ');
            out.push_str(&escape_help(help));
            out.push('\n');
        }

        out.push_str("# TYPE ");
        out.push_str(name);
        out.push(' ');
        out.push_str(samples[0].kind.exposition_type());
        out.push('\n');

        for sample in samples {
            let labels = service_labels.merged_with(&sample.labels);
            out.push_str(name);
            if !labels.is_empty() {
                out.push('{');
                for (i, (k, v)) in labels.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(k);
                    out.push_str("=\"");
                    out.push_str(&escape_label_value(v));
                    out.push('"');
                }
                out.push('}');
            }
            out.push(' ');
            out.push_str(&sample.value.render());
            out.push(' ');
            out.push_str(&sample.timestamp_ms.to_string());
            out.push('\n');
        }
    }

    out
}

/// Escape a label value: backslash, double quote, and newline.
pub fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Escape help text: backslash and newline only (quotes stay literal).
pub fn escape_help(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::metrics::{
        InstrumentKind, LabelSet, MetricSample, MetricsSnapshot, SampleValue,
    };

    fn sample(
        name: &str,
        kind: InstrumentKind,
        value: SampleValue,
        labels: LabelSet,
        help: Option<&str>,
    ) -> MetricSample {
        MetricSample {
            name: name.to_string(),
            kind,
            value,
            labels,
            timestamp_ms: 1_700_000_000_000,
            help: help.map(str::to_string),
        }
    }

    fn snapshot(samples: Vec<MetricSample>) -> MetricsSnapshot {
        MetricsSnapshot {
            service_name: "orders-api".to_string(),
            service_version: "1.2.3".to_string(),
            environment: "test".to_string(),
            service_labels: LabelSet::new(),
            samples,
            collection_duration: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_five_groups_yield_five_type_blocks() {
        let samples = vec![
            sample("jobs_total", InstrumentKind::Counter, SampleValue::UInt(3), LabelSet::new(), Some("Total jobs")),
            sample("errors_total", InstrumentKind::Counter, SampleValue::UInt(1), LabelSet::new(), None),
            sample("retries_total", InstrumentKind::Counter, SampleValue::UInt(7), LabelSet::new(), None),
            sample("queue_depth", InstrumentKind::Gauge, SampleValue::Double(12.0), LabelSet::new(), None),
            sample("temperature", InstrumentKind::Gauge, SampleValue::Double(21.5), LabelSet::new(), None),
        ];
        let text = render(&snapshot(samples));
        assert_eq!(text.matches("# TYPE ").count(), 5);
        assert_eq!(text.matches("# HELP ").count(), 1);
        assert!(text.contains("# TYPE jobs_total counter"));
        assert!(text.contains("# TYPE queue_depth gauge"));
    }

    #[test]
    fn test_label_sets_share_one_type_block() {
        let samples = vec![
            sample(
                "hits_total",
                InstrumentKind::Counter,
                SampleValue::UInt(5),
                LabelSet::from_pairs([("route", "/a")]),
                None,
            ),
            sample(
                "hits_total",
                InstrumentKind::Counter,
                SampleValue::UInt(9),
                LabelSet::from_pairs([("route", "/b")]),
                None,
            ),
        ];
        let text = render(&snapshot(samples));
        assert_eq!(text.matches("# TYPE hits_total counter").count(), 1);
        assert!(text.contains(r#"route="/a""#));
        assert!(text.contains(r#"route="/b""#));
    }

    #[test]
    fn test_service_labels_on_every_line() {
        let samples = vec![sample(
            "queue_depth",
            InstrumentKind::Gauge,
            SampleValue::Double(3.0),
            LabelSet::new(),
            None,
        )];
        let text = render(&snapshot(samples));
        assert!(text.contains(r#"service="orders-api""#));
        assert!(text.contains(r#"environment="test""#));
    }

    #[test]
    fn test_label_value_escaping() {
        let samples = vec![sample(
            "weird_total",
            InstrumentKind::Counter,
            SampleValue::UInt(1),
            LabelSet::from_pairs([("path", "C:\\tmp"), ("quote", "say \"hi\"\nbye")]),
            None,
        )];
        let text = render(&snapshot(samples));
        assert!(text.contains(r#"path="C:\\tmp""#));
        assert!(text.contains(r#"quote="say \"hi\"\nbye""#));
    }

    #[test]
    fn test_line_format_includes_timestamp() {
        let samples = vec![sample(
            "queue_depth",
            InstrumentKind::Gauge,
            SampleValue::Double(12.5),
            LabelSet::new(),
            None,
        )];
        let text = render(&snapshot(samples));
        let data_line = text.lines().find(|l| !l.starts_with('#')).unwrap();
        assert!(data_line.ends_with(" 12.5 1700000000000"));
    }

    #[test]
    fn test_empty_snapshot_renders_empty() {
        assert_eq!(render(&snapshot(Vec::new())), "");
    }
}
