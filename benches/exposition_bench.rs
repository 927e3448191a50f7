//! Exposition Rendering Benchmarks — Scrape-Path Performance
//!
//! Benchmarks the text rendering that runs on every scrape, plus the
//! validation and rate-limit checks on the request path.
//!
//! Run with: cargo bench --bench exposition_bench

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use telemetry_gateway::config::SecurityConfig;
use telemetry_gateway::domain::exposition;
use telemetry_gateway::domain::metrics::{
    validate_metric_name, InstrumentKind, LabelSet, MetricSample, MetricsSnapshot,
    SampleValue,
};
use telemetry_gateway::usecases::security_gate::EndpointSecurityGate;

fn snapshot(series: usize) -> MetricsSnapshot {
    let samples = (0..series)
        .map(|i| MetricSample {
            name: format!("bench_metric_{}", i % 50),
            kind: InstrumentKind::Gauge,
            value: SampleValue::Double(i as f64 * 0.5),
            labels: LabelSet::from_pairs([
                ("shard", format!("{}", i % 8)),
                ("zone", "eu-west-1".to_string()),
            ]),
            timestamp_ms: 1_700_000_000_000 + i as u64,
            help: (i % 50 == 0).then(|| "Benchmark series".to_string()),
        })
        .collect();

    MetricsSnapshot {
        service_name: "bench-service".to_string(),
        service_version: "1.0.0".to_string(),
        environment: "bench".to_string(),
        service_labels: LabelSet::new(),
        samples,
        collection_duration: Duration::ZERO,
    }
}

/// Benchmark rendering a typical scrape payload (500 series).
fn bench_render_500_series(c: &mut Criterion) {
    let snapshot = snapshot(500);

    c.bench_function("exposition_render_500", |b| {
        b.iter(|| {
            let text = exposition::render(black_box(&snapshot));
            black_box(text);
        });
    });
}

/// Benchmark metric-name validation on the registration path.
fn bench_name_validation(c: &mut Criterion) {
    c.bench_function("validate_metric_name", |b| {
        b.iter(|| {
            let _ = validate_metric_name(
                black_box("app_http_requests_total"),
                black_box(&[]),
            );
        });
    });
}

/// Benchmark the per-request rate-limit window update.
fn bench_rate_limit_check(c: &mut Criterion) {
    let gate = EndpointSecurityGate::new(&SecurityConfig {
        max_requests_per_minute: u32::MAX,
        ..SecurityConfig::default()
    })
    .unwrap();

    c.bench_function("should_rate_limit", |b| {
        b.iter(|| {
            let _ = gate.should_rate_limit(black_box("203.0.113.5"), black_box("/metrics"));
        });
    });
}

criterion_group!(
    benches,
    bench_render_500_series,
    bench_name_validation,
    bench_rate_limit_check
);
criterion_main!(benches);
