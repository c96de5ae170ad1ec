use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use metricwatch_sdk::{Condition, EventBuilder, FilterChain, FilterConfig, Payload};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

fn payload(fields: usize) -> Payload {
    let mut payload = Payload::new();
    payload.insert("type".into(), json!("custom"));
    payload.insert("@timestamp".into(), json!("2024-01-01T00:00:00Z"));
    for i in 0..fields {
        payload.insert(format!("field_{}", i), json!({ "value": i, "unit": "ms" }));
    }
    payload
}

fn build(filters: &FilterChain, payload: Payload) -> Option<metricwatch_sdk::Event> {
    EventBuilder {
        module: "bench",
        metricset: "status",
        host: "localhost",
        start_time: chrono::Utc::now(),
        fetch_duration: Duration::from_micros(250),
        payload: Some(payload),
        fetch_error: None,
        filters,
        metadata: None,
    }
    .build()
    .unwrap()
}

/// Benchmark event building with varying payload sizes
fn bench_build_varying_payload(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_build");
    let filters = FilterChain::new();

    for fields in [1, 10, 100].iter() {
        let template = payload(*fields);
        group.bench_with_input(BenchmarkId::new("fields", fields), &template, |b, template| {
            b.iter(|| build(&filters, black_box(template.clone())))
        });
    }
    group.finish();
}

/// Benchmark event building through a filter chain
fn bench_build_with_filters(c: &mut Criterion) {
    let filters = FilterChain::compile(&[
        FilterConfig::DropFields {
            fields: vec!["field_1.unit".into(), "field_2".into()],
        },
        FilterConfig::DropEvent {
            when: Condition {
                equals: BTreeMap::from([("field_3.value".to_string(), json!(-1))]),
                ..Default::default()
            },
        },
    ])
    .unwrap();
    let template = payload(10);

    c.bench_function("event_build_filtered", |b| {
        b.iter(|| build(&filters, black_box(template.clone())))
    });
}

/// Benchmark rendering an event into its published JSON line
fn bench_serialize(c: &mut Criterion) {
    let filters = FilterChain::new();
    let event = build(&filters, payload(10)).unwrap();

    c.bench_function("event_to_json", |b| {
        b.iter(|| serde_json::to_vec(black_box(&event)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_build_varying_payload,
    bench_build_with_filters,
    bench_serialize
);
criterion_main!(benches);
