use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    request_counter: Counter<u64>,
    upload_counter: Counter<u64>,
    detection_duration: Histogram<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("detection_page");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        let upload_counter = meter
            .u64_counter("uploads_total")
            .with_description("Image uploads by outcome")
            .build();

        // Local inference runs in the hundreds of milliseconds, remote
        // cold starts can take tens of seconds.
        let boundaries = generate_boundaries(&[
            (50, 500, 50),
            (500, 2000, 250),
            (2000, 10000, 1000),
            (10000, 60000, 10000),
        ]);

        let detection_duration = meter
            .u64_histogram("detection_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of detection calls in milliseconds")
            .build();

        Ok(Metrics {
            request_counter,
            upload_counter,
            detection_duration,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_upload(&self, outcome: &str) {
        let attributes = vec![KeyValue::new("outcome", outcome.to_string())];
        self.upload_counter.add(1, &attributes);
    }

    pub fn record_detection_duration(&self, duration_ms: u64, outcome: &str) {
        let attributes = vec![KeyValue::new("outcome", outcome.to_string())];
        self.detection_duration.record(duration_ms, &attributes);
    }
}

/// Bucket boundaries from `(start, end, step)` segments, deduplicated where
/// segments meet.
fn generate_boundaries(segments: &[(u64, u64, usize)]) -> Vec<f64> {
    let mut seen = HashSet::new();
    segments
        .iter()
        .flat_map(|&(start, end, step)| (start..=end).step_by(step.max(1)))
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
