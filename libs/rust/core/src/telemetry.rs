//! Pipeline metric instruments on the global `artifact_registry` meter.
//!
//! No exporter is installed here; without one the instruments are no-ops.

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

static METER: Lazy<Meter> = Lazy::new(|| opentelemetry::global::meter("artifact_registry"));

pub struct PipelineMetrics {
    pub evaluations_total: Counter<u64>,
    pub evaluator_errors_total: Counter<u64>,
    pub evaluator_latency_ms: Histogram<f64>,
    pub pipeline_latency_ms: Histogram<f64>,
    pub late_results_dropped_total: Counter<u64>,
}

pub static PIPELINE_METRICS: Lazy<PipelineMetrics> = Lazy::new(|| PipelineMetrics {
    evaluations_total: METER.u64_counter("registry_evaluations_total")
        .with_description("Pipeline runs by terminal outcome")
        .build(),
    evaluator_errors_total: METER.u64_counter("registry_evaluator_errors_total")
        .with_description("Errored metric results by metric")
        .build(),
    evaluator_latency_ms: METER.f64_histogram("registry_evaluator_latency_ms")
        .with_description("Per-evaluator latency (ms)")
        .with_unit("ms")
        .build(),
    pipeline_latency_ms: METER.f64_histogram("registry_pipeline_latency_ms")
        .with_description("Fetch to verdict latency (ms)")
        .with_unit("ms")
        .build(),
    late_results_dropped_total: METER.u64_counter("registry_late_results_dropped_total")
        .with_description("Evaluators still running at the deadline")
        .build(),
});

pub(crate) fn record_outcome(outcome: &'static str, latency_ms: f64) {
    PIPELINE_METRICS.evaluations_total.add(1, &[KeyValue::new("outcome", outcome)]);
    PIPELINE_METRICS.pipeline_latency_ms.record(latency_ms, &[]);
}

pub(crate) fn record_metric(metric: &str, latency_ms: f64, errored: bool) {
    let attrs = [KeyValue::new("metric", metric.to_string())];
    PIPELINE_METRICS.evaluator_latency_ms.record(latency_ms, &attrs);
    if errored { PIPELINE_METRICS.evaluator_errors_total.add(1, &attrs); }
}

pub(crate) fn record_late(count: u64) {
    if count > 0 { PIPELINE_METRICS.late_results_dropped_total.add(count, &[]); }
}
