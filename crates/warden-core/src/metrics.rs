//! Shared `OpenTelemetry` metrics initialisation.
//!
//! This module is only compiled when the `metrics` Cargo feature is enabled.
//! It sets up the OTLP exporter for both traces and metrics and exposes the
//! counters recorded by the approval gate and the orchestrators.

use std::sync::OnceLock;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{SdkTracerProvider, Tracer};

/// Errors that can occur during metrics / tracing pipeline initialisation.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to build an OTLP exporter.
    #[error("failed to build OTLP exporter: {0}")]
    ExporterBuild(#[from] opentelemetry_otlp::ExporterBuildError),

    /// Failed during `OTel` SDK shutdown or flush.
    #[error("OpenTelemetry SDK error: {0}")]
    Sdk(#[from] opentelemetry_sdk::error::OTelSdkError),
}

/// Opaque handle that keeps the `OpenTelemetry` providers alive.
///
/// When dropped, the providers are **not** shut down automatically -- call
/// [`MetricsGuard::shutdown`] for a graceful flush before exiting.
pub struct MetricsGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl MetricsGuard {
    /// Tracer used by the `tracing-opentelemetry` layer.
    pub fn tracer(&self) -> Tracer {
        self.tracer_provider.tracer("warden")
    }

    /// Gracefully shut down both providers, flushing any buffered telemetry.
    ///
    /// # Errors
    ///
    /// Returns an error if either provider fails to shut down cleanly.
    pub fn shutdown(self) -> Result<(), MetricsError> {
        self.tracer_provider.shutdown()?;
        self.meter_provider.shutdown()?;
        Ok(())
    }
}

/// Initialise the `OpenTelemetry` OTLP pipeline for traces **and** metrics.
///
/// * `endpoint` -- OTLP receiver URL, e.g. `"http://localhost:4317"` (gRPC).
///
/// # Errors
///
/// Returns [`MetricsError`] if the OTLP exporters cannot be constructed.
pub fn init_metrics(endpoint: &str) -> Result<MetricsGuard, MetricsError> {
    let trace_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(trace_exporter)
        .build();

    global::set_tracer_provider(tracer_provider.clone());

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let meter_provider = SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .build();

    global::set_meter_provider(meter_provider.clone());

    Ok(MetricsGuard {
        tracer_provider,
        meter_provider,
    })
}

fn gate_outcomes() -> &'static Counter<u64> {
    static COUNTER: OnceLock<Counter<u64>> = OnceLock::new();
    COUNTER.get_or_init(|| {
        global::meter("warden")
            .u64_counter("warden.gate.outcomes")
            .with_description("Approval gate decisions by outcome")
            .build()
    })
}

fn restore_results() -> &'static Counter<u64> {
    static COUNTER: OnceLock<Counter<u64>> = OnceLock::new();
    COUNTER.get_or_init(|| {
        global::meter("warden")
            .u64_counter("warden.restore.instances")
            .with_description("Instances processed by the restore orchestrator by result")
            .build()
    })
}

/// Count one approval-gate decision.
pub fn record_gate_outcome(outcome: &'static str) {
    gate_outcomes().add(1, &[KeyValue::new("outcome", outcome)]);
}

/// Count one restore result (`restored`, `skipped` or `failed`).
pub fn record_restore_result(result: &'static str) {
    restore_results().add(1, &[KeyValue::new("result", result)]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn init_metrics_does_not_panic() {
        // The exporter fails at send-time without a collector; construction
        // and shutdown must still succeed.
        let guard = init_metrics("http://localhost:4317").unwrap();
        record_gate_outcome("authorized");
        record_restore_result("skipped");
        guard.shutdown().unwrap();
    }
}
