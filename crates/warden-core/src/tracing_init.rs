//! Shared tracing/logging initialization.
//!
//! The gate binary sets up `tracing_subscriber` with an env-filter and
//! optional JSON output. With the `metrics` feature an OpenTelemetry layer
//! is stacked on top when an OTLP endpoint is given.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"warden_gate=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = env_filter(default_filter);
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialise tracing and, when `metrics_endpoint` is set, the OTLP pipeline.
///
/// Returns the metrics guard that must be held for the process lifetime.
/// A failing exporter is logged and the process continues with plain logs.
#[cfg(feature = "metrics")]
pub fn init_tracing_with_metrics(
    default_filter: &str,
    log_json: bool,
    metrics_endpoint: Option<&str>,
) -> Option<crate::metrics::MetricsGuard> {
    let Some(endpoint) = metrics_endpoint else {
        init_tracing(default_filter, log_json);
        return None;
    };

    match crate::metrics::init_metrics(endpoint) {
        Ok(guard) => {
            let otel_layer = tracing_opentelemetry::layer().with_tracer(guard.tracer());
            let env_filter = env_filter(default_filter);
            if log_json {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .with(otel_layer)
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer())
                    .with(otel_layer)
                    .init();
            }
            tracing::info!(endpoint, "OpenTelemetry export enabled");
            Some(guard)
        }
        Err(e) => {
            init_tracing(default_filter, log_json);
            tracing::warn!(error = %e, endpoint, "Failed to start OpenTelemetry export");
            None
        }
    }
}

fn env_filter(default_filter: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    )
}
