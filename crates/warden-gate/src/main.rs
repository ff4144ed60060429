//! Warden Gate
//!
//! HTTP service that quarantines instances on detection events and restores
//! them through signed approval links.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use warden_core::Config;
use warden_core::config::{default_database_path, load_config};
use warden_core::db::unix_timestamp;
use warden_gate::clock::{Clock, SystemClock};
use warden_gate::gate::{ApprovalGate, GateSettings};
use warden_gate::issuer::{IssuerSettings, TokenIssuer};
use warden_gate::notifications::{LogNotifier, Notifier, WebhookNotifier};
use warden_gate::quarantine::{QuarantineOrchestrator, QuarantineSettings};
use warden_gate::resources::{HttpResourceConfig, HttpResourceControl, ResourceControl};
use warden_gate::responder::IncidentResponder;
use warden_gate::restore::{RestoreOrchestrator, RestoreSettings, SpawnDispatcher};
use warden_gate::secrets::{FileSecretStore, SecretStore};
use warden_gate::server::{AppState, build_router};
use warden_gate::storage::{GateDatabase, TokenStore};

/// Token records this far past expiry are purged.
const PURGE_RETENTION_SECS: i64 = 7 * 24 * 3600;

#[derive(Parser, Debug)]
#[command(name = "warden-gate")]
#[command(version, about = "Warden gate - instance quarantine and signed-approval restore")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080", env = "WARDEN_LISTEN_ADDR")]
    addr: SocketAddr,

    /// JSON config file layered over the global settings.
    #[arg(long, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the token database.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Security group that isolates quarantined interfaces.
    #[arg(long)]
    blocking_sg_id: Option<String>,

    /// Public URL of `/approve`, embedded in approval links.
    #[arg(long)]
    approval_base_url: Option<String>,

    /// Approval link lifetime in minutes.
    #[arg(long)]
    expire_minutes: Option<i64>,

    /// Path of the file holding the link-signing secret.
    #[arg(long)]
    secret_ref: Option<String>,

    /// Webhook receiving notifications. Notifications are only logged without it.
    #[arg(long)]
    notify_webhook_url: Option<String>,

    /// Resource-control API base URL.
    #[arg(long)]
    resource_endpoint: Option<String>,

    /// Resource-control API bearer token.
    #[arg(long)]
    resource_token: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "WARDEN_LOG_JSON")]
    log_json: bool,

    /// OpenTelemetry OTLP endpoint for traces and metrics export
    /// (e.g. `http://localhost:4317`). Requires the `metrics` feature.
    #[cfg(feature = "metrics")]
    #[arg(long, env = "WARDEN_METRICS_ENDPOINT")]
    metrics_endpoint: Option<String>,
}

impl Args {
    /// CLI flags take precedence over every config layer.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(v) = &self.db_path {
            config.approval.database_path = Some(v.clone());
        }
        if let Some(v) = &self.blocking_sg_id {
            config.quarantine.blocking_group_id = Some(v.clone());
        }
        if let Some(v) = &self.approval_base_url {
            config.approval.base_url = Some(v.clone());
        }
        if let Some(v) = self.expire_minutes {
            config.approval.ttl_minutes = v;
        }
        if let Some(v) = &self.secret_ref {
            config.approval.secret_ref = Some(v.clone());
        }
        if let Some(v) = &self.notify_webhook_url {
            config.notifications.webhook_url = Some(v.clone());
        }
        if let Some(v) = &self.resource_endpoint {
            config.resource_control.endpoint = Some(v.clone());
        }
        if let Some(v) = &self.resource_token {
            config.resource_control.api_token = Some(v.clone());
        }
    }
}

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    #[cfg(feature = "metrics")]
    let metrics_guard = warden_core::tracing_init::init_tracing_with_metrics(
        "warden_gate=info",
        args.log_json,
        args.metrics_endpoint.as_deref(),
    );
    #[cfg(not(feature = "metrics"))]
    warden_core::tracing_init::init_tracing("warden_gate=info", args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting warden-gate"
    );

    let mut config = load_config(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    let quarantine_settings = QuarantineSettings::from_config(&config)?;

    let db_path = config
        .approval
        .database_path
        .clone()
        .or_else(default_database_path)
        .context("Cannot determine token database path; pass --db-path")?;
    info!(path = %db_path.display(), "Opening token database");
    let db = GateDatabase::open(&db_path).await?;

    let endpoint = config
        .resource_control
        .endpoint
        .clone()
        .context("resource_control.endpoint is not set")?;
    let resources: Arc<dyn ResourceControl> = Arc::new(HttpResourceControl::new(
        &HttpResourceConfig {
            endpoint,
            api_token: config.resource_control.api_token.clone(),
        },
    )?);

    let notifier: Arc<dyn Notifier> = match config.notifications.webhook_url.as_deref() {
        Some(url) if !url.trim().is_empty() => Arc::new(WebhookNotifier::new(url)?),
        _ => {
            warn!("No notification webhook configured; notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    let store: Arc<dyn TokenStore> = Arc::new(db.clone());
    let secrets: Arc<dyn SecretStore> = Arc::new(FileSecretStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let issuer = match (
        config.approval.base_url.as_deref().filter(|u| !u.trim().is_empty()),
        config.approval.secret_ref.as_deref().filter(|s| !s.trim().is_empty()),
    ) {
        (Some(base_url), Some(secret_ref)) => Some(Arc::new(TokenIssuer::new(
            Arc::clone(&store),
            Arc::clone(&secrets),
            Arc::clone(&clock),
            IssuerSettings::new(base_url, secret_ref, config.approval.ttl_minutes)?,
        ))),
        (Some(_), None) => {
            warn!("Approval base URL set without a secret reference; approval links disabled");
            None
        }
        (None, _) => None,
    };

    let quarantine = Arc::new(QuarantineOrchestrator::new(
        Arc::clone(&resources),
        quarantine_settings,
    ));
    let restore = Arc::new(RestoreOrchestrator::new(
        Arc::clone(&resources),
        Arc::clone(&notifier),
        RestoreSettings::from_config(&config),
    ));
    let responder = IncidentResponder::new(
        quarantine,
        issuer,
        Arc::clone(&notifier),
        config.notifications.quarantined_subject.clone(),
    )
    .with_sample_override(config.quarantine.sample_instance_override.clone());
    let gate = ApprovalGate::new(
        store,
        secrets,
        Arc::new(SpawnDispatcher::new(Arc::clone(&restore))),
        clock,
        GateSettings {
            token_store: Some(db_path.display().to_string()),
            secret_ref: config.approval.secret_ref.clone(),
        },
    );

    // Spawn background task to purge long-expired token records (hourly)
    let purge_db = db.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            match purge_db
                .purge_expired(unix_timestamp() - PURGE_RETENTION_SECS)
                .await
            {
                Ok(removed) if removed > 0 => {
                    info!(removed, "Expired approval tokens purged");
                }
                Err(e) => {
                    warn!(error = %e, "Approval token purge failed");
                }
                _ => {}
            }
        }
    });

    let app = build_router(AppState {
        gate: Arc::new(gate),
        responder: Arc::new(responder),
        restore,
    });
    let listener = tokio::net::TcpListener::bind(args.addr).await?;

    // Notify systemd that the gate is ready to serve (unix only).
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    info!(addr = %args.addr, "HTTP server ready");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    #[cfg(feature = "metrics")]
    if let Some(guard) = metrics_guard {
        if let Err(e) = guard.shutdown() {
            warn!(error = %e, "OpenTelemetry shutdown failed");
        }
    }

    info!("Gate stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        () = sigterm => {
            info!("Received SIGTERM shutdown signal");
        }
    }
}
