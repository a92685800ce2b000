//! BoxCheck Server
//!
//! Classifies shipping box photos as OK or NEEDS_FIX, remembers every
//! decision, and watches the stream of confidences for drift.

use anyhow::Result;
use boxcheck_memory::ExperienceStore;
use boxcheck_server::{create_router, AppState, Cli, ServerConfig};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("Starting BoxCheck Server");

    let config = ServerConfig::load(&cli.config, &cli)?;
    info!("Configuration loaded successfully");
    info!("Data directory: {:?}", config.persistence.data_dir);
    info!(
        "Thresholds: confidence {:.2}, drift {:.2}, retraining floor {}",
        config.store.confidence_threshold,
        config.store.drift_threshold,
        config.store.retraining_sample_floor
    );

    let metrics_handle = init_metrics()?;

    let addr: SocketAddr = format!("{}:{}", config.listen, config.port).parse()?;
    let state = AppState::new(config, metrics_handle)?;
    info!(
        "Experience store loaded: {} records, {} in training corpus",
        state.store.len(),
        state.store.corpus_len()
    );

    tokio::spawn(watch_drift(Arc::clone(&state.store)));

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("BoxCheck listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Log drift alerts and retraining recommendations as they happen
async fn watch_drift(store: Arc<ExperienceStore>) {
    let mut alerts = store.subscribe_alerts();

    loop {
        match alerts.recv().await {
            Ok(alert) => {
                warn!(
                    "Drift alert after record {}: {:.1}% low-confidence",
                    alert.record_id,
                    alert.drift_score * 100.0
                );
                if store.should_trigger_retraining() {
                    info!(
                        "Retraining recommended: {} examples in training corpus",
                        store.corpus_len()
                    );
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Drift watcher lagged, skipped {} alerts", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("boxcheck_server=debug,boxcheck_memory=debug,boxcheck_classifier=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("boxcheck_server=info,boxcheck_memory=info,boxcheck_classifier=info")
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "boxcheck_evaluations_total",
        "Total number of classification requests by outcome"
    );
    metrics::describe_counter!(
        "boxcheck_oracle_failures_total",
        "Classification requests where the vision model gave no verdict"
    );
    metrics::describe_counter!(
        "boxcheck_ingestions_total",
        "Records appended to history by source and promotion"
    );
    metrics::describe_counter!(
        "boxcheck_storage_failures_total",
        "Ingestions rejected because history could not be persisted"
    );
    metrics::describe_counter!(
        "boxcheck_drift_alerts_total",
        "Transitions into the drifting state"
    );
    metrics::describe_histogram!(
        "boxcheck_oracle_latency_us",
        metrics::Unit::Microseconds,
        "Vision model latency in microseconds, retries included"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
