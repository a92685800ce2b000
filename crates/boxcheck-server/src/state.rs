//! Application state shared across requests

use anyhow::Result;
use boxcheck_classifier::{Oracle, Orchestrator, VisionOracle};
use boxcheck_memory::{ExperienceStore, JsonlBackend};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::info;

use crate::config::ServerConfig;

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// Experience store
    pub store: Arc<ExperienceStore>,

    /// Classification orchestrator
    pub orchestrator: Arc<Orchestrator>,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// Open the on-disk store and connect the vision oracle
    pub fn new(config: ServerConfig, metrics_handle: PrometheusHandle) -> Result<Self> {
        info!("Initializing application state");

        let backend = JsonlBackend::open(&config.persistence)?;
        let store = Arc::new(ExperienceStore::open(config.store.clone(), Box::new(backend))?);

        if config.oracle.api_key.is_none() {
            info!("No vision API key configured; requests are sent unauthenticated");
        }
        let oracle: Arc<dyn Oracle> = Arc::new(VisionOracle::new(config.oracle.clone())?);
        info!("Vision oracle: {} at {}", oracle.name(), config.oracle.base_url);

        Ok(Self::with_parts(config, store, oracle, metrics_handle))
    }

    /// Assemble state from already-built parts
    pub fn with_parts(
        config: ServerConfig,
        store: Arc<ExperienceStore>,
        oracle: Arc<dyn Oracle>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            oracle,
            config.orchestrator.clone(),
        ));

        Self {
            config: Arc::new(config),
            store,
            orchestrator,
            metrics_handle,
        }
    }
}
