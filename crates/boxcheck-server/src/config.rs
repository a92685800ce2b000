//! Server configuration
//!
//! Sources, lowest priority first:
//! 1. built-in defaults
//! 2. YAML config file (optional)
//! 3. `BOXCHECK__<SECTION>__<KEY>` environment variables
//! 4. CLI flags

use boxcheck_classifier::{OrchestratorConfig, VisionConfig};
use boxcheck_core::StoreSettings;
use boxcheck_memory::PersistenceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::Cli;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// History file location
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Export file name, written inside the data directory
    #[serde(default = "default_export_file")]
    pub export_file: String,

    /// Promotion, drift and retraining thresholds
    #[serde(default)]
    pub store: StoreSettings,

    /// Context, retry and timeout settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Vision model endpoint
    #[serde(default)]
    pub oracle: VisionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            persistence: PersistenceConfig::default(),
            export_file: default_export_file(),
            store: StoreSettings::default(),
            orchestrator: OrchestratorConfig::default(),
            oracle: VisionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file, environment and CLI overrides
    pub fn load(config_path: &Path, cli: &Cli) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();

        if config_path.exists() {
            info!("Loading configuration from {:?}", config_path);
            builder = builder.add_source(config::File::from(config_path));
        } else {
            info!("No config file at {:?}, using defaults", config_path);
        }

        let mut config: Self = builder
            .add_source(
                config::Environment::with_prefix("BOXCHECK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.apply_cli(cli);
        config.store.validate()?;
        Ok(config)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(ref listen) = cli.listen {
            self.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(ref data_dir) = cli.data_dir {
            self.persistence.data_dir = data_dir.clone();
        }
        if let Some(threshold) = cli.confidence_threshold {
            self.store.confidence_threshold = threshold;
        }
        if let Some(threshold) = cli.drift_threshold {
            self.store.drift_threshold = threshold;
        }
        if let Some(floor) = cli.retraining_sample_floor {
            self.store.retraining_sample_floor = floor;
        }
        if let Some(ref key) = cli.api_key {
            self.oracle.api_key = Some(key.clone());
        }
    }

    /// Where `POST /v1/export` writes the corpus
    pub fn export_path(&self) -> PathBuf {
        self.persistence.data_dir.join(&self.export_file)
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7861
}

fn default_export_file() -> String {
    "training_data.jsonl".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults_without_file() {
        let cli = Cli::parse_from(["boxcheck-server"]);
        let config = ServerConfig::load(Path::new("/nonexistent/boxcheck.yaml"), &cli).unwrap();

        assert_eq!(config.port, 7861);
        assert_eq!(config.store.confidence_threshold, 0.85);
        assert_eq!(config.orchestrator.context_examples, 5);
        assert_eq!(config.export_path(), PathBuf::from("./data/training_data.jsonl"));
    }

    #[test]
    fn test_file_and_cli_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("boxcheck.yaml");
        std::fs::write(
            &path,
            "port: 9000\nstore:\n  drift_threshold: 0.4\n  drift_window: 20\norchestrator:\n  max_retries: 3\n",
        )
        .unwrap();

        let cli = Cli::parse_from(["boxcheck-server", "--confidence-threshold", "0.9"]);
        let config = ServerConfig::load(&path, &cli).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.store.drift_threshold, 0.4);
        assert_eq!(config.store.drift_window, 20);
        assert_eq!(config.store.confidence_threshold, 0.9);
        assert_eq!(config.orchestrator.max_retries, 3);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let cli = Cli::parse_from(["boxcheck-server", "--drift-threshold", "1.5"]);
        assert!(ServerConfig::load(Path::new("/nonexistent/boxcheck.yaml"), &cli).is_err());
    }
}
