//! Experience store settings

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Thresholds that drive promotion, drift detection and retraining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Minimum confidence for a model verdict to join the training corpus
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Drift score above which the store is considered drifting
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: f64,

    /// Minimum corpus size before retraining is recommended
    #[serde(default = "default_retraining_sample_floor")]
    pub retraining_sample_floor: usize,

    /// Number of trailing records the drift score looks at
    #[serde(default = "default_drift_window")]
    pub drift_window: usize,

    /// Only the most recent N corpus members are context candidates (0 = all)
    #[serde(default)]
    pub context_pool: usize,

    /// Drift alerts kept in memory
    #[serde(default = "default_alert_log_capacity")]
    pub alert_log_capacity: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            drift_threshold: default_drift_threshold(),
            retraining_sample_floor: default_retraining_sample_floor(),
            drift_window: default_drift_window(),
            context_pool: 0,
            alert_log_capacity: default_alert_log_capacity(),
        }
    }
}

impl StoreSettings {
    /// Check that thresholds are usable
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("drift_threshold", self.drift_threshold),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(Error::config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        if self.drift_window == 0 {
            return Err(Error::config("drift_window must be at least 1"));
        }

        Ok(())
    }
}

fn default_confidence_threshold() -> f64 {
    0.85
}

fn default_drift_threshold() -> f64 {
    0.3
}

fn default_retraining_sample_floor() -> usize {
    50
}

fn default_drift_window() -> usize {
    100
}

fn default_alert_log_capacity() -> usize {
    100
}
