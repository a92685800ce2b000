//! Drift detection
//!
//! The drift score is the share of low-confidence records in a trailing
//! window of history. The monitor flips between `Stable` and `Drifting` on
//! every observation, without hysteresis, and raises an alert only when it
//! enters `Drifting`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Trailing window with a running low-confidence count
#[derive(Debug, Clone)]
pub struct DriftWindow {
    capacity: usize,
    flags: VecDeque<bool>,
    low_count: usize,
}

impl DriftWindow {
    /// Create a window over the last `capacity` records
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            flags: VecDeque::with_capacity(capacity),
            low_count: 0,
        }
    }

    /// Add one observation, evicting the oldest when full
    pub fn push(&mut self, low_confidence: bool) {
        if self.flags.len() == self.capacity {
            if let Some(true) = self.flags.pop_front() {
                self.low_count -= 1;
            }
        }
        self.flags.push_back(low_confidence);
        if low_confidence {
            self.low_count += 1;
        }
    }

    /// Proportion of low-confidence observations (0.0 when empty)
    pub fn score(&self) -> f64 {
        if self.flags.is_empty() {
            0.0
        } else {
            self.low_count as f64 / self.flags.len() as f64
        }
    }

    /// Observations currently in the window
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Check if nothing has been observed
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Low-confidence observations currently in the window
    pub fn low_count(&self) -> usize {
        self.low_count
    }

    /// Forget every observation
    pub fn clear(&mut self) {
        self.flags.clear();
        self.low_count = 0;
    }
}

/// Drift monitor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriftState {
    /// drift score <= drift threshold
    #[default]
    Stable,
    /// drift score > drift threshold
    Drifting,
}

impl DriftState {
    /// State implied by a score
    pub fn classify(score: f64, threshold: f64) -> Self {
        if score > threshold {
            Self::Drifting
        } else {
            Self::Stable
        }
    }
}

/// Raised when the monitor enters `Drifting`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAlert {
    /// Drift score that triggered the alert
    pub drift_score: f64,

    /// Record whose ingestion caused the transition
    pub record_id: u64,

    /// When the alert was raised
    pub raised_at: DateTime<Utc>,
}

/// Two-state drift monitor
#[derive(Debug, Clone)]
pub struct DriftMonitor {
    threshold: f64,
    state: DriftState,
}

impl DriftMonitor {
    /// Create a monitor in the `Stable` state
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            state: DriftState::Stable,
        }
    }

    /// Current state
    pub fn state(&self) -> DriftState {
        self.state
    }

    /// Set the state from a score without raising anything (used on reload)
    pub fn restore(&mut self, score: f64) {
        self.state = DriftState::classify(score, self.threshold);
    }

    /// Evaluate a new score. Returns an alert on a Stable -> Drifting transition.
    pub fn observe(&mut self, score: f64, record_id: u64) -> Option<DriftAlert> {
        let next = DriftState::classify(score, self.threshold);
        let previous = std::mem::replace(&mut self.state, next);

        if previous == DriftState::Stable && next == DriftState::Drifting {
            Some(DriftAlert {
                drift_score: score,
                record_id,
                raised_at: Utc::now(),
            })
        } else {
            None
        }
    }

    /// Return to `Stable`
    pub fn reset(&mut self) {
        self.state = DriftState::Stable;
    }
}
