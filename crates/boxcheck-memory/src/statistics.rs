//! Store statistics, computed from history on demand

use boxcheck_core::{Label, Record, StoreSettings};
use serde::Serialize;

use crate::drift::DriftState;

/// Records looked at for the recent confidence trend
const TREND_WINDOW: usize = 10;

/// Per-label record counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelCounts {
    /// Records labelled OK
    pub ok: usize,

    /// Records labelled NEEDS_FIX
    pub needs_fix: usize,
}

/// Snapshot of the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStatistics {
    /// Records in history
    pub total_records: usize,

    /// Mean confidence over all history
    pub average_confidence: f64,

    /// Mean confidence over the last few records
    pub recent_confidence_trend: f64,

    /// Low-confidence records over all history
    pub low_confidence_cases: usize,

    /// Low-confidence share of the trailing drift window
    pub low_confidence_rate: f64,

    /// Records promoted into the training corpus
    pub training_corpus_size: usize,

    /// Current drift score
    pub drift_score: f64,

    /// Current drift state
    pub drift_state: DriftState,

    /// Records by label
    pub labels: LabelCounts,

    /// Records supplied by human reviewers
    pub feedback_count: usize,

    /// Whether the store recommends retraining
    pub retraining_recommended: bool,
}

impl StoreStatistics {
    /// Compute a fresh snapshot from `history`
    pub fn compute(history: &[Record], settings: &StoreSettings) -> Self {
        let threshold = settings.confidence_threshold;
        let total_records = history.len();

        let mut confidence_sum = 0.0;
        let mut low_confidence_cases = 0;
        let mut training_corpus_size = 0;
        let mut feedback_count = 0;
        let mut labels = LabelCounts::default();

        for record in history {
            confidence_sum += record.confidence;
            if record.is_low_confidence(threshold) {
                low_confidence_cases += 1;
            }
            if record.promoted {
                training_corpus_size += 1;
            }
            if record.is_feedback() {
                feedback_count += 1;
            }
            match record.label {
                Label::Ok => labels.ok += 1,
                Label::NeedsFix => labels.needs_fix += 1,
            }
        }

        let average_confidence = mean(confidence_sum, total_records);
        let recent_confidence_trend = if total_records >= TREND_WINDOW {
            let tail = &history[total_records - TREND_WINDOW..];
            mean(tail.iter().map(|r| r.confidence).sum(), TREND_WINDOW)
        } else {
            average_confidence
        };

        let drift_score = trailing_low_rate(history, settings);
        let retraining_recommended = training_corpus_size >= settings.retraining_sample_floor
            && drift_score > settings.drift_threshold;

        Self {
            total_records,
            average_confidence,
            recent_confidence_trend,
            low_confidence_cases,
            low_confidence_rate: drift_score,
            training_corpus_size,
            drift_score,
            drift_state: DriftState::classify(drift_score, settings.drift_threshold),
            labels,
            feedback_count,
            retraining_recommended,
        }
    }
}

/// Low-confidence share of the last `drift_window` records
pub fn trailing_low_rate(history: &[Record], settings: &StoreSettings) -> f64 {
    let start = history.len().saturating_sub(settings.drift_window);
    let window = &history[start..];
    let low = window
        .iter()
        .filter(|r| r.is_low_confidence(settings.confidence_threshold))
        .count();
    mean(low as f64, window.len())
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
