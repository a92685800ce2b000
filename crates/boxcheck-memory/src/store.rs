//! Experience store
//!
//! Owns the ordered record history and the views derived from it:
//! - the training corpus (records promoted at ingestion time)
//! - the trailing drift window and drift monitor
//! - the drift alert log
//!
//! Every mutation is persisted through the injected [`HistoryBackend`]
//! before it becomes visible in memory. Writers are serialized by a single
//! lock; readers share it and always see a complete snapshot.

use boxcheck_core::{Candidate, Record, Result, Source, StoreSettings};
use chrono::Utc;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::path::Path;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::drift::{DriftAlert, DriftMonitor, DriftState, DriftWindow};
use crate::export::render_jsonl;
use crate::persistence::{HistoryBackend, MemoryBackend};
use crate::statistics::StoreStatistics;

const ALERT_CHANNEL_CAPACITY: usize = 64;

/// Self-improving memory of past classifications
pub struct ExperienceStore {
    settings: StoreSettings,
    inner: RwLock<Inner>,
    alerts: broadcast::Sender<DriftAlert>,
}

struct Inner {
    backend: Box<dyn HistoryBackend>,
    history: Vec<Record>,
    /// Indices into `history` of promoted records, in insertion order
    corpus: Vec<usize>,
    window: DriftWindow,
    monitor: DriftMonitor,
    alert_log: VecDeque<DriftAlert>,
}

impl Inner {
    fn push(&mut self, record: Record, confidence_threshold: f64) {
        if record.promoted {
            self.corpus.push(self.history.len());
        }
        self.window.push(record.is_low_confidence(confidence_threshold));
        self.history.push(record);
    }

    fn corpus_records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.corpus.iter().map(|&index| &self.history[index])
    }
}

impl ExperienceStore {
    /// Open a store over `backend`, replaying its persisted history
    pub fn open(settings: StoreSettings, mut backend: Box<dyn HistoryBackend>) -> Result<Self> {
        settings.validate()?;

        let records = backend.load()?;
        let mut inner = Inner {
            backend,
            history: Vec::with_capacity(records.len()),
            corpus: Vec::new(),
            window: DriftWindow::new(settings.drift_window),
            monitor: DriftMonitor::new(settings.drift_threshold),
            alert_log: VecDeque::new(),
        };

        for record in records {
            inner.push(record, settings.confidence_threshold);
        }
        inner.monitor.restore(inner.window.score());

        info!(
            "Experience store opened on {} backend: {} records, {} in corpus, drift score {:.3}",
            inner.backend.name(),
            inner.history.len(),
            inner.corpus.len(),
            inner.window.score()
        );

        let (alerts, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Ok(Self {
            settings,
            inner: RwLock::new(inner),
            alerts,
        })
    }

    /// Open an empty store that keeps history in memory only
    pub fn in_memory(settings: StoreSettings) -> Result<Self> {
        Self::open(settings, Box::new(MemoryBackend::new()))
    }

    /// Store settings
    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Up to `n` corpus records, most confident first, newest first on ties
    pub fn retrieve_context(&self, n: usize) -> Vec<Record> {
        if n == 0 {
            return Vec::new();
        }

        let inner = self.inner.read();
        let pool = match self.settings.context_pool {
            0 => inner.corpus.len(),
            limit => limit.min(inner.corpus.len()),
        };

        let mut candidates: Vec<&Record> = inner.corpus[inner.corpus.len() - pool..]
            .iter()
            .map(|&index| &inner.history[index])
            .collect();
        candidates.sort_by(|a, b| context_order(a, b));

        candidates.into_iter().take(n).cloned().collect()
    }

    /// Record a classification result
    pub fn ingest(&self, candidate: Candidate) -> Result<Record> {
        candidate.validate()?;

        let threshold = self.settings.confidence_threshold;
        let promoted = candidate.source == Source::HumanFeedback
            || candidate.effective_confidence() >= threshold;

        let mut inner = self.inner.write();
        let id = inner.history.last().map_or(1, |last| last.id + 1);
        let created_at = match inner.history.last() {
            Some(last) if last.created_at > Utc::now() => last.created_at,
            _ => Utc::now(),
        };
        let record = Record::from_candidate(id, candidate, promoted, created_at);

        if let Err(e) = inner.backend.append(&record) {
            error!("Failed to persist record {}: {}", id, e);
            metrics::counter!("boxcheck_storage_failures_total").increment(1);
            return Err(e);
        }

        inner.push(record.clone(), threshold);
        let score = inner.window.score();
        let alert = inner.monitor.observe(score, id);

        debug!(
            "Ingested record {} ({}, {:.2}, promoted: {}), drift score {:.3}",
            id, record.label, record.confidence, promoted, score
        );
        metrics::counter!("boxcheck_ingestions_total", "source" => source_name(record.source))
            .increment(1);

        if let Some(alert) = alert {
            warn!(
                "Drift detected: low-confidence rate at {:.1}% after record {}",
                alert.drift_score * 100.0,
                id
            );
            metrics::counter!("boxcheck_drift_alerts_total").increment(1);

            if self.settings.alert_log_capacity > 0 {
                if inner.alert_log.len() == self.settings.alert_log_capacity {
                    inner.alert_log.pop_front();
                }
                inner.alert_log.push_back(alert.clone());
            }
            // No subscribers is fine
            let _ = self.alerts.send(alert);
        }

        Ok(record)
    }

    /// Fresh statistics computed from history
    pub fn statistics(&self) -> StoreStatistics {
        let inner = self.inner.read();
        StoreStatistics::compute(&inner.history, &self.settings)
    }

    /// Enough evidence and measurable degradation to justify retraining
    pub fn should_trigger_retraining(&self) -> bool {
        let inner = self.inner.read();
        inner.corpus.len() >= self.settings.retraining_sample_floor
            && inner.window.score() > self.settings.drift_threshold
    }

    /// Current drift score
    pub fn drift_score(&self) -> f64 {
        self.inner.read().window.score()
    }

    /// Current drift state
    pub fn drift_state(&self) -> DriftState {
        self.inner.read().monitor.state()
    }

    /// Serialize the training corpus, in insertion order, as JSON lines
    pub fn export_corpus(&self) -> Result<String> {
        let inner = self.inner.read();
        render_jsonl(inner.corpus_records())
    }

    /// Write the exported corpus to `path`, returning the example count
    pub fn export_to_file(&self, path: &Path) -> Result<usize> {
        let (content, count) = {
            let inner = self.inner.read();
            (render_jsonl(inner.corpus_records())?, inner.corpus.len())
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;

        info!("Exported {} training examples to {:?}", count, path);
        Ok(count)
    }

    /// Irreversibly clear history and every derived view
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.inner.write();
        inner.backend.clear()?;

        let cleared = inner.history.len();
        inner.history.clear();
        inner.corpus.clear();
        inner.window.clear();
        inner.monitor.reset();
        inner.alert_log.clear();

        warn!("Experience store reset, {} records removed", cleared);
        Ok(())
    }

    /// The last `limit` records, oldest first
    pub fn recent(&self, limit: usize) -> Vec<Record> {
        let inner = self.inner.read();
        let start = inner.history.len().saturating_sub(limit);
        inner.history[start..].to_vec()
    }

    /// The first `limit` corpus records
    pub fn corpus_preview(&self, limit: usize) -> Vec<Record> {
        let inner = self.inner.read();
        inner.corpus_records().take(limit).cloned().collect()
    }

    /// Every corpus record, in insertion order
    pub fn corpus(&self) -> Vec<Record> {
        let inner = self.inner.read();
        inner.corpus_records().cloned().collect()
    }

    /// Number of records in the training corpus
    pub fn corpus_len(&self) -> usize {
        self.inner.read().corpus.len()
    }

    /// Number of records in history
    pub fn len(&self) -> usize {
        self.inner.read().history.len()
    }

    /// Check if history is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().history.is_empty()
    }

    /// Drift alerts raised since the store was opened or reset
    pub fn drift_alerts(&self) -> Vec<DriftAlert> {
        self.inner.read().alert_log.iter().cloned().collect()
    }

    /// Subscribe to drift alerts as they are raised
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<DriftAlert> {
        self.alerts.subscribe()
    }
}

/// Descending confidence, then newest `created_at`, then highest id
fn context_order(a: &Record, b: &Record) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}

fn source_name(source: Source) -> &'static str {
    match source {
        Source::Model => "model",
        Source::HumanFeedback => "human_feedback",
    }
}
