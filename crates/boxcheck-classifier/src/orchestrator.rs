//! Classification orchestrator
//!
//! Runs one evaluation end to end:
//! 1. fetch context from the experience store (read lock, released at once)
//! 2. call the oracle with no store lock held, retrying transient failures
//! 3. ingest the verdict, unless the call failed or the caller went away

use boxcheck_core::{Candidate, Error, Label, Record, Result};
use boxcheck_memory::{DriftState, ExperienceStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::oracle::{Oracle, OracleContext, Verdict};
use crate::prompt::ContextFormatter;

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Prior decisions offered to the oracle
    #[serde(default = "default_context_examples")]
    pub context_examples: usize,

    /// Extra attempts after a transient oracle failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between attempts (milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Budget for a single oracle attempt (milliseconds)
    #[serde(default = "default_oracle_timeout_ms")]
    pub oracle_timeout_ms: u64,

    /// Per-reason limit in the context block (chars)
    #[serde(default = "default_max_reason_chars")]
    pub max_reason_chars: usize,

    /// Whole context block limit (chars)
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            context_examples: default_context_examples(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            oracle_timeout_ms: default_oracle_timeout_ms(),
            max_reason_chars: default_max_reason_chars(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_context_examples() -> usize {
    5
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_oracle_timeout_ms() -> u64 {
    30_000
}

fn default_max_reason_chars() -> usize {
    200
}

fn default_max_context_chars() -> usize {
    2_000
}

/// Outcome of a successful evaluation
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    /// The ingested record
    pub record: Record,

    /// Confidence fell below the promotion threshold
    pub should_review: bool,

    /// Prior decisions shown to the oracle
    pub context_examples: usize,

    /// Oracle attempts used
    pub attempts: u32,

    /// Total oracle latency in microseconds
    pub latency_us: u64,
}

/// Glue between the experience store and an oracle
pub struct Orchestrator {
    store: Arc<ExperienceStore>,
    oracle: Arc<dyn Oracle>,
    config: OrchestratorConfig,
    formatter: ContextFormatter,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(
        store: Arc<ExperienceStore>,
        oracle: Arc<dyn Oracle>,
        config: OrchestratorConfig,
    ) -> Self {
        let formatter = ContextFormatter::new(config.max_reason_chars, config.max_context_chars);
        info!(
            "Orchestrator ready: oracle {}, {} context examples, {} retries",
            oracle.name(),
            config.context_examples,
            config.max_retries
        );

        Self {
            store,
            oracle,
            config,
            formatter,
        }
    }

    /// The experience store this orchestrator feeds
    pub fn store(&self) -> &Arc<ExperienceStore> {
        &self.store
    }

    /// Orchestrator settings
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Classify an image and record the verdict
    pub async fn evaluate(&self, image: &[u8]) -> Result<Evaluation> {
        self.evaluate_with_cancel(image, &CancellationToken::new())
            .await
    }

    /// Like [`Orchestrator::evaluate`], abandoning the call when `cancel` fires.
    /// An abandoned call never reaches the store.
    pub async fn evaluate_with_cancel(
        &self,
        image: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Evaluation> {
        let context = self.build_context();
        debug!(
            "Evaluating image ({} bytes) with {} context examples",
            image.len(),
            context.example_count
        );

        let start = Instant::now();
        let outcome = self.call_oracle(image, &context, cancel).await;
        let latency_us = start.elapsed().as_micros() as u64;
        metrics::histogram!("boxcheck_oracle_latency_us").record(latency_us as f64);

        let (verdict, attempts) = match outcome {
            Ok(ok) => ok,
            Err(e) => {
                let outcome = if matches!(e, Error::Cancelled) {
                    "cancelled"
                } else {
                    metrics::counter!("boxcheck_oracle_failures_total").increment(1);
                    "oracle_failure"
                };
                metrics::counter!("boxcheck_evaluations_total", "outcome" => outcome).increment(1);
                return Err(e);
            }
        };

        // Late answers for abandoned calls are dropped
        if cancel.is_cancelled() {
            metrics::counter!("boxcheck_evaluations_total", "outcome" => "cancelled").increment(1);
            return Err(Error::Cancelled);
        }

        let record = self.ingest(verdict.into_candidate()).await?;
        let should_review = record.confidence < self.store.settings().confidence_threshold;
        metrics::counter!("boxcheck_evaluations_total", "outcome" => "recorded").increment(1);

        info!(
            "Classified record {}: {} (confidence {:.2}, review: {})",
            record.id, record.label, record.confidence, should_review
        );

        Ok(Evaluation {
            record,
            should_review,
            context_examples: context.example_count,
            attempts,
            latency_us,
        })
    }

    /// Record a human correction. Always promoted into the training corpus.
    pub async fn submit_feedback(
        &self,
        label: Label,
        image_ref: Option<String>,
        reviewer: Option<&str>,
    ) -> Result<Record> {
        let reason = match reviewer {
            Some(reviewer) => format!("Human feedback from {reviewer}"),
            None => "Human feedback".to_string(),
        };

        let mut candidate = Candidate::feedback(label, reason);
        candidate.image_ref = image_ref;

        let record = self.ingest(candidate).await?;
        info!("Recorded feedback {}: {}", record.id, record.label);
        Ok(record)
    }

    fn build_context(&self) -> OracleContext {
        let records = self.store.retrieve_context(self.config.context_examples);
        let (examples, example_count) = self.formatter.format(&records);

        OracleContext {
            examples,
            example_count,
            drifting: self.store.drift_state() == DriftState::Drifting,
        }
    }

    async fn call_oracle(
        &self,
        image: &[u8],
        context: &OracleContext,
        cancel: &CancellationToken,
    ) -> Result<(Verdict, u32)> {
        let timeout = Duration::from_millis(self.config.oracle_timeout_ms);
        let backoff = Duration::from_millis(self.config.retry_backoff_ms);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = tokio::time::timeout(timeout, self.oracle.classify(image, context)) => {
                    result.unwrap_or(Err(Error::Timeout))
                }
            };

            match result {
                Ok(verdict) => {
                    if let Err(e) = verdict.validate() {
                        warn!("Oracle {} returned an unusable verdict: {}", self.oracle.name(), e);
                        return Err(e);
                    }
                    return Ok((verdict, attempt));
                }
                Err(e) if e.is_transient() && attempt <= self.config.max_retries => {
                    warn!(
                        "Oracle {} attempt {} failed, retrying: {}",
                        self.oracle.name(),
                        attempt,
                        e
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(e) => {
                    warn!(
                        "Oracle {} failed after {} attempt(s): {}",
                        self.oracle.name(),
                        attempt,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Ingest off the async runtime; the append waits on an fsync
    async fn ingest(&self, candidate: Candidate) -> Result<Record> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.ingest(candidate))
            .await
            .map_err(|e| Error::Storage(std::io::Error::other(e)))?
    }
}
