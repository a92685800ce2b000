//! Mock oracles for testing
//!
//! Provides configurable mock implementations of the Oracle trait for
//! testing the orchestrator's context handling, retries, cancellation and
//! failure isolation.

use async_trait::async_trait;
use boxcheck_classifier::{Oracle, OracleContext, Orchestrator, OrchestratorConfig, Verdict};
use boxcheck_core::{Error, FailureSignal, Label, Result, Source, StoreSettings};
use boxcheck_memory::{DriftState, ExperienceStore, MemoryBackend};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What an oracle saw on one call
#[derive(Debug, Clone)]
pub struct Recorded {
    pub image_len: usize,
    pub context: OracleContext,
}

/// An oracle that replays scripted outcomes, then repeats a default verdict
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<Verdict>>>,
    default: Verdict,
    latency: Option<Duration>,
    calls: AtomicU32,
    seen: Mutex<Vec<Recorded>>,
}

impl ScriptedOracle {
    /// Always answer with `verdict`
    pub fn answering(verdict: Verdict) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: verdict,
            latency: None,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Play `outcomes` before falling back to the default verdict
    pub fn with_script(self, outcomes: Vec<Result<Verdict>>) -> Self {
        *self.script.lock().unwrap() = outcomes.into();
        self
    }

    /// Set simulated latency for every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Get the number of times classify was called
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Contexts passed to classify, in call order
    pub fn seen(&self) -> Vec<Recorded> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn classify(&self, image: &[u8], context: &OracleContext) -> Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(Recorded {
            image_len: image.len(),
            context: context.clone(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.default.clone()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn verdict(label: Label, confidence: f64) -> Verdict {
    Verdict::new(label, confidence, format!("{label} at {confidence}"))
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        retry_backoff_ms: 1,
        ..Default::default()
    }
}

fn setup(oracle: ScriptedOracle, config: OrchestratorConfig) -> (Orchestrator, Arc<ScriptedOracle>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let store = Arc::new(ExperienceStore::in_memory(StoreSettings::default()).unwrap());
    let oracle = Arc::new(oracle);
    let orchestrator = Orchestrator::new(store, oracle.clone(), config);
    (orchestrator, oracle)
}

#[tokio::test]
async fn test_evaluate_records_verdict() {
    let (orchestrator, oracle) = setup(
        ScriptedOracle::answering(verdict(Label::Ok, 0.93).with_damage_types(["scuff"])),
        fast_config(),
    );

    let evaluation = orchestrator.evaluate(b"jpeg bytes").await.unwrap();

    assert_eq!(evaluation.record.id, 1);
    assert_eq!(evaluation.record.label, Label::Ok);
    assert_eq!(evaluation.record.source, Source::Model);
    assert_eq!(evaluation.record.damage_types, vec!["scuff"]);
    assert!(evaluation.record.promoted);
    assert!(!evaluation.should_review);
    assert_eq!(evaluation.attempts, 1);
    assert_eq!(oracle.call_count(), 1);
    assert_eq!(oracle.seen()[0].image_len, 10);
    assert_eq!(orchestrator.store().len(), 1);
}

#[tokio::test]
async fn test_low_confidence_flags_review() {
    let (orchestrator, _) = setup(
        ScriptedOracle::answering(verdict(Label::NeedsFix, 0.6)),
        fast_config(),
    );

    let evaluation = orchestrator.evaluate(b"img").await.unwrap();
    assert!(evaluation.should_review);
    assert!(!evaluation.record.promoted);
    assert_eq!(orchestrator.store().corpus_len(), 0);
}

#[tokio::test]
async fn test_context_is_most_confident_first() {
    let (orchestrator, oracle) = setup(
        ScriptedOracle::answering(verdict(Label::Ok, 0.9)).with_script(vec![
            Ok(verdict(Label::Ok, 0.88)),
            Ok(verdict(Label::NeedsFix, 0.97)),
            Ok(verdict(Label::Ok, 0.4)),
        ]),
        fast_config(),
    );

    for _ in 0..4 {
        orchestrator.evaluate(b"img").await.unwrap();
    }

    let seen = oracle.seen();
    assert_eq!(seen[0].context.example_count, 0);
    assert_eq!(seen[0].context.examples, "No previous examples available.");

    let last = &seen[3].context;
    assert_eq!(last.example_count, 2);
    let first_entry = last.examples.find("NEEDS_FIX (Confidence: 0.97)").unwrap();
    let second_entry = last.examples.find("OK (Confidence: 0.88)").unwrap();
    assert!(first_entry < second_entry);
    assert!(!last.examples.contains("0.40"));
}

#[tokio::test]
async fn test_context_limited_to_five() {
    let (orchestrator, oracle) = setup(
        ScriptedOracle::answering(verdict(Label::Ok, 0.95)),
        fast_config(),
    );

    for _ in 0..8 {
        orchestrator.evaluate(b"img").await.unwrap();
    }

    let seen = oracle.seen();
    assert_eq!(seen[7].context.example_count, 5);
}

#[tokio::test]
async fn test_oracle_failure_leaves_history_unchanged() {
    let (orchestrator, oracle) = setup(
        ScriptedOracle::answering(verdict(Label::Ok, 0.9))
            .with_script(vec![
                Ok(verdict(Label::Ok, 0.9)),
                Err(Error::oracle_permanent("malformed response")),
            ]),
        fast_config(),
    );

    orchestrator.evaluate(b"img").await.unwrap();
    let before = orchestrator.store().len();

    let result = orchestrator.evaluate(b"img").await;
    let err = result.unwrap_err();
    assert!(matches!(err, Error::Oracle { transient: false, .. }));
    assert_eq!(err.signal(), FailureSignal::TryAgain);
    assert_eq!(orchestrator.store().len(), before);
    assert_eq!(oracle.call_count(), 2);
}

#[tokio::test]
async fn test_out_of_range_verdict_is_oracle_failure() {
    for bad in [1.3, f64::NAN] {
        let (orchestrator, oracle) = setup(
            ScriptedOracle::answering(verdict(Label::Ok, bad)),
            fast_config(),
        );

        let err = orchestrator.evaluate(b"img").await.unwrap_err();
        assert!(matches!(err, Error::Oracle { transient: false, .. }));
        assert_eq!(err.signal(), FailureSignal::TryAgain);
        assert!(orchestrator.store().is_empty());
        assert_eq!(oracle.call_count(), 1);
    }
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let (orchestrator, oracle) = setup(
        ScriptedOracle::answering(verdict(Label::Ok, 0.9))
            .with_script(vec![Err(Error::oracle_transient("503"))]),
        fast_config(),
    );

    let evaluation = orchestrator.evaluate(b"img").await.unwrap();
    assert_eq!(evaluation.attempts, 2);
    assert_eq!(oracle.call_count(), 2);
    assert_eq!(orchestrator.store().len(), 1);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let config = OrchestratorConfig {
        max_retries: 2,
        retry_backoff_ms: 1,
        ..Default::default()
    };
    let (orchestrator, oracle) = setup(
        ScriptedOracle::answering(verdict(Label::Ok, 0.9)).with_script(vec![
            Err(Error::oracle_transient("503")),
            Err(Error::oracle_transient("503")),
            Err(Error::oracle_transient("503")),
        ]),
        config,
    );

    let result = orchestrator.evaluate(b"img").await;
    assert!(matches!(result, Err(Error::Oracle { transient: true, .. })));
    assert_eq!(oracle.call_count(), 3);
    assert!(orchestrator.store().is_empty());
}

#[tokio::test]
async fn test_no_retries_when_disabled() {
    let config = OrchestratorConfig {
        max_retries: 0,
        ..fast_config()
    };
    let (orchestrator, oracle) = setup(
        ScriptedOracle::answering(verdict(Label::Ok, 0.9))
            .with_script(vec![Err(Error::oracle_transient("503"))]),
        config,
    );

    assert!(orchestrator.evaluate(b"img").await.is_err());
    assert_eq!(oracle.call_count(), 1);
}

#[tokio::test]
async fn test_timeout_is_not_ingested() {
    let config = OrchestratorConfig {
        max_retries: 0,
        oracle_timeout_ms: 20,
        ..fast_config()
    };
    let (orchestrator, _) = setup(
        ScriptedOracle::answering(verdict(Label::Ok, 0.9)).with_latency(Duration::from_secs(5)),
        config,
    );

    let result = orchestrator.evaluate(b"img").await;
    assert!(matches!(result, Err(Error::Timeout)));
    assert!(orchestrator.store().is_empty());
}

#[tokio::test]
async fn test_cancelled_evaluation_is_not_ingested() {
    let (orchestrator, _) = setup(
        ScriptedOracle::answering(verdict(Label::Ok, 0.9)).with_latency(Duration::from_secs(5)),
        fast_config(),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = orchestrator.evaluate_with_cancel(b"img", &cancel).await;
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(orchestrator.store().is_empty());
}

#[tokio::test]
async fn test_dropped_evaluation_is_not_ingested() {
    let (orchestrator, _) = setup(
        ScriptedOracle::answering(verdict(Label::Ok, 0.9)).with_latency(Duration::from_secs(5)),
        fast_config(),
    );

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), orchestrator.evaluate(b"img")).await;
    assert!(abandoned.is_err());
    assert!(orchestrator.store().is_empty());
}

#[tokio::test]
async fn test_feedback_is_always_promoted() {
    let (orchestrator, oracle) = setup(
        ScriptedOracle::answering(verdict(Label::Ok, 0.9)),
        fast_config(),
    );

    let record = orchestrator
        .submit_feedback(Label::NeedsFix, Some("img_42.jpg".to_string()), Some("driver-7"))
        .await
        .unwrap();

    assert_eq!(record.source, Source::HumanFeedback);
    assert_eq!(record.confidence, 1.0);
    assert!(record.promoted);
    assert_eq!(record.reason, "Human feedback from driver-7");
    assert_eq!(record.image_ref.as_deref(), Some("img_42.jpg"));
    assert_eq!(oracle.call_count(), 0);
    assert_eq!(orchestrator.store().corpus_len(), 1);
}

#[tokio::test]
async fn test_storage_failure_surfaces_as_unavailable() {
    let backend = MemoryBackend::new();
    let switch = backend.failure_switch();
    let store =
        Arc::new(ExperienceStore::open(StoreSettings::default(), Box::new(backend)).unwrap());
    let oracle = Arc::new(ScriptedOracle::answering(verdict(Label::Ok, 0.9)));
    let orchestrator = Orchestrator::new(store.clone(), oracle, fast_config());

    switch.store(true, Ordering::SeqCst);
    let err = orchestrator.evaluate(b"img").await.unwrap_err();

    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(err.signal(), FailureSignal::Unavailable);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_drift_reaches_the_prompt() {
    let settings = StoreSettings {
        drift_window: 2,
        ..Default::default()
    };
    let store = Arc::new(ExperienceStore::in_memory(settings).unwrap());
    let oracle = Arc::new(ScriptedOracle::answering(verdict(Label::NeedsFix, 0.2)));
    let orchestrator = Orchestrator::new(store.clone(), oracle.clone(), fast_config());

    orchestrator.evaluate(b"img").await.unwrap();
    assert_eq!(store.drift_state(), DriftState::Drifting);
    orchestrator.evaluate(b"img").await.unwrap();

    let seen = oracle.seen();
    assert!(!seen[0].context.drifting);
    assert!(seen[1].context.drifting);
    assert_eq!(store.drift_alerts().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_evaluations() {
    let (orchestrator, oracle) = setup(
        ScriptedOracle::answering(verdict(Label::Ok, 0.9)).with_latency(Duration::from_millis(5)),
        fast_config(),
    );
    let orchestrator = Arc::new(orchestrator);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.evaluate(b"img").await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(oracle.call_count(), 16);
    let ids: Vec<u64> = orchestrator
        .store()
        .recent(usize::MAX)
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, (1..=16).collect::<Vec<_>>());
}
