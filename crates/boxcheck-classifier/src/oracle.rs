//! Oracle trait and common types

use async_trait::async_trait;
use boxcheck_core::{Candidate, Error, Label, Result, Source};

/// An external vision classifier
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Classify the given image, using `context` as prior decisions
    async fn classify(&self, image: &[u8], context: &OracleContext) -> Result<Verdict>;

    /// Get the oracle name
    fn name(&self) -> &str;
}

/// What the orchestrator tells the oracle besides the image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OracleContext {
    /// Formatted prior decisions, most confident first
    pub examples: String,

    /// Number of prior decisions in `examples`
    pub example_count: usize,

    /// Whether the store currently reports drift
    pub drifting: bool,
}

/// Result of one oracle call
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Box condition
    pub label: Label,

    /// Confidence score (0.0-1.0)
    pub confidence: f64,

    /// Explanation given by the model
    pub reason: String,

    /// Damage tags
    pub damage_types: Vec<String>,

    /// Model name or version, if reported
    pub model: Option<String>,
}

impl Verdict {
    /// Create a new verdict
    pub fn new(label: Label, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            label,
            confidence,
            reason: reason.into(),
            damage_types: Vec::new(),
            model: None,
        }
    }

    /// Set damage tags
    pub fn with_damage_types<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.damage_types = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Check if confidence reaches `threshold`
    pub fn exceeds_threshold(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }

    /// Reject verdicts whose confidence is not a probability.
    /// A bad verdict is the oracle's fault, never the caller's.
    pub fn validate(&self) -> Result<()> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::oracle_permanent(format!(
                "oracle returned confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }

    /// Turn into a model-sourced ingestion candidate
    pub fn into_candidate(self) -> Candidate {
        Candidate {
            label: self.label,
            confidence: self.confidence,
            reason: self.reason,
            damage_types: self.damage_types,
            source: Source::Model,
            image_ref: None,
        }
    }
}
