//! Core types for BoxCheck

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Box condition verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Label {
    /// Box is intact and usable
    Ok,
    /// Box is damaged and needs attention
    NeedsFix,
}

impl Label {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NeedsFix => "NEEDS_FIX",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "OK" => Ok(Self::Ok),
            "NEEDS_FIX" => Ok(Self::NeedsFix),
            _ => Err(Error::invalid_input(format!("unknown label: {s:?}"))),
        }
    }
}

/// Where a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    /// Produced by the vision oracle
    Model,
    /// Supplied by a human reviewer; always trusted
    HumanFeedback,
}

/// A classification result offered to the store for ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Verdict
    pub label: Label,

    /// Confidence score (0.0-1.0)
    pub confidence: f64,

    /// Free-text explanation
    pub reason: String,

    /// Damage tags (tear, dent, ...)
    #[serde(default)]
    pub damage_types: Vec<String>,

    /// Producer of the verdict
    pub source: Source,

    /// Opaque reference to the image this verdict is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl Candidate {
    /// Create a model-sourced candidate
    pub fn model(label: Label, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            label,
            confidence,
            reason: reason.into(),
            damage_types: Vec::new(),
            source: Source::Model,
            image_ref: None,
        }
    }

    /// Create a human feedback candidate
    pub fn feedback(label: Label, reason: impl Into<String>) -> Self {
        Self {
            label,
            confidence: 1.0,
            reason: reason.into(),
            damage_types: Vec::new(),
            source: Source::HumanFeedback,
            image_ref: None,
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

    /// Override the stated confidence
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Attach an image reference
    pub fn with_image_ref(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    /// Reject candidates that cannot be recorded as-is.
    ///
    /// Human feedback is recorded at 1.0 whatever it states, so its
    /// confidence is not checked.
    pub fn validate(&self) -> crate::Result<()> {
        if self.source == Source::HumanFeedback {
            return Ok(());
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::invalid_input(format!(
                "confidence must be within [0, 1], got {}",
                self.confidence
            )));
        }
        Ok(())
    }

    /// Confidence the store should act on
    pub fn effective_confidence(&self) -> f64 {
        match self.source {
            Source::HumanFeedback => 1.0,
            Source::Model => self.confidence,
        }
    }
}

/// One classification event in history. Never modified once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Strictly increasing identifier
    pub id: u64,

    /// Verdict
    pub label: Label,

    /// Confidence score (0.0-1.0); 1.0 for human feedback
    pub confidence: f64,

    /// Free-text explanation
    pub reason: String,

    /// Damage tags, sorted and de-duplicated
    #[serde(default)]
    pub damage_types: Vec<String>,

    /// Producer of the verdict
    pub source: Source,

    /// Opaque reference to the image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,

    /// Whether this record joined the training corpus when it was ingested
    pub promoted: bool,

    /// Ingestion time
    pub created_at: DateTime<Utc>,
}

impl Record {
    /// Build a record from a validated candidate
    pub fn from_candidate(
        id: u64,
        candidate: Candidate,
        promoted: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        let confidence = candidate.effective_confidence();
        let mut damage_types = candidate.damage_types;
        damage_types.sort();
        damage_types.dedup();

        Self {
            id,
            label: candidate.label,
            confidence,
            reason: candidate.reason,
            damage_types,
            source: candidate.source,
            image_ref: candidate.image_ref,
            promoted,
            created_at,
        }
    }

    /// Check whether this record counts toward drift
    pub fn is_low_confidence(&self, threshold: f64) -> bool {
        self.confidence < threshold
    }

    /// Check if this record came from a human reviewer
    pub fn is_feedback(&self) -> bool {
        self.source == Source::HumanFeedback
    }
}
