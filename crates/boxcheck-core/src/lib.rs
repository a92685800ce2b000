//! BoxCheck Core
//!
//! Core types shared across BoxCheck components.
//!
//! This crate provides:
//! - The classification record model (labels, sources, candidates)
//! - Error types and the user-visible failure signals they map to
//! - Store settings (promotion, drift and retraining thresholds)

pub mod error;
pub mod settings;
pub mod types;

pub use error::{Error, FailureSignal, Result};
pub use settings::StoreSettings;
pub use types::{Candidate, Label, Record, Source};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, FailureSignal, Result};
    pub use crate::settings::StoreSettings;
    pub use crate::types::{Candidate, Label, Record, Source};
}
