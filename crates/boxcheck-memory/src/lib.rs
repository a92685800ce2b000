//! BoxCheck Memory
//!
//! The experience store behind BoxCheck's feedback loop.
//!
//! Provides:
//! - Durable, append-only classification history
//! - Training corpus promotion and context retrieval
//! - Drift detection and retraining recommendations
//! - Fine-tuning export of the corpus

pub mod drift;
pub mod export;
pub mod persistence;
pub mod statistics;
pub mod store;

pub use drift::{DriftAlert, DriftMonitor, DriftState, DriftWindow};
pub use export::{render_jsonl, TrainingExample};
pub use persistence::{HistoryBackend, JsonlBackend, MemoryBackend, PersistenceConfig};
pub use statistics::{LabelCounts, StoreStatistics};
pub use store::ExperienceStore;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::drift::{DriftAlert, DriftState};
    pub use crate::persistence::{HistoryBackend, JsonlBackend, MemoryBackend, PersistenceConfig};
    pub use crate::statistics::StoreStatistics;
    pub use crate::store::ExperienceStore;
}
