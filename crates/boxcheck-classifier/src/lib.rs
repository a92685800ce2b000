//! BoxCheck Classifier
//!
//! Vision oracle adapters and the orchestrator that ties them to the
//! experience store.
//!
//! - [`Oracle`]: the external classifier seam
//! - [`VisionOracle`]: OpenAI-compatible chat completions adapter
//! - [`Orchestrator`]: context retrieval, oracle call, ingestion

pub mod oracle;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod vision;

pub use oracle::{Oracle, OracleContext, Verdict};
pub use orchestrator::{Evaluation, Orchestrator, OrchestratorConfig};
pub use parser::parse_response;
pub use prompt::ContextFormatter;
pub use vision::{VisionConfig, VisionOracle};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::oracle::{Oracle, OracleContext, Verdict};
    pub use crate::orchestrator::{Evaluation, Orchestrator, OrchestratorConfig};
    pub use crate::vision::{VisionConfig, VisionOracle};
}
