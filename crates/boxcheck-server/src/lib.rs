//! BoxCheck Server
//!
//! HTTP front end for the box condition classifier: routes image uploads
//! through the orchestrator and exposes the experience store's statistics,
//! training data and drift alerts.

pub mod cli;
pub mod config;
pub mod routes;
pub mod state;

pub use cli::Cli;
pub use config::ServerConfig;
pub use routes::create_router;
pub use state::AppState;
