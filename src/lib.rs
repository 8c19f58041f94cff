// nqueensfaf - N-Queens solution counter with checkpointing
//
// This is the library crate containing the search, its persistence and the
// execution controller. The binary crate (main.rs) provides the CLI.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use error::{Result, SolverError};
pub use metrics::Metrics;
pub use models::{MAX_BOARD_SIZE, SearchState, SolverConfig};
pub use services::{BackendSelector, DeviceDescriptor};
pub use state::{ExecutionController, Phase, RunEvent, RunReport};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
