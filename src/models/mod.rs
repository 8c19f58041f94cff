//! Data models for the solver.
//!
//! - [`SolverConfig`]: run-time tunables (update cadence, autosave policy), persisted as YAML
//!   by [`ConfigManager`](crate::config::ConfigManager) and embedded in every checkpoint
//! - [`SearchState`]: the board of an in-progress search, with its placement stack and
//!   attack-line bitmasks
//! - [`MAX_BOARD_SIZE`]: the largest board whose diagonals fit in a `u64` mask

pub mod config;
pub mod search_state;

pub use config::{BOARD_SIZE_PLACEHOLDER, SolverConfig};
pub use search_state::{MAX_BOARD_SIZE, SearchState};
