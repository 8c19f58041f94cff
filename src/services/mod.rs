//! Services module - the search itself and everything it needs to run.
//!
//! These services have no knowledge of how a run is driven. The
//! [`ExecutionController`](crate::state::ExecutionController) puts them on a
//! worker thread; tests and benches call them directly.
//!
//! # Components
//!
//! - [`SearchEngine`]: advances a [`SearchState`](crate::models::SearchState)
//!   one node at a time and drives whole runs, including:
//!   - progress sampling every `update_interval` steps
//!   - autosave on progress thresholds and on cancellation
//!   - deleting the checkpoint after a completed run when configured
//!
//! - [`checkpoint`]: the binary checkpoint format plus crash-safe save,
//!   load and delete.
//!
//! - [`StepBackend`]: candidate selection, with a [`ScalarBackend`] and a
//!   word-parallel [`AcceleratedBackend`].
//!
//! - [`BackendSelector`]: enumerates devices through a [`DeviceDriver`] and
//!   binds one before the search starts.
//!
//! # Usage Example
//!
//! ```ignore
//! use nqueensfaf::models::{SearchState, SolverConfig};
//! use nqueensfaf::services::{NoopObserver, ScalarBackend, SearchEngine};
//! use std::sync::atomic::AtomicBool;
//!
//! let engine = SearchEngine::new(&SolverConfig::default(), Box::new(ScalarBackend))?;
//! let mut state = SearchState::new(8)?;
//! engine.run(&mut state, &AtomicBool::new(false), &NoopObserver)?;
//! assert_eq!(state.solutions_found(), 92);
//! ```

pub mod backend;
pub mod checkpoint;
pub mod device;
pub mod search;

pub use backend::{AcceleratedBackend, ScalarBackend, StepBackend};
pub use device::{BackendSelector, DeviceDescriptor, DeviceDriver, DeviceKind, HostDriver};
pub use search::{
    MAX_RUNNING_PROGRESS, NoopObserver, ProgressSample, SearchEngine, SearchObserver,
    SearchOutcome,
};
