//! Step backends: the candidate-selection primitive shared by every search.
//!
//! The backtracking driver in [`crate::services::search`] only asks a backend
//! one question: which is the first legal column of the current row at or
//! after a given index. Both backends answer it identically, so solutions are
//! discovered in the same depth-first, increasing-column order whichever one
//! is bound.

use crate::models::SearchState;
use crate::services::device::DeviceDescriptor;

/// Candidate-selection strategy injected into the search engine.
pub trait StepBackend: Send {
    /// Human-readable backend name for logs and reports.
    fn name(&self) -> &str;

    /// First column `>= from` in the current row not attacked by any queen.
    fn next_candidate(&self, state: &SearchState, from: u32) -> Option<u32>;
}

/// Checks one column at a time against the three attack lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScalarBackend;

impl StepBackend for ScalarBackend {
    fn name(&self) -> &str {
        "scalar"
    }

    fn next_candidate(&self, state: &SearchState, from: u32) -> Option<u32> {
        (from..state.n()).find(|&col| state.is_free(col))
    }
}

/// Evaluates a whole row as one word and picks the lowest set bit.
#[derive(Debug, Clone)]
pub struct AcceleratedBackend {
    device: DeviceDescriptor,
}

impl AcceleratedBackend {
    pub fn new(device: DeviceDescriptor) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }
}

impl StepBackend for AcceleratedBackend {
    fn name(&self) -> &str {
        &self.device.name
    }

    fn next_candidate(&self, state: &SearchState, from: u32) -> Option<u32> {
        if from >= state.n() {
            return None;
        }
        let candidates = state.free_columns() & !((1u64 << from) - 1);
        if candidates == 0 {
            None
        } else {
            Some(candidates.trailing_zeros())
        }
    }
}
