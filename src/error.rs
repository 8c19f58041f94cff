use crate::models::MAX_BOARD_SIZE;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised by the solver library.
///
/// Configuration and checkpoint-load errors are returned before any search
/// work begins. Errors raised on the worker are stored on the
/// [`ExecutionController`](crate::state::ExecutionController) and handed out
/// by [`await_completion()`](crate::state::ExecutionController::await_completion).
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Invalid configuration: {0}")]
    ConfigValidation(String),

    #[error("Invalid board size {0}: must be between 1 and {max}", max = MAX_BOARD_SIZE)]
    InvalidBoardSize(i64),

    #[error("Solver is already running")]
    AlreadyRunning,

    #[error("A device is already bound")]
    AlreadyBound,

    #[error("Invalid device index {index}: {count} device(s) available")]
    InvalidDeviceIndex { index: usize, count: usize },

    #[error("Device initialization failed: {0}")]
    DeviceInitialization(String),

    #[error("Failed to read {path}: {source}")]
    IoRead {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    IoWrite {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed checkpoint: {0}")]
    MalformedCheckpoint(String),

    #[error("Search state corrupted: {0}")]
    SearchStateCorruption(String),

    #[error("Solver is not running")]
    NotRunning,

    #[error("Search worker panicked: {0}")]
    WorkerPanicked(String),
}

pub type Result<T> = std::result::Result<T, SolverError>;
