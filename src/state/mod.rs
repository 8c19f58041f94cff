// Execution control module
//
// This module provides the ExecutionController which runs one search on a
// dedicated worker and publishes its progress for lock-free reads from any
// thread, plus change events for subscribers.

use crate::error::{Result, SolverError};
use crate::metrics::Metrics;
use crate::models::{SearchState, SolverConfig};
use crate::services::checkpoint;
use crate::services::backend::StepBackend;
use crate::services::device::{BackendSelector, DeviceDescriptor};
use crate::services::search::{ProgressSample, SearchEngine, SearchObserver, SearchOutcome};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};

/// Sentinel for "run has not finished" in [`Shared::finished_ms`].
const NOT_FINISHED: u64 = u64::MAX;

/// Lifecycle of a controller. Terminal phases are final.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
    Cancelled = 4,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed | Phase::Cancelled)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::Idle,
            1 => Phase::Running,
            2 => Phase::Completed,
            3 => Phase::Failed,
            _ => Phase::Cancelled,
        }
    }
}

/// Change events emitted while a search runs
///
/// These let interested parties (the CLI, tests) follow a run without
/// polling the controller.
#[derive(Clone, Debug, PartialEq)]
pub enum RunEvent {
    /// The worker has been spawned
    Started { n: u32, backend: String },

    /// A new progress sample has been published
    ProgressUpdated {
        progress: f64,
        solutions: u64,
        steps: u64,
    },

    /// A checkpoint has been written
    CheckpointSaved { path: Utf8PathBuf },

    /// A checkpoint write or delete failed; the search continues
    CheckpointFailed { message: String },

    /// Autosave has been switched off after repeated failures
    AutosaveDisabled,

    /// The run reached a terminal phase
    Finished { phase: Phase, solutions: u64 },
}

/// Final summary of a run.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub phase: Phase,
    pub solutions: u64,
    pub steps: u64,
    pub duration: Duration,
    pub backend: String,
    /// Messages of checkpoint writes that failed during the run
    pub checkpoint_failures: Vec<String>,
}

/// State shared between the controller and its worker.
struct Shared {
    phase: AtomicU8,
    progress_bits: AtomicU64,
    solutions: AtomicU64,
    steps: AtomicU64,
    started_at: OnceLock<Instant>,
    finished_ms: AtomicU64,
    /// Set by `cancel()`, and by the engine once the tree is exhausted
    cancel: AtomicBool,
    cancel_requested: AtomicBool,

    /// Serializes phase transitions against cancellation requests
    transition: Mutex<()>,
    phase_tx: watch::Sender<Phase>,
    events: broadcast::Sender<RunEvent>,
    last_error: Mutex<Option<SolverError>>,
    checkpoint_failures: Mutex<Vec<String>>,
    metrics: Arc<Metrics>,
}

impl Shared {
    fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
        self.phase_tx.send_replace(phase);
    }

    fn emit(&self, event: RunEvent) {
        // Ignore send errors - it's OK if no one is listening
        let _ = self.events.send(event);
    }

    fn finish(&self, result: Result<SearchOutcome>) {
        let _guard = self.transition.lock().unwrap();
        if self.phase() != Phase::Running {
            tracing::warn!("Ignoring worker result for a run in phase {:?}", self.phase());
            return;
        }

        let phase = match result {
            Ok(SearchOutcome::Completed) => Phase::Completed,
            Ok(SearchOutcome::Cancelled) => Phase::Cancelled,
            Err(e) => {
                tracing::error!("Search failed: {}", e);
                *self.last_error.lock().unwrap() = Some(e);
                Phase::Failed
            }
        };

        let elapsed = self
            .started_at
            .get()
            .map(Instant::elapsed)
            .unwrap_or_default();
        self.finished_ms.store(elapsed.as_millis() as u64, Ordering::Release);
        self.metrics.record_search_time(elapsed);

        self.set_phase(phase);
        self.emit(RunEvent::Finished {
            phase,
            solutions: self.solutions.load(Ordering::Acquire),
        });
        tracing::info!("Run finished: {:?} after {}ms", phase, elapsed.as_millis());
    }
}

impl SearchObserver for Shared {
    fn on_progress(&self, sample: ProgressSample) {
        self.progress_bits.store(sample.progress.to_bits(), Ordering::Release);
        self.solutions.store(sample.solutions, Ordering::Release);
        self.steps.store(sample.steps, Ordering::Release);
        self.metrics.record_sample(sample.steps, sample.solutions);

        tracing::debug!(
            "Progress {:.4}%: {} solutions, {} steps",
            sample.progress * 100.0,
            sample.solutions,
            sample.steps
        );
        self.emit(RunEvent::ProgressUpdated {
            progress: sample.progress,
            solutions: sample.solutions,
            steps: sample.steps,
        });
    }

    fn on_checkpoint_saved(&self, path: &Utf8Path) {
        self.metrics.record_checkpoint_written();
        self.emit(RunEvent::CheckpointSaved {
            path: path.to_path_buf(),
        });
    }

    fn on_checkpoint_failed(&self, error: &SolverError) {
        let message = error.to_string();
        self.metrics.record_checkpoint_failure();
        self.checkpoint_failures.lock().unwrap().push(message.clone());
        self.emit(RunEvent::CheckpointFailed { message });
    }

    fn on_autosave_disabled(&self) {
        self.emit(RunEvent::AutosaveDisabled);
    }
}

/// Runs one search as a cancellable, awaitable unit of work.
///
/// The controller takes exclusive ownership of the [`SearchState`] and an
/// immutable snapshot of the [`SolverConfig`]. [`start()`](Self::start) moves
/// both onto a blocking tokio worker; from then on the caller only observes
/// the search through lock-free reads ([`progress()`](Self::progress),
/// [`solutions()`](Self::solutions), [`duration()`](Self::duration)), the
/// [`subscribe()`](Self::subscribe) event channel, and
/// [`await_completion()`](Self::await_completion).
///
/// # Lifecycle
///
/// `Idle -> Running -> {Completed, Failed, Cancelled}`. A controller runs at
/// most once; start a fresh one to run again.
///
/// # Example
/// ```ignore
/// let controller = ExecutionController::new(SearchState::new(12)?, &SolverConfig::default())?;
/// controller.start(&tokio::runtime::Handle::current())?;
/// let report = controller.await_completion().await?;
/// assert_eq!(report.solutions, 14200);
/// ```
pub struct ExecutionController {
    shared: Arc<Shared>,
    config: SolverConfig,
    pending: Mutex<Option<SearchState>>,
    n: u32,
    selector: Mutex<BackendSelector>,
    /// Replaces the selector's backend when set
    backend_override: Mutex<Option<Box<dyn StepBackend>>>,
    backend_name: OnceLock<String>,
}

impl ExecutionController {
    /// Create a controller for `state` with the default device selector.
    ///
    /// # Errors
    /// [`SolverError::ConfigValidation`] if `config` does not validate.
    pub fn new(state: SearchState, config: &SolverConfig) -> Result<Self> {
        Self::with_selector(state, config, BackendSelector::default())
    }

    /// Create a controller whose devices come from `selector`.
    pub fn with_selector(
        state: SearchState,
        config: &SolverConfig,
        selector: BackendSelector,
    ) -> Result<Self> {
        config.ensure_valid()?;

        let (phase_tx, _) = watch::channel(Phase::Idle);
        let (events, _) = broadcast::channel(100);
        let shared = Shared {
            phase: AtomicU8::new(Phase::Idle as u8),
            progress_bits: AtomicU64::new(0f64.to_bits()),
            solutions: AtomicU64::new(state.solutions_found()),
            steps: AtomicU64::new(state.steps_taken()),
            started_at: OnceLock::new(),
            finished_ms: AtomicU64::new(NOT_FINISHED),
            cancel: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            transition: Mutex::new(()),
            phase_tx,
            events,
            last_error: Mutex::new(None),
            checkpoint_failures: Mutex::new(Vec::new()),
            metrics: Arc::new(Metrics::new()),
        };

        Ok(Self {
            shared: Arc::new(shared),
            config: config.clone(),
            n: state.n(),
            pending: Mutex::new(Some(state)),
            selector: Mutex::new(selector),
            backend_override: Mutex::new(None),
            backend_name: OnceLock::new(),
        })
    }

    /// Create a controller that runs on `backend` instead of a selected device.
    #[cfg(test)]
    pub(crate) fn with_backend(
        state: SearchState,
        config: &SolverConfig,
        backend: Box<dyn StepBackend>,
    ) -> Result<Self> {
        let controller = Self::new(state, config)?;
        *controller.backend_override.lock().unwrap() = Some(backend);
        Ok(controller)
    }

    /// Resume the search stored in the checkpoint at `path`, using the
    /// configuration embedded in it.
    pub fn from_checkpoint(path: &Utf8Path) -> Result<Self> {
        let (state, config) = checkpoint::load(path)?;
        Self::new(state, &config)
    }

    /// Board size of the search.
    pub fn n(&self) -> u32 {
        self.n
    }

    /// Configuration snapshot the search runs with.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn enumerate_devices(&self) -> Vec<DeviceDescriptor> {
        self.selector.lock().unwrap().enumerate_devices()
    }

    /// Bind the search to the device at `index`. Only valid before `start()`.
    pub fn bind_device(&self, index: usize) -> Result<DeviceDescriptor> {
        let mut selector = self.selector.lock().unwrap();
        selector.bind_device(index).cloned()
    }

    /// Spawn the search on a blocking worker of `runtime`.
    ///
    /// # Errors
    /// - [`SolverError::AlreadyRunning`] unless the controller is idle
    /// - [`SolverError::ConfigValidation`] if the config snapshot is invalid
    pub fn start(&self, runtime: &tokio::runtime::Handle) -> Result<()> {
        let _guard = self.shared.transition.lock().unwrap();
        if self.shared.phase() != Phase::Idle {
            return Err(SolverError::AlreadyRunning);
        }
        let mut state = self
            .pending
            .lock()
            .unwrap()
            .take()
            .ok_or(SolverError::AlreadyRunning)?;

        let selected = self.selector.lock().unwrap().take_backend();
        let backend = self.backend_override.lock().unwrap().take().unwrap_or(selected);
        let engine = SearchEngine::new(&self.config, backend)?;
        let backend_name = engine.backend_name().to_string();
        let _ = self.backend_name.set(backend_name.clone());

        let _ = self.shared.started_at.set(Instant::now());
        self.shared.set_phase(Phase::Running);
        self.shared.emit(RunEvent::Started {
            n: state.n(),
            backend: backend_name,
        });

        let shared = Arc::clone(&self.shared);
        runtime.spawn(async move {
            let worker_shared = Arc::clone(&shared);
            let joined = tokio::task::spawn_blocking(move || {
                engine.run(&mut state, &worker_shared.cancel, worker_shared.as_ref())
            })
            .await;

            let result = joined
                .map_err(|e| SolverError::WorkerPanicked(e.to_string()))
                .and_then(|outcome| outcome);
            shared.finish(result);
        });

        tracing::info!("Started search worker for n={}", self.n);
        Ok(())
    }

    /// Request a cooperative stop at the next step boundary.
    ///
    /// Once accepted the run ends `Cancelled`. Repeated requests are no-ops.
    ///
    /// # Errors
    /// [`SolverError::NotRunning`] unless the controller is running, or if
    /// the search has already explored the whole tree.
    pub fn cancel(&self) -> Result<()> {
        let _guard = self.shared.transition.lock().unwrap();
        if self.shared.phase() != Phase::Running {
            return Err(SolverError::NotRunning);
        }
        if self.shared.cancel_requested.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.shared.cancel.swap(true, Ordering::SeqCst) {
            // the engine set the token when it ran out of tree
            return Err(SolverError::NotRunning);
        }
        self.shared.cancel_requested.store(true, Ordering::SeqCst);
        tracing::info!("Cancellation requested for n={}", self.n);
        Ok(())
    }

    /// Wait until the run leaves `Running`.
    ///
    /// Returns the run report for `Completed` and `Cancelled`. A worker error
    /// is returned once; later calls report the `Failed` phase instead.
    ///
    /// # Errors
    /// [`SolverError::NotRunning`] if the controller was never started.
    pub async fn await_completion(&self) -> Result<RunReport> {
        let mut phase_rx = self.shared.phase_tx.subscribe();
        if self.shared.phase() == Phase::Idle {
            return Err(SolverError::NotRunning);
        }

        phase_rx
            .wait_for(|phase| phase.is_terminal())
            .await
            .map_err(|_| SolverError::NotRunning)?;

        if self.shared.phase() == Phase::Failed {
            if let Some(error) = self.take_last_error() {
                return Err(error);
            }
        }
        Ok(self.report())
    }

    /// Take the worker error of a failed run, if not yet retrieved.
    pub fn take_last_error(&self) -> Option<SolverError> {
        self.shared.last_error.lock().unwrap().take()
    }

    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    /// Latest published progress in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        f64::from_bits(self.shared.progress_bits.load(Ordering::Acquire))
    }

    /// Latest published solution count, final once `Completed`.
    pub fn solutions(&self) -> u64 {
        self.shared.solutions.load(Ordering::Acquire)
    }

    /// Latest published step count.
    pub fn steps(&self) -> u64 {
        self.shared.steps.load(Ordering::Acquire)
    }

    /// Elapsed run time: zero while idle, frozen once terminal.
    pub fn duration(&self) -> Duration {
        let Some(started_at) = self.shared.started_at.get() else {
            return Duration::ZERO;
        };
        match self.shared.finished_ms.load(Ordering::Acquire) {
            NOT_FINISHED => started_at.elapsed(),
            ms => Duration::from_millis(ms),
        }
    }

    /// [`duration()`](Self::duration) in whole milliseconds.
    pub fn duration_millis(&self) -> u64 {
        self.duration().as_millis() as u64
    }

    /// Subscribe to run events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.shared.events.subscribe()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.shared.metrics)
    }

    /// Snapshot of the run as currently published.
    pub fn report(&self) -> RunReport {
        RunReport {
            phase: self.phase(),
            solutions: self.solutions(),
            steps: self.steps(),
            duration: self.duration(),
            backend: self
                .backend_name
                .get()
                .cloned()
                .unwrap_or_else(|| "unstarted".to_string()),
            checkpoint_failures: self.shared.checkpoint_failures.lock().unwrap().clone(),
        }
    }
}

impl Drop for ExecutionController {
    fn drop(&mut self) {
        if self.shared.phase() == Phase::Running {
            tracing::warn!("Controller dropped while running - cancelling search");
            self.shared.cancel.store(true, Ordering::SeqCst);
        }
    }
}
