//! Depth-first N-Queens search engine.
//!
//! The engine owns the backtracking loop and nothing else: legality checks
//! come from the injected [`StepBackend`], persistence from
//! [`crate::services::checkpoint`], and progress leaves through a
//! [`SearchObserver`]. It runs synchronously on whatever thread calls
//! [`SearchEngine::run`]; the [`ExecutionController`](crate::state::ExecutionController)
//! puts it on a dedicated worker.

use crate::error::{Result, SolverError};
use crate::models::{SearchState, SolverConfig};
use crate::services::backend::StepBackend;
use crate::services::checkpoint;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Highest progress value published while a search is still running.
pub const MAX_RUNNING_PROGRESS: f64 = 0.999_999;

/// Consecutive autosave failures after which autosave is switched off.
const MAX_CONSECUTIVE_SAVE_FAILURES: u32 = 2;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The whole tree was explored.
    Completed,
    /// Stopped at a step boundary on request.
    Cancelled,
}

/// One progress sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// Fraction of the search tree explored, in `[0, 1]`.
    pub progress: f64,
    pub solutions: u64,
    pub steps: u64,
}

/// Receives progress and persistence events from a running search.
///
/// Called on the search thread, so implementations should only publish.
pub trait SearchObserver {
    fn on_progress(&self, sample: ProgressSample);

    fn on_checkpoint_saved(&self, _path: &Utf8Path) {}

    fn on_checkpoint_failed(&self, _error: &SolverError) {}

    fn on_autosave_disabled(&self) {}
}

/// Observer that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SearchObserver for NoopObserver {
    fn on_progress(&self, _sample: ProgressSample) {}
}

/// Backtracking driver shared by every backend.
pub struct SearchEngine {
    config: SolverConfig,
    backend: Box<dyn StepBackend>,
}

impl SearchEngine {
    /// Create an engine with a snapshot of `config`.
    ///
    /// # Errors
    /// [`SolverError::ConfigValidation`] if `config` does not validate.
    pub fn new(config: &SolverConfig, backend: Box<dyn StepBackend>) -> Result<Self> {
        config.ensure_valid()?;
        Ok(Self {
            config: config.clone(),
            backend,
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Advance the search by one step.
    ///
    /// Expands the frontier node described by `state`: descend into the first
    /// free column of the next row, or, at a full board or a dead end, count
    /// the solution and move to the next unexplored sibling. Returns `false`
    /// once the tree is exhausted.
    pub fn step(&self, state: &mut SearchState) -> bool {
        if state.is_finished() {
            return false;
        }
        state.record_step();

        if state.is_complete() {
            state.record_solution();
        } else if let Some(col) = self.backend.next_candidate(state, 0) {
            state.place(col);
            return true;
        }

        while let Some(col) = state.remove() {
            if let Some(next) = self.backend.next_candidate(state, col + 1) {
                state.place(next);
                return true;
            }
        }
        false
    }

    /// Run until the tree is exhausted or `cancel` is set.
    ///
    /// Progress is published every `update_interval` steps. When autosave is
    /// enabled a checkpoint is written whenever progress advanced by at least
    /// `auto_save_percentage_step` percent, and once more on cancellation.
    /// Checkpoint write failures never abort the search.
    ///
    /// A completed run leaves `cancel` set, so a caller that swaps it in
    /// later can tell the search already finished.
    pub fn run(
        &self,
        state: &mut SearchState,
        cancel: &AtomicBool,
        observer: &dyn SearchObserver,
    ) -> Result<SearchOutcome> {
        let interval = u64::try_from(self.config.update_interval).unwrap_or(1).max(1);
        let save_path = self.config.resolve_save_path(state.n());
        let mut autosave = Autosave::new(&self.config, save_path, state.progress_estimate());

        tracing::info!(
            "Starting search: n={}, backend={}, row={}, {} solutions so far",
            state.n(),
            self.backend.name(),
            state.row(),
            state.solutions_found()
        );

        let mut published = running_progress(state.progress_estimate());
        observer.on_progress(sample(state, published));

        let exhausted = 'search: loop {
            for _ in 0..interval {
                if cancel.load(Ordering::Relaxed) {
                    break 'search SearchOutcome::Cancelled;
                }
                if !self.step(state) {
                    break 'search SearchOutcome::Completed;
                }
            }

            published = published.max(running_progress(state.progress_estimate()));
            observer.on_progress(sample(state, published));
            autosave.on_sample(state, &self.config, published, observer);
        };

        // setting the token marks the run as over; a cancel that got in
        // first still wins and the completion side effects are skipped
        let outcome = match exhausted {
            SearchOutcome::Completed if cancel.swap(true, Ordering::SeqCst) => {
                SearchOutcome::Cancelled
            }
            other => other,
        };

        match outcome {
            SearchOutcome::Completed => {
                observer.on_progress(sample(state, 1.0));
                if self.config.auto_delete_enabled {
                    if let Err(e) = checkpoint::delete(&autosave.path) {
                        tracing::warn!("Failed to delete checkpoint: {}", e);
                        observer.on_checkpoint_failed(&e);
                    }
                }
                tracing::info!(
                    "Search finished: n={}, {} solutions in {} steps",
                    state.n(),
                    state.solutions_found(),
                    state.steps_taken()
                );
            }
            SearchOutcome::Cancelled => {
                observer.on_progress(sample(state, published));
                if autosave.enabled {
                    autosave.save(state, &self.config, published, observer);
                }
                tracing::info!(
                    "Search cancelled: n={}, row={}, {} solutions after {} steps",
                    state.n(),
                    state.row(),
                    state.solutions_found(),
                    state.steps_taken()
                );
            }
        }

        Ok(outcome)
    }
}

/// Per-run autosave bookkeeping.
struct Autosave {
    enabled: bool,
    path: Utf8PathBuf,
    step: f64,
    last_saved: f64,
    consecutive_failures: u32,
}

impl Autosave {
    fn new(config: &SolverConfig, path: Utf8PathBuf, start: f64) -> Self {
        Self {
            enabled: config.auto_save_enabled,
            path,
            step: f64::from(config.auto_save_percentage_step),
            last_saved: start,
            consecutive_failures: 0,
        }
    }

    fn on_sample(
        &mut self,
        state: &SearchState,
        config: &SolverConfig,
        progress: f64,
        observer: &dyn SearchObserver,
    ) {
        if self.enabled && (progress - self.last_saved) * 100.0 >= self.step {
            self.save(state, config, progress, observer);
        }
    }

    fn save(
        &mut self,
        state: &SearchState,
        config: &SolverConfig,
        progress: f64,
        observer: &dyn SearchObserver,
    ) {
        match checkpoint::save(state, config, &self.path) {
            Ok(()) => {
                self.last_saved = progress;
                self.consecutive_failures = 0;
                observer.on_checkpoint_saved(&self.path);
            }
            Err(e) => {
                self.consecutive_failures += 1;
                tracing::warn!("Checkpoint write failed: {}", e);
                observer.on_checkpoint_failed(&e);

                if self.consecutive_failures >= MAX_CONSECUTIVE_SAVE_FAILURES {
                    tracing::warn!(
                        "Checkpoint write failed {} times in a row, autosave disabled for this run",
                        self.consecutive_failures
                    );
                    self.enabled = false;
                    observer.on_autosave_disabled();
                }
            }
        }
    }
}

fn running_progress(estimate: f64) -> f64 {
    estimate.clamp(0.0, MAX_RUNNING_PROGRESS)
}

fn sample(state: &SearchState, progress: f64) -> ProgressSample {
    ProgressSample {
        progress,
        solutions: state.solutions_found(),
        steps: state.steps_taken(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::backend::{AcceleratedBackend, ScalarBackend};
    use crate::services::device::{DeviceDescriptor, DeviceKind};
    use std::sync::Mutex;

    const KNOWN_COUNTS: [u64; 12] = [1, 0, 0, 2, 10, 4, 40, 92, 352, 724, 2680, 14200];

    fn scalar_engine(config: &SolverConfig) -> SearchEngine {
        SearchEngine::new(config, Box::new(ScalarBackend)).unwrap()
    }

    fn accelerated_engine(config: &SolverConfig) -> SearchEngine {
        let device = DeviceDescriptor {
            index: 0,
            name: "host".to_string(),
            kind: DeviceKind::Host,
            compute_units: 1,
        };
        SearchEngine::new(config, Box::new(AcceleratedBackend::new(device))).unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        samples: Mutex<Vec<ProgressSample>>,
        saved: Mutex<u32>,
    }

    impl SearchObserver for Recorder {
        fn on_progress(&self, sample: ProgressSample) {
            self.samples.lock().unwrap().push(sample);
        }

        fn on_checkpoint_saved(&self, _path: &Utf8Path) {
            *self.saved.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_known_counts_with_both_backends() {
        let config = SolverConfig::default();

        for (i, &expected) in KNOWN_COUNTS.iter().enumerate() {
            let n = i as i64 + 1;
            for engine in [scalar_engine(&config), accelerated_engine(&config)] {
                let cancel = AtomicBool::new(false);
                let mut state = SearchState::new(n).unwrap();
                let outcome = engine.run(&mut state, &cancel, &NoopObserver).unwrap();
                assert!(cancel.load(Ordering::SeqCst));
                assert_eq!(outcome, SearchOutcome::Completed);
                assert_eq!(
                    state.solutions_found(),
                    expected,
                    "n = {} with {}",
                    n,
                    engine.backend_name()
                );
            }
        }
    }

    #[test]
    fn test_first_solution_order() {
        let engine = scalar_engine(&SolverConfig::default());
        let mut state = SearchState::new(8).unwrap();

        while !state.is_complete() {
            assert!(engine.step(&mut state));
        }
        assert_eq!(state.placements(), &[0, 4, 7, 5, 2, 6, 1, 3]);
    }

    #[test]
    fn test_backends_visit_identical_states() {
        let scalar = scalar_engine(&SolverConfig::default());
        let accel = accelerated_engine(&SolverConfig::default());
        let mut a = SearchState::new(7).unwrap();
        let mut b = SearchState::new(7).unwrap();

        loop {
            let more_a = scalar.step(&mut a);
            let more_b = accel.step(&mut b);
            assert_eq!(a, b);
            assert_eq!(more_a, more_b);
            if !more_a {
                break;
            }
        }
    }

    #[test]
    fn test_step_after_finish_is_noop() {
        let engine = scalar_engine(&SolverConfig::default());
        let mut state = SearchState::new(1).unwrap();

        assert!(engine.step(&mut state));
        assert!(!engine.step(&mut state));
        assert!(state.is_finished());
        assert_eq!(state.solutions_found(), 1);
        assert_eq!(state.steps_taken(), 2);

        assert!(!engine.step(&mut state));
        assert_eq!(state.steps_taken(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SolverConfig {
            update_interval: 0,
            ..SolverConfig::default()
        };
        assert!(matches!(
            SearchEngine::new(&config, Box::new(ScalarBackend)),
            Err(SolverError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_one() {
        let config = SolverConfig {
            update_interval: 16,
            ..SolverConfig::default()
        };
        let engine = scalar_engine(&config);
        let recorder = Recorder::default();
        let mut state = SearchState::new(9).unwrap();

        engine
            .run(&mut state, &AtomicBool::new(false), &recorder)
            .unwrap();

        let samples = recorder.samples.lock().unwrap();
        assert!(samples.len() > 10);
        for pair in samples.windows(2) {
            assert!(pair[1].progress >= pair[0].progress);
        }
        let (last, rest) = samples.split_last().unwrap();
        assert_eq!(last.progress, 1.0);
        assert!(rest.iter().all(|s| s.progress < 1.0));
    }

    #[test]
    fn test_cancelled_run_resumes_to_same_count() {
        let config = SolverConfig::default();
        let engine = scalar_engine(&config);
        let mut state = SearchState::new(10).unwrap();

        for _ in 0..5_000 {
            engine.step(&mut state);
        }
        let outcome = engine
            .run(&mut state, &AtomicBool::new(true), &NoopObserver)
            .unwrap();
        assert_eq!(outcome, SearchOutcome::Cancelled);

        let bytes = checkpoint::encode(&state, &config).unwrap();
        let (mut resumed, _) = checkpoint::decode(&bytes).unwrap();
        assert_eq!(resumed, state);

        engine
            .run(&mut resumed, &AtomicBool::new(false), &NoopObserver)
            .unwrap();
        assert_eq!(resumed.solutions_found(), 724);
    }

    #[test]
    fn test_autosave_writes_and_auto_delete_removes() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let config = SolverConfig {
            update_interval: 32,
            auto_save_enabled: true,
            auto_delete_enabled: true,
            auto_save_percentage_step: 1.0,
            auto_save_path: dir.join("q{N}.dat").to_string(),
        };
        let engine = scalar_engine(&config);
        let recorder = Recorder::default();
        let mut state = SearchState::new(9).unwrap();

        engine
            .run(&mut state, &AtomicBool::new(false), &recorder)
            .unwrap();

        assert!(*recorder.saved.lock().unwrap() > 0);
        assert!(!dir.join("q9.dat").exists());
        assert_eq!(state.solutions_found(), 352);
    }

    #[test]
    fn test_cancel_writes_final_checkpoint() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let config = SolverConfig {
            auto_save_enabled: true,
            auto_save_path: dir.join("q{N}.dat").to_string(),
            ..SolverConfig::default()
        };
        let engine = scalar_engine(&config);
        let mut state = SearchState::new(10).unwrap();
        for _ in 0..777 {
            engine.step(&mut state);
        }

        engine
            .run(&mut state, &AtomicBool::new(true), &NoopObserver)
            .unwrap();

        let (loaded, loaded_config) = checkpoint::load(&dir.join("q10.dat")).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded_config, config);
    }

    #[test]
    fn test_cancel_raised_in_last_step_skips_completion() {
        use std::sync::Arc;

        struct CancelAtEnd(Arc<AtomicBool>);

        impl StepBackend for CancelAtEnd {
            fn name(&self) -> &str {
                "cancel-at-end"
            }

            fn next_candidate(&self, state: &SearchState, from: u32) -> Option<u32> {
                let candidate = ScalarBackend.next_candidate(state, from);
                if candidate.is_none() && state.row() == 0 {
                    self.0.store(true, Ordering::SeqCst);
                }
                candidate
            }
        }

        let temp_dir = tempfile::TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let config = SolverConfig {
            auto_save_enabled: true,
            auto_delete_enabled: true,
            auto_save_path: dir.join("q{N}.dat").to_string(),
            ..SolverConfig::default()
        };
        let cancel = Arc::new(AtomicBool::new(false));
        let engine =
            SearchEngine::new(&config, Box::new(CancelAtEnd(Arc::clone(&cancel)))).unwrap();
        let recorder = Recorder::default();
        let mut state = SearchState::new(6).unwrap();

        let outcome = engine.run(&mut state, &cancel, &recorder).unwrap();

        assert_eq!(outcome, SearchOutcome::Cancelled);
        assert!(state.is_finished());
        let samples = recorder.samples.lock().unwrap();
        assert!(samples.iter().all(|s| s.progress < 1.0));
        let (saved, _) = checkpoint::load(&dir.join("q6.dat")).unwrap();
        assert_eq!(saved.solutions_found(), 4);
    }

    #[test]
    fn test_repeated_save_failure_disables_autosave() {
        struct FailureCounter {
            failures: Mutex<u32>,
            disabled: Mutex<bool>,
        }
        impl SearchObserver for FailureCounter {
            fn on_progress(&self, _sample: ProgressSample) {}
            fn on_checkpoint_failed(&self, _error: &SolverError) {
                *self.failures.lock().unwrap() += 1;
            }
            fn on_autosave_disabled(&self) {
                *self.disabled.lock().unwrap() = true;
            }
        }

        let temp_dir = tempfile::TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        // the checkpoint's parent is a regular file, so every write fails
        std::fs::write(dir.join("blocker"), b"").unwrap();
        let config = SolverConfig {
            update_interval: 8,
            auto_save_enabled: true,
            auto_save_percentage_step: 0.5,
            auto_save_path: dir.join("blocker").join("q{N}.dat").to_string(),
            ..SolverConfig::default()
        };
        let engine = scalar_engine(&config);
        let observer = FailureCounter {
            failures: Mutex::new(0),
            disabled: Mutex::new(false),
        };
        let mut state = SearchState::new(8).unwrap();

        let outcome = engine
            .run(&mut state, &AtomicBool::new(false), &observer)
            .unwrap();

        assert_eq!(outcome, SearchOutcome::Completed);
        assert_eq!(state.solutions_found(), 92);
        assert_eq!(*observer.failures.lock().unwrap(), 2);
        assert!(*observer.disabled.lock().unwrap());
    }
}
