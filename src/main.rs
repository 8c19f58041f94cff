//! nqueensfaf - N-Queens solution counter
//!
//! Main entry point for the command line application.
//!
//! # Overview
//!
//! The binary is a thin caller around [`ExecutionController`]. It:
//! - initializes logging (daily rotated file plus stderr console)
//! - builds a tokio runtime for the search worker
//! - loads `nqueensfaf.yaml` from the config directory
//! - starts a fresh search for `<N>` or resumes one from a checkpoint
//! - turns Ctrl-C into a cooperative cancellation
//!
//! On exit it prints the device, the elapsed time and the solution count.
//! Any error is returned from `main` and produces a non-zero exit code.

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::Parser;
use nqueensfaf::{
    APP_NAME, ConfigManager, ExecutionController, Phase, RunEvent, SearchState, VERSION,
};
use std::time::Duration;

/// Count the solutions of the N-Queens problem, with resumable checkpoints
#[derive(Parser, Debug)]
#[command(name = "nqueensfaf", version, about)]
struct Cli {
    /// Board size
    #[arg(required_unless_present_any = ["resume", "list_devices"])]
    n: Option<i64>,

    /// Resume the search stored in this checkpoint file
    #[arg(long, value_name = "PATH", conflicts_with = "n")]
    resume: Option<Utf8PathBuf>,

    /// Run on the device at this index (see --list-devices)
    #[arg(long, value_name = "INDEX")]
    device: Option<usize>,

    /// List available devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Directory holding nqueensfaf.yaml
    #[arg(long, value_name = "DIR", default_value = ".")]
    config_dir: Utf8PathBuf,

    /// Directory for log files
    #[arg(long, value_name = "DIR", default_value = "logs")]
    log_dir: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = nqueensfaf::logging::setup_logging_with_console(
        &cli.log_dir,
        "nqueensfaf",
        cli.verbose,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("nqueensfaf-worker")
        .build()?;

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let config = config_manager.load_solver_config()?;

    let controller = match (&cli.resume, cli.n) {
        (Some(path), _) => ExecutionController::from_checkpoint(path)
            .with_context(|| format!("Failed to resume from {}", path))?,
        (None, Some(n)) => ExecutionController::new(SearchState::new(n)?, &config)?,
        (None, None) if cli.list_devices => {
            // any board size works for listing devices
            ExecutionController::new(SearchState::new(1)?, &config)?
        }
        (None, None) => bail!("a board size or --resume is required"),
    };

    if cli.list_devices {
        let devices = controller.enumerate_devices();
        if devices.is_empty() {
            println!("no devices available, the scalar backend will be used");
        }
        for device in devices {
            println!(
                "[{}] {} ({}, {} compute units)",
                device.index, device.name, device.kind, device.compute_units
            );
        }
        return Ok(());
    }

    match cli.device {
        Some(index) => {
            let device = controller.bind_device(index)?;
            println!("device: [{}] {}", device.index, device.name);
        }
        None => println!("device: scalar"),
    }

    let report = runtime.block_on(run(&controller))?;

    println!("n: {}", controller.n());
    println!("duration: {} ms", report.duration.as_millis());
    println!("solutions: {}", report.solutions);
    for failure in &report.checkpoint_failures {
        eprintln!("checkpoint failure: {}", failure);
    }
    if report.phase == Phase::Cancelled {
        let path = controller.config().resolve_save_path(controller.n());
        if controller.config().auto_save_enabled {
            println!("cancelled, resume with --resume {}", path);
        } else {
            println!("cancelled");
        }
    }

    controller.metrics().log_summary();

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Application shutdown complete");
    Ok(())
}

/// Start the search and wait for it, relaying Ctrl-C and progress.
async fn run(controller: &ExecutionController) -> Result<nqueensfaf::RunReport> {
    let mut events = controller.subscribe();
    controller.start(&tokio::runtime::Handle::current())?;

    let completion = controller.await_completion();
    tokio::pin!(completion);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut interrupted = false;

    loop {
        tokio::select! {
            report = &mut completion => {
                eprintln!();
                return Ok(report?);
            }
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal.context("Failed to listen for Ctrl-C")?;
                interrupted = true;
                tracing::warn!("Interrupted - cancelling search");
                // the run may finish between the signal and this call
                if let Err(e) = controller.cancel() {
                    tracing::debug!("Cancel ignored: {}", e);
                }
            }
            event = events.recv() => {
                match event {
                    Ok(RunEvent::CheckpointSaved { path }) => {
                        tracing::info!("Checkpoint saved to {}", path);
                    }
                    Ok(RunEvent::AutosaveDisabled) => {
                        eprintln!("autosave disabled after repeated failures");
                    }
                    _ => {}
                }
            }
            _ = ticker.tick() => {
                eprint!(
                    "\rprogress: {:>8.4}%  solutions: {}",
                    controller.progress() * 100.0,
                    controller.solutions()
                );
            }
        }
    }
}
