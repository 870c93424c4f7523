use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use fanout_core::prelude::{RunOptions, ShutdownHandle};
use fanout_summary_model::{append_run_summary, RunSummary};

use crate::{
    deadline::{Deadline, DEFAULT_GRACE_PERIOD},
    outcome::RunOutcome,
    progress::start_progress,
    shutdown::start_shutdown_listener,
    supervisor::Supervisor,
    types::FanOutResult,
};

/// How the supervisor runs, as opposed to [RunOptions] which describe what the workers do.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// The program each worker runs.
    pub workload: PathBuf,
    /// Where the per-worker log files are written. Created if it does not exist.
    pub log_dir: PathBuf,
    /// How long to wait on each remaining worker once the time budget is used up.
    pub grace_period: Duration,
    /// Where to append the [RunSummary], if anywhere.
    pub run_summary_path: Option<PathBuf>,
    /// Identifier for the run summary. A random one is generated if not set.
    pub run_id: Option<String>,
    pub no_progress: bool,
}

impl RunConfig {
    pub fn new(workload: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            workload: workload.into(),
            log_dir: log_dir.into(),
            grace_period: DEFAULT_GRACE_PERIOD,
            run_summary_path: None,
            run_id: None,
            no_progress: false,
        }
    }
}

/// Run the workload once per tester and wait for all of them.
///
/// Returns the [RunOutcome] if every worker exited successfully. Otherwise the error wraps a
/// [crate::outcome::RunError] describing which workers were stuck or failed. No worker is left
/// running when this returns. Ctrl-C stops the run early.
pub fn run(options: RunOptions, config: RunConfig) -> FanOutResult<RunOutcome> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime);

    run_on(&runtime, options, config, shutdown_handle)
}

/// The same as [run], but stopped early through the given `shutdown_handle` instead of Ctrl-C.
pub fn run_with_shutdown(
    options: RunOptions,
    config: RunConfig,
    shutdown_handle: ShutdownHandle,
) -> FanOutResult<RunOutcome> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    run_on(&runtime, options, config, shutdown_handle)
}

fn run_on(
    runtime: &tokio::runtime::Runtime,
    options: RunOptions,
    config: RunConfig,
    shutdown_handle: ShutdownHandle,
) -> FanOutResult<RunOutcome> {
    let supervisor = Supervisor::new(
        options.clone(),
        config.workload.clone(),
        config.log_dir.clone(),
        config.grace_period,
        shutdown_handle.new_listener(),
    )?;

    println!("Starting {} child processes...", options.num_testers);
    println!(
        "Writing output from child processes to {:?}",
        config.log_dir.display().to_string()
    );

    let started_at = chrono::Utc::now().timestamp();

    let progress = if config.no_progress {
        None
    } else {
        let budget = Deadline::start(options.duration, config.grace_period).budget();
        Some(start_progress(
            budget,
            config.grace_period,
            shutdown_handle.new_listener(),
        ))
    };

    let result = runtime.block_on(supervisor.run());

    if let Some(progress) = progress {
        // Nothing else needs the signal at this point, it only stops the progress bar.
        shutdown_handle.shutdown();
        if progress.join().is_err() {
            log::warn!("Progress thread panicked");
        }
    }

    let outcome = result?;

    if let Some(path) = &config.run_summary_path {
        let mut summary = RunSummary::new(
            config.run_id.clone().unwrap_or_else(|| nanoid::nanoid!()),
            started_at,
            options.host.clone(),
            options.port,
            options.duration.as_secs_f64(),
            options.num_testers,
            config.log_dir.display().to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        summary.set_outcome(
            outcome.ok.clone(),
            outcome.stuck.clone(),
            outcome.failed.clone(),
        );

        // A summary that can't be written shouldn't hide how the run went.
        if let Err(e) = append_run_summary(summary, path.clone()) {
            log::error!(
                "Failed to append run summary to '{}': {e:?}",
                path.display()
            );
        }
    }

    outcome.check()?;

    println!("Done.");

    Ok(outcome)
}
