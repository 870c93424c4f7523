use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use fanout_core::prelude::{DelegatedShutdownListener, RunOptions};

use crate::{
    deadline::Deadline,
    outcome::{RunError, RunOutcome},
    types::FanOutResult,
    worker::{Worker, WorkerSet},
};

/// Runs one copy of the workload per tester and decides how each of them went.
///
/// Workers are joined one at a time in the order they were started, each for whatever is left of
/// the shared [Deadline]. A worker that finishes while the supervisor is waiting on an earlier one
/// is picked up when its turn comes. Once the budget is spent every remaining worker still gets
/// the full grace period, so with many stuck workers a run takes up to the budget plus one grace
/// period per worker.
pub struct Supervisor {
    options: RunOptions,
    workload: PathBuf,
    log_dir: PathBuf,
    grace_period: Duration,
    shutdown_listener: DelegatedShutdownListener,
}

impl Supervisor {
    pub fn new(
        options: RunOptions,
        workload: PathBuf,
        log_dir: PathBuf,
        grace_period: Duration,
        shutdown_listener: DelegatedShutdownListener,
    ) -> FanOutResult<Self> {
        options.validate()?;
        if grace_period.is_zero() {
            anyhow::bail!("The grace period must be longer than zero");
        }

        Ok(Self {
            options,
            workload,
            log_dir,
            grace_period,
            shutdown_listener,
        })
    }

    /// Start every worker, wait for them and classify how they finished.
    ///
    /// An [Ok] result can still describe stuck or failed workers, use [RunOutcome::check] to get
    /// the error to report. Workers that are still running when this returns, or when the future is
    /// dropped, are killed.
    pub async fn run(mut self) -> FanOutResult<RunOutcome> {
        std::fs::create_dir_all(&self.log_dir).with_context(|| {
            format!(
                "Failed to create log directory '{}'",
                self.log_dir.display()
            )
        })?;

        let mut workers = WorkerSet::default();
        for index in 0..self.options.num_testers {
            let worker = Worker::spawn(
                index,
                self.options.for_worker(index),
                &self.workload,
                &self.log_dir,
            )?;
            log::trace!(
                "Worker {index} logging to '{}'",
                worker.log_path().display()
            );
            workers.push(worker);
        }
        log::info!("Started {} workers", workers.len());

        println!("Waiting for child processes...");

        let result = self.join_and_classify(&mut workers).await;
        workers.terminate_stragglers().await;

        result
    }

    async fn join_and_classify(&mut self, workers: &mut WorkerSet) -> FanOutResult<RunOutcome> {
        let deadline = Deadline::start(self.options.duration, self.grace_period);

        for worker in workers.iter_mut() {
            let window = deadline.wait_window();
            log::debug!(
                "Waiting up to {:.1}s for worker {} ({:?})",
                window.as_secs_f64(),
                worker.index(),
                worker.options().keysuffix
            );

            tokio::select! {
                status = worker.wait_for(window) => {
                    match status {
                        Some(status) => log::debug!("Worker {} exited with {status}", worker.index()),
                        None => log::warn!("Worker {} did not finish within {:.1}s", worker.index(), window.as_secs_f64()),
                    }
                }
                _ = self.shutdown_listener.wait_for_shutdown() => {
                    log::warn!("Shutdown requested while waiting for worker {}", worker.index());
                    return Err(RunError::Interrupted.into());
                }
            }
        }

        let states = workers.states()?;
        for (worker, state) in workers.iter_mut().zip(states.iter()) {
            worker.write_finish_marker(*state);
        }

        let outcome = RunOutcome::classify(states);
        log::info!(
            "{} ok, {} stuck, {} failed",
            outcome.ok.len(),
            outcome.stuck.len(),
            outcome.failed.len()
        );

        Ok(outcome)
    }
}
