//! Provides the ability to run one copy of the workload as a [`Child`] process per worker, and to
//! make sure none of them outlive the supervisor.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use anyhow::Context;
use fanout_core::prelude::RunOptions;
use tokio::{
    process::{Child, Command},
    time::timeout,
};

use crate::{outcome::WorkerState, types::FanOutResult};

/// The log file for the worker at `index` inside `log_dir`.
pub fn worker_log_path(log_dir: &Path, index: usize) -> PathBuf {
    log_dir.join(format!("{index}.txt"))
}

/// One running copy of the workload.
///
/// The workload's stdout and stderr go to the worker's own log file, the supervisor writes its
/// start and finish markers to the same file.
#[derive(Debug)]
pub struct Worker {
    index: usize,
    options: RunOptions,
    log_path: PathBuf,
    log_file: File,
    child: Child,
}

impl Worker {
    /// Start the workload for the worker at `index`.
    ///
    /// The log file is created, or truncated if it exists from a previous run, and the workload
    /// is started with `options` for this worker appended to its command line.
    pub fn spawn(
        index: usize,
        options: RunOptions,
        workload: &Path,
        log_dir: &Path,
    ) -> FanOutResult<Self> {
        let log_path = worker_log_path(log_dir, index);
        let mut log_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&log_path)
            .with_context(|| format!("Failed to create log file '{}'", log_path.display()))?;

        writeln!(
            log_file,
            "Starting test against server at {}:{}...",
            options.host, options.port
        )
        .with_context(|| format!("Failed to write to log file '{}'", log_path.display()))?;

        let stdout = log_file
            .try_clone()
            .context("Failed to share the log file with the worker's stdout")?;
        let stderr = log_file
            .try_clone()
            .context("Failed to share the log file with the worker's stderr")?;

        log::debug!(
            "Spawning worker {index} running '{}' with key suffix {:?}",
            workload.display(),
            options.keysuffix
        );
        let child = Command::new(workload)
            .args(&options.workload_args)
            .args(options.workload_flags())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!(
                    "Failed to start worker {index} with workload '{}'",
                    workload.display()
                )
            })?;

        log::trace!("Worker {index} started with pid {:?}", child.id());

        Ok(Self {
            index,
            options,
            log_path,
            log_file,
            child,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Wait up to `window` for the worker to exit.
    ///
    /// Returns [None] if the worker is still running when the window closes.
    pub async fn wait_for(&mut self, window: Duration) -> Option<ExitStatus> {
        match timeout(window, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                log::error!("Failed to wait for worker {}: {e:?}", self.index);
                None
            }
            Err(_) => None,
        }
    }

    /// Check, without waiting, whether the worker has exited.
    pub fn state(&mut self) -> FanOutResult<WorkerState> {
        let status = self
            .child
            .try_wait()
            .with_context(|| format!("Failed to check the status of worker {}", self.index))?;

        Ok(match status {
            Some(status) => WorkerState::Finished(status),
            None => WorkerState::StillRunning,
        })
    }

    /// Write the closing line for this worker's log.
    pub(crate) fn write_finish_marker(&mut self, state: WorkerState) {
        let marker = match state {
            WorkerState::Finished(status) if status.success() => "Done with test.".to_string(),
            WorkerState::Finished(status) => format!("Test failed, worker exited with {status}."),
            WorkerState::StillRunning => {
                "Test did not finish in time, worker is being terminated.".to_string()
            }
        };

        if let Err(e) = writeln!(self.log_file, "{marker}") {
            log::warn!(
                "Failed to write to log file '{}': {e}",
                self.log_path.display()
            );
        }
    }

    /// Kill the worker if it is still running and wait for it to be reaped.
    ///
    /// Returns whether the worker had to be killed. Calling this on a worker that has already
    /// exited does nothing.
    pub async fn terminate(&mut self) -> FanOutResult<bool> {
        if let WorkerState::Finished(_) = self.state()? {
            return Ok(false);
        }

        log::debug!("Killing worker {}", self.index);
        self.child
            .kill()
            .await
            .with_context(|| format!("Failed to kill worker {}", self.index))?;

        Ok(true)
    }
}

/// Owns every worker started for a run.
///
/// Workers are added as soon as they are spawned. Whichever way the run ends, including the run
/// future being dropped part way through, any worker still alive is killed when the set is dropped.
#[derive(Debug, Default)]
pub struct WorkerSet {
    workers: Vec<Worker>,
}

impl WorkerSet {
    pub fn push(&mut self, worker: Worker) {
        self.workers.push(worker);
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Workers in spawn order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Worker> {
        self.workers.iter_mut()
    }

    /// The current state of every worker, in spawn order.
    pub fn states(&mut self) -> FanOutResult<Vec<WorkerState>> {
        self.workers.iter_mut().map(Worker::state).collect()
    }

    /// Kill and reap every worker that is still running.
    ///
    /// Failures are logged rather than returned so that one bad worker cannot stop the others from
    /// being cleaned up.
    pub async fn terminate_stragglers(&mut self) -> usize {
        let mut terminated = 0;
        for worker in self.workers.iter_mut() {
            match worker.terminate().await {
                Ok(true) => terminated += 1,
                Ok(false) => {}
                Err(e) => log::error!("{e:?}"),
            }
        }

        if terminated > 0 {
            log::info!("Terminated {terminated} worker(s) that were still running");
        }

        terminated
    }
}

/// Drop can't await the kills, so this only signals the workers and reaps the ones that are
/// already gone. Any that are still exiting are reaped by Tokio once their [Child] is dropped,
/// because every worker is spawned with `kill_on_drop`.
impl Drop for WorkerSet {
    fn drop(&mut self) {
        let mut killed = Vec::new();
        for worker in self.workers.iter_mut() {
            if let Ok(Some(_)) = worker.child.try_wait() {
                continue;
            }

            log::warn!("Killing worker {} on supervisor exit", worker.index);
            match worker.child.start_kill() {
                Ok(()) => killed.push(worker),
                Err(e) => log::error!("Failed to kill worker {}: {e}", worker.index),
            }
        }

        let mut unreaped = 0;
        for worker in killed {
            if !matches!(worker.child.try_wait(), Ok(Some(_))) {
                unreaped += 1;
            }
        }
        if unreaped > 0 {
            log::debug!("{unreaped} killed worker(s) left for the runtime to reap");
        }
    }
}
