use std::process::ExitStatus;

/// Why a run did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    /// Every worker was still running when its wait ran out, which usually means the server is
    /// down or hung.
    #[error("All {count} processes did not finish in time.")]
    AllStuck { count: usize },
    /// Every worker exited with a failure, which usually means a problem shared by all of them
    /// such as bad options.
    #[error("All {count} processes failed.")]
    AllFailed { count: usize },
    #[error(
        "Of processes [0 ... {last}], the following did not finish in time: {stuck:?} and the following failed: {failed:?}",
        last = .count.saturating_sub(1)
    )]
    PartialFailure {
        count: usize,
        stuck: Vec<usize>,
        failed: Vec<usize>,
    },
    /// The supervisor was told to shut down before the workers were all joined.
    #[error("Interrupted while waiting for child processes")]
    Interrupted,
}

/// What a worker looked like when the join phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    StillRunning,
    Finished(ExitStatus),
}

/// Which workers succeeded, got stuck or failed.
///
/// Every worker index appears in exactly one of the sets and each set is in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub ok: Vec<usize>,
    pub stuck: Vec<usize>,
    pub failed: Vec<usize>,
}

impl RunOutcome {
    /// Classify the worker states, where the state at position `i` belongs to worker `i`.
    ///
    /// A worker that was killed by a signal has no exit code and counts as failed.
    pub fn classify(states: impl IntoIterator<Item = WorkerState>) -> Self {
        let mut outcome = Self::default();
        for (index, state) in states.into_iter().enumerate() {
            match state {
                WorkerState::Finished(status) if status.success() => outcome.ok.push(index),
                WorkerState::Finished(_) => outcome.failed.push(index),
                WorkerState::StillRunning => outcome.stuck.push(index),
            }
        }

        outcome
    }

    pub fn num_workers(&self) -> usize {
        self.ok.len() + self.stuck.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.stuck.is_empty() && self.failed.is_empty()
    }

    /// Turn the outcome into the error to report, if there is one.
    pub fn check(&self) -> Result<(), RunError> {
        if self.is_success() {
            return Ok(());
        }

        let count = self.num_workers();
        if self.stuck.len() == count {
            Err(RunError::AllStuck { count })
        } else if self.failed.len() == count {
            Err(RunError::AllFailed { count })
        } else {
            Err(RunError::PartialFailure {
                count,
                stuck: self.stuck.clone(),
                failed: self.failed.clone(),
            })
        }
    }
}
