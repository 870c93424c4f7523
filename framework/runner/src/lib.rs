mod cli;
mod deadline;
mod init;
mod outcome;
mod progress;
mod run;
mod shutdown;
mod supervisor;
mod types;
mod worker;
mod workload;

pub mod prelude {
    pub use crate::cli::{FanOutCli, DEFAULT_LOG_DIR};
    pub use crate::deadline::{Deadline, DEFAULT_GRACE_PERIOD};
    pub use crate::init::init;
    pub use crate::outcome::{RunError, RunOutcome, WorkerState};
    pub use crate::run::{run, run_with_shutdown, RunConfig};
    pub use crate::supervisor::Supervisor;
    pub use crate::types::FanOutResult;
    pub use crate::worker::{worker_log_path, Worker, WorkerSet};
    pub use crate::workload::{workload_path, DEFAULT_WORKLOAD_NAME, SERIAL_MIX_PATH_ENV};

    /// Re-export of the `fanout_core` prelude.
    ///
    /// This is for convenience so that a driver can depend on a single crate.
    pub use fanout_core::prelude::*;
}
