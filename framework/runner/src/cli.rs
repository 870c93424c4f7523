use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use fanout_core::prelude::RunOptions;

use crate::{run::RunConfig, types::FanOutResult, workload::workload_path};

/// Directory the per-worker logs are written to unless `--log-dir` is given.
pub const DEFAULT_LOG_DIR: &str = "multi_serial_mix_out";

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
pub struct FanOutCli {
    /// Host of the server to run the workload against
    #[clap(long, default_value = "localhost")]
    pub host: String,

    /// Port of the server to run the workload against
    #[clap(long, default_value_t = 11211)]
    pub port: u16,

    /// The number of seconds each worker should run the workload for. Fractions are allowed.
    ///
    /// Workers get twice this long, plus one second, to finish before they are reported as stuck.
    #[clap(long, default_value = "10", value_parser = parse_duration)]
    pub duration: Duration,

    /// The number of worker processes to run
    #[clap(long, default_value_t = 16, value_parser = parse_num_testers)]
    pub num_testers: usize,

    /// Path to the workload program that each worker runs.
    ///
    /// If not given, the `SERIAL_MIX_PATH` environment variable is used, and if that is not set
    /// `serial_mix` is looked up on the `PATH`.
    #[clap(long)]
    pub workload: Option<PathBuf>,

    /// Directory to write one log file per worker to
    #[clap(long, default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,

    /// How many seconds to keep waiting on each remaining worker once the time budget is used up
    #[clap(long, default_value = "15", value_parser = parse_grace_period)]
    pub grace_period: Duration,

    /// File to append a JSON summary of the run to
    #[clap(long, default_value = "run_summary.jsonl")]
    pub run_summary: PathBuf,

    /// Identifier to record for this run in the run summary. A random one is chosen if not given.
    #[clap(long)]
    pub run_id: Option<String>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Extra options for the workload, passed to every worker as they are. Give them after `--`.
    #[clap(last = true)]
    pub workload_args: Vec<String>,
}

impl FanOutCli {
    /// Resolve the workload program and split the arguments into the options shared by the
    /// workers and the configuration of the run itself.
    pub fn into_run(self) -> FanOutResult<(RunOptions, RunConfig)> {
        let workload = workload_path(self.workload.as_deref())?;

        let options = RunOptions::new(self.host, self.port, self.duration, self.num_testers)
            .with_workload_args(self.workload_args);
        options.validate()?;

        let config = RunConfig {
            workload,
            log_dir: self.log_dir,
            grace_period: self.grace_period,
            run_summary_path: Some(self.run_summary),
            run_id: self.run_id,
            no_progress: self.no_progress,
        };

        Ok((options, config))
    }
}

fn parse_secs(s: &str) -> anyhow::Result<Duration> {
    let secs = s
        .parse::<f64>()
        .map_err(|e| anyhow::anyhow!("Not a number of seconds: {e}"))?;
    if !secs.is_finite() || secs < 0.0 {
        anyhow::bail!("Expected a non-negative number of seconds, got {s}");
    }

    Duration::try_from_secs_f64(secs).map_err(|e| anyhow::anyhow!("Too many seconds, {s}: {e}"))
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let duration = parse_secs(s)?;
    if duration > RunOptions::MAX_DURATION {
        anyhow::bail!(
            "The duration must be at most {} seconds, got {s}",
            RunOptions::MAX_DURATION.as_secs()
        );
    }

    Ok(duration)
}

fn parse_grace_period(s: &str) -> anyhow::Result<Duration> {
    let grace_period = parse_secs(s)?;
    if grace_period.is_zero() {
        anyhow::bail!("The grace period must be longer than zero");
    }
    if grace_period > RunOptions::MAX_DURATION {
        anyhow::bail!(
            "The grace period must be at most {} seconds, got {s}",
            RunOptions::MAX_DURATION.as_secs()
        );
    }

    Ok(grace_period)
}

fn parse_num_testers(s: &str) -> anyhow::Result<usize> {
    let num_testers = s
        .parse::<usize>()
        .map_err(|e| anyhow::anyhow!("Not a number of testers: {e}"))?;
    if num_testers == 0 {
        anyhow::bail!("At least one tester is required");
    }

    Ok(num_testers)
}
