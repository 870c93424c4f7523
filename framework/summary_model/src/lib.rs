use serde::{Deserialize, Serialize};
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner unless one is given on the command line.
    pub run_id: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The host of the server that the workers ran against
    pub host: String,
    /// The port of the server that the workers ran against
    pub port: u16,
    /// The workload duration that the run was configured with, in seconds
    ///
    /// Workers were allowed up to twice this long, plus one second, before being considered stuck.
    pub run_duration: f64,
    /// The number of workers started
    pub num_testers: usize,
    /// The directory the per-worker logs were written to
    pub log_dir: String,
    /// Indices of the workers that exited successfully, in ascending order
    pub ok: Vec<usize>,
    /// Indices of the workers that were still running when the run gave up on them, in ascending
    /// order
    ///
    /// These workers were killed by the supervisor.
    pub stuck: Vec<usize>,
    /// Indices of the workers that exited with a failure, in ascending order
    pub failed: Vec<usize>,
    /// The version of the driver that produced this summary
    pub version: String,
}

impl RunSummary {
    /// Create a new run summary
    ///
    /// The worker outcomes start empty, set them with [RunSummary::set_outcome] once the run has
    /// finished.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: String,
        started_at: i64,
        host: String,
        port: u16,
        run_duration: f64,
        num_testers: usize,
        log_dir: String,
        version: String,
    ) -> Self {
        Self {
            run_id,
            started_at,
            host,
            port,
            run_duration,
            num_testers,
            log_dir,
            ok: Vec::with_capacity(0),
            stuck: Vec::with_capacity(0),
            failed: Vec::with_capacity(0),
            version,
        }
    }

    /// Record which workers succeeded, got stuck or failed
    pub fn set_outcome(&mut self, ok: Vec<usize>, stuck: Vec<usize>, failed: Vec<usize>) {
        self.ok = ok;
        self.stuck = stuck;
        self.failed = failed;
    }

    /// Whether every worker exited successfully
    pub fn succeeded(&self) -> bool {
        self.stuck.is_empty() && self.failed.is_empty() && self.ok.len() == self.num_testers
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: RunSummary, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, &run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: PathBuf) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}
