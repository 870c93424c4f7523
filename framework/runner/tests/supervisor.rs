#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fanout_runner::prelude::{
    run, run_with_shutdown, worker_log_path, RunConfig, RunError, RunOptions, ShutdownHandle,
    Supervisor,
};
use fanout_summary_model::load_summary_runs;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const START_MARKER: &str = "Starting test against server at 127.0.0.1:11211...";

/// Options that run `script` with `sh -c` in every worker.
///
/// The workload flags become the script's positional parameters, so `$8` is the worker's key
/// suffix.
fn sh_options(script: &str, num_testers: usize, duration: Duration) -> RunOptions {
    RunOptions::new("127.0.0.1", 11211, duration, num_testers).with_workload_args(vec![
        "-c".to_string(),
        script.to_string(),
        "sh".to_string(),
    ])
}

fn sample_config(dir: &TempDir) -> RunConfig {
    let mut config = RunConfig::new("sh", dir.path().join("logs"));
    config.grace_period = Duration::from_secs(1);
    config.no_progress = true;
    config
}

/// Records the worker's pid under `pid_dir` and then never finishes.
fn hang(pid_dir: &Path) -> String {
    format!(r#"echo $$ > "{}/pid$8"; exec sleep 30"#, pid_dir.display())
}

fn read_pid(pid_dir: &Path, index: usize) -> u32 {
    std::fs::read_to_string(pid_dir.join(format!("pid_{index}")))
        .expect("worker did not record its pid")
        .trim()
        .parse()
        .expect("pid file did not hold a pid")
}

#[cfg(target_os = "linux")]
fn assert_not_running(pid: u32) {
    assert!(
        !Path::new(&format!("/proc/{pid}")).exists(),
        "worker process {pid} is still alive"
    );
}

#[cfg(not(target_os = "linux"))]
fn assert_not_running(_pid: u32) {}

/// Waits for the process to be gone, allowing it to linger as a zombie until it is reaped.
#[cfg(target_os = "linux")]
async fn assert_killed(pid: u32) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let state = std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                let (_, rest) = stat.rsplit_once(')')?;
                rest.trim_start().chars().next()
            });
        match state {
            None | Some('Z') => return,
            Some(state) if Instant::now() > deadline => {
                panic!("worker process {pid} is still alive in state {state}")
            }
            Some(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
}

#[cfg(not(target_os = "linux"))]
async fn assert_killed(_pid: u32) {}

async fn wait_for_pid_files(pid_dir: &Path, count: usize) {
    let recorded = |index: usize| {
        std::fs::read_to_string(pid_dir.join(format!("pid_{index}")))
            .is_ok_and(|pid| pid.ends_with('\n'))
    };
    while !(0..count).all(|index| recorded(index)) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn run_error(result: anyhow::Result<impl std::fmt::Debug>) -> RunError {
    result
        .expect_err("run should have failed")
        .downcast::<RunError>()
        .expect("expected a RunError")
}

fn log_files(log_dir: &Path) -> Vec<PathBuf> {
    let mut files = std::fs::read_dir(log_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
        .collect::<Vec<_>>();
    files.sort();
    files
}

#[test]
fn all_workers_succeed() {
    let dir = TempDir::new().unwrap();
    let config = sample_config(&dir);
    let log_dir = config.log_dir.clone();

    let outcome = run(
        sh_options(r#"echo "$@""#, 4, Duration::from_secs(1)),
        config,
    )
    .unwrap();

    assert_eq!(vec![0, 1, 2, 3], outcome.ok);
    assert!(outcome.stuck.is_empty());
    assert!(outcome.failed.is_empty());
    assert_eq!(4, log_files(&log_dir).len());
}

#[test]
fn each_worker_logs_only_its_own_output() {
    let dir = TempDir::new().unwrap();
    let config = sample_config(&dir);
    let log_dir = config.log_dir.clone();

    run(
        sh_options(r#"echo "$@"; echo "suffix$8" >&2"#, 3, Duration::from_secs(2)),
        config,
    )
    .unwrap();

    for index in 0..3 {
        let log = std::fs::read_to_string(worker_log_path(&log_dir, index)).unwrap();
        assert_eq!(
            format!(
                "{START_MARKER}\n--host 127.0.0.1 --port 11211 --duration 2 --keysuffix _{index}\nsuffix_{index}\nDone with test.\n"
            ),
            log
        );
    }
}

#[test]
fn one_stuck_worker_is_a_partial_failure() {
    let dir = TempDir::new().unwrap();
    let pid_dir = dir.path().to_path_buf();
    let config = sample_config(&dir);
    let log_dir = config.log_dir.clone();

    let script = format!(r#"if [ "$8" = "_3" ]; then {}; fi"#, hang(&pid_dir));

    let started = Instant::now();
    let err = run_error(run(sh_options(&script, 5, Duration::ZERO), config));

    assert_eq!(
        RunError::PartialFailure {
            count: 5,
            stuck: vec![3],
            failed: vec![],
        },
        err
    );
    assert!(started.elapsed() < Duration::from_secs(20));
    assert_not_running(read_pid(&pid_dir, 3));

    let stuck_log = std::fs::read_to_string(worker_log_path(&log_dir, 3)).unwrap();
    assert!(stuck_log.ends_with("Test did not finish in time, worker is being terminated.\n"));
    let ok_log = std::fs::read_to_string(worker_log_path(&log_dir, 4)).unwrap();
    assert!(ok_log.ends_with("Done with test.\n"));
}

#[test]
fn all_failed_workers_are_not_a_partial_failure() {
    let dir = TempDir::new().unwrap();
    let mut config = sample_config(&dir);
    let summary_path = dir.path().join("run_summary.jsonl");
    config.run_summary_path = Some(summary_path.clone());
    let log_dir = config.log_dir.clone();

    let err = run_error(run(sh_options("exit 3", 3, Duration::from_secs(1)), config));

    assert_eq!(RunError::AllFailed { count: 3 }, err);
    assert_eq!("All 3 processes failed.", err.to_string());

    let log = std::fs::read_to_string(worker_log_path(&log_dir, 1)).unwrap();
    assert!(log.contains("exit status: 3"), "{log}");

    // The summary is written for failed runs too.
    let summaries = load_summary_runs(summary_path).unwrap();
    assert_eq!(1, summaries.len());
    assert_eq!(vec![0, 1, 2], summaries[0].failed);
    assert!(!summaries[0].succeeded());
}

#[test]
fn all_stuck_workers_are_reported_and_killed() {
    let dir = TempDir::new().unwrap();
    let pid_dir = dir.path().to_path_buf();

    let started = Instant::now();
    let err = run_error(run(
        sh_options(&hang(&pid_dir), 3, Duration::ZERO),
        sample_config(&dir),
    ));

    assert_eq!(RunError::AllStuck { count: 3 }, err);
    assert_eq!("All 3 processes did not finish in time.", err.to_string());
    // One second of budget, then the one second grace period for each of the other two.
    assert!(started.elapsed() < Duration::from_secs(20));

    for index in 0..3 {
        assert_not_running(read_pid(&pid_dir, index));
    }
}

#[test]
fn stuck_and_failed_workers_are_listed_separately() {
    let dir = TempDir::new().unwrap();
    let pid_dir = dir.path().to_path_buf();

    let script = format!(
        r#"case "$8" in _1) exit 1 ;; _2) {} ;; esac"#,
        hang(&pid_dir)
    );
    let err = run_error(run(
        sh_options(&script, 3, Duration::ZERO),
        sample_config(&dir),
    ));

    assert_eq!(
        "Of processes [0 ... 2], the following did not finish in time: [2] and the following failed: [1]",
        err.to_string()
    );
}

#[test]
fn shutdown_signal_interrupts_the_run_and_kills_workers() {
    let dir = TempDir::new().unwrap();
    let pid_dir = dir.path().to_path_buf();
    let shutdown_handle = ShutdownHandle::new();

    let signaller = shutdown_handle.clone();
    let signal_pid_dir = pid_dir.clone();
    let signal_thread = std::thread::spawn(move || {
        // Wait until both workers are up before interrupting.
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline
            && !(signal_pid_dir.join("pid_0").exists() && signal_pid_dir.join("pid_1").exists())
        {
            std::thread::sleep(Duration::from_millis(20));
        }
        signaller.shutdown();
    });

    let started = Instant::now();
    let err = run_error(run_with_shutdown(
        sh_options(&hang(&pid_dir), 2, Duration::from_secs(60)),
        sample_config(&dir),
        shutdown_handle,
    ));
    signal_thread.join().unwrap();

    assert_eq!(RunError::Interrupted, err);
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_not_running(read_pid(&pid_dir, 0));
    assert_not_running(read_pid(&pid_dir, 1));
}

#[test]
fn summary_is_appended_for_successful_runs() {
    let dir = TempDir::new().unwrap();
    let mut config = sample_config(&dir);
    let summary_path = dir.path().join("run_summary.jsonl");
    config.run_summary_path = Some(summary_path.clone());
    config.run_id = Some("summary-test".to_string());

    run(sh_options("true", 2, Duration::from_secs(1)), config.clone()).unwrap();
    run(sh_options("true", 2, Duration::from_secs(1)), config).unwrap();

    let summaries = load_summary_runs(summary_path).unwrap();
    assert_eq!(2, summaries.len());
    for summary in summaries {
        assert_eq!("summary-test", summary.run_id);
        assert_eq!(2, summary.num_testers);
        assert_eq!(vec![0, 1], summary.ok);
        assert!(summary.succeeded());
    }
}

#[test]
fn existing_log_dir_is_reused_and_old_logs_overwritten() {
    let dir = TempDir::new().unwrap();
    let config = sample_config(&dir);
    std::fs::create_dir_all(&config.log_dir).unwrap();
    std::fs::write(worker_log_path(&config.log_dir, 0), "stale output from an old run\n").unwrap();
    let log_dir = config.log_dir.clone();

    run(sh_options("true", 1, Duration::from_secs(1)), config).unwrap();

    let log = std::fs::read_to_string(worker_log_path(&log_dir, 0)).unwrap();
    assert_eq!(format!("{START_MARKER}\nDone with test.\n"), log);
}

#[test]
fn missing_workload_program_is_not_a_run_error() {
    let dir = TempDir::new().unwrap();
    let mut config = sample_config(&dir);
    config.workload = PathBuf::from("/non/existent/path/to/serial_mix");

    let err = run(sh_options("true", 2, Duration::from_secs(1)), config).unwrap_err();

    assert!(!err.is::<RunError>());
    assert!(err.to_string().contains("Failed to start worker 0"), "{err}");
}

#[test]
fn zero_testers_is_rejected_before_anything_starts() {
    let dir = TempDir::new().unwrap();
    let config = sample_config(&dir);
    let log_dir = config.log_dir.clone();

    let result = run(sh_options("true", 0, Duration::from_secs(1)), config);

    assert!(result.is_err());
    assert!(!log_dir.exists());
}

#[tokio::test]
async fn dropping_the_supervisor_mid_join_kills_workers() {
    let dir = TempDir::new().unwrap();
    let pid_dir = dir.path().to_path_buf();
    let shutdown_handle = ShutdownHandle::new();

    let supervisor = Supervisor::new(
        sh_options(&hang(&pid_dir), 2, Duration::from_secs(60)),
        PathBuf::from("sh"),
        dir.path().join("logs"),
        Duration::from_secs(1),
        shutdown_handle.new_listener(),
    )
    .unwrap();

    // Stop polling the run as soon as both workers are up, which drops it in the join phase.
    tokio::select! {
        result = supervisor.run() => panic!("run finished while workers were hanging: {result:?}"),
        _ = tokio::time::timeout(Duration::from_secs(10), wait_for_pid_files(&pid_dir, 2)) => {}
    }

    for index in 0..2 {
        assert_killed(read_pid(&pid_dir, index)).await;
    }
}
