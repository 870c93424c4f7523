use std::fmt::Write;
use std::thread::JoinHandle;
use std::time::Duration;

use fanout_core::prelude::DelegatedShutdownListener;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use tokio::time::Instant;

/// Where the join phase is relative to the deadline budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Workers are still within the budget.
    Budget,
    /// The budget is spent and each remaining worker gets a grace period.
    Grace { overrun: Duration },
}

impl Phase {
    fn at(elapsed: Duration, budget: Duration) -> Self {
        match elapsed.checked_sub(budget) {
            Some(overrun) if !overrun.is_zero() => Phase::Grace { overrun },
            _ => Phase::Budget,
        }
    }

    fn message(&self, grace_period: Duration) -> String {
        match self {
            Phase::Budget => "waiting for workers".to_string(),
            Phase::Grace { overrun } => format!(
                "budget used up {}s ago, giving each remaining worker up to {}s",
                overrun.as_secs(),
                grace_period.as_secs_f64()
            ),
        }
    }
}

fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Displays a progress bar while the workers are joined, showing how much of the time budget has
/// been used and when the run has moved on to grace periods.
///
/// The bar is cleared once the shutdown listener fires. Join the returned handle to wait for that.
pub fn start_progress(
    budget: Duration,
    grace_period: Duration,
    mut shutdown_listener: DelegatedShutdownListener,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            let pb = ProgressBar::new(budget.as_secs());
            let budget_label = format_hms(budget);
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {budget}] {msg}",
                )
                .expect("Failed to set progress style")
                .with_key("budget", move |_state: &ProgressState, w: &mut dyn Write| {
                    write!(w, "{budget_label}").expect("Could not write budget")
                })
                .progress_chars("#>-"),
            );

            let mut phase = Phase::Budget;
            pb.set_message(phase.message(grace_period));
            loop {
                if shutdown_listener.should_shutdown() {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                let elapsed = start_time.elapsed();
                let current = Phase::at(elapsed, budget);
                if current != phase {
                    if phase == Phase::Budget {
                        log::debug!("Time budget of {}s used up", budget.as_secs_f64());
                    }
                    pb.set_message(current.message(grace_period));
                    phase = current;
                }

                pb.set_position(elapsed.as_secs().min(budget.as_secs()));
                std::thread::sleep(Duration::from_millis(250));
            }
        })
        .expect("Failed to start progress thread")
}
