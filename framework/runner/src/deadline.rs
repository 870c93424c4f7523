use std::time::Duration;

use tokio::time::Instant;

/// How long workers get to wait once the budget is used up, unless overridden.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(15);

/// Tracks the time budget for the join phase of a run.
///
/// The budget is `2 * duration + 1` seconds from [Deadline::start]. The workload duration is only
/// a target for the workload, so workers are given plenty of extra time before they are treated
/// as stuck.
#[derive(Debug, Clone)]
pub struct Deadline {
    started: Instant,
    duration: Duration,
    grace_period: Duration,
}

impl Deadline {
    pub fn start(duration: Duration, grace_period: Duration) -> Self {
        Self {
            started: Instant::now(),
            duration,
            grace_period,
        }
    }

    /// The full budget as it stands when nothing has elapsed.
    ///
    /// Saturates at [Duration::MAX] rather than overflowing.
    pub fn budget(&self) -> Duration {
        self.duration
            .saturating_mul(2)
            .saturating_add(Duration::from_secs(1))
    }

    /// Seconds left in the budget. Negative once the budget is overspent.
    pub fn time_remaining(&self) -> f64 {
        self.time_remaining_after(self.started.elapsed())
    }

    pub fn time_remaining_after(&self, elapsed: Duration) -> f64 {
        self.duration.as_secs_f64() * 2.0 - elapsed.as_secs_f64() + 1.0
    }

    /// How long to wait on the next worker.
    ///
    /// This is the remaining budget, or the grace period once the budget is used up. It is never
    /// zero so a worker that is just about to finish still gets a chance.
    pub fn wait_window(&self) -> Duration {
        self.wait_window_after(self.started.elapsed())
    }

    pub fn wait_window_after(&self, elapsed: Duration) -> Duration {
        match self.budget().checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => remaining,
            _ => self.grace_period,
        }
    }
}
