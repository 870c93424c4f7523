/// Recommended error type for a driver `main` function and for code built on the runner. Errors
/// describing the run itself are [crate::outcome::RunError]s wrapped in this type, so callers can
/// `downcast_ref` to tell them apart from setup failures.
pub type FanOutResult<T> = anyhow::Result<T>;
