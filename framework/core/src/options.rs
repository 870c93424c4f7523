use std::time::Duration;

/// Returned when a [RunOptions] cannot be used to start a run.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct InvalidOptionsError {
    msg: String,
}

impl InvalidOptionsError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

/// The options shared by every worker in a run.
///
/// The values are never mutated once a run starts. Each worker gets its own copy from
/// [RunOptions::for_worker], which differs from the shared options only in its
/// [RunOptions::keysuffix].
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Host name or address of the server under test.
    pub host: String,
    /// Port of the server under test.
    pub port: u16,
    /// How long each worker should drive its workload for.
    ///
    /// This is a soft target for the workload. The supervisor allows each run twice this long,
    /// plus a second, before it considers a worker stuck.
    pub duration: Duration,
    /// The number of workers to start. Must be at least 1.
    pub num_testers: usize,
    /// Workload specific arguments, passed to every worker untouched.
    pub workload_args: Vec<String>,
    /// Appended to every key the workload touches so that workers sharing a server do not collide.
    ///
    /// Unset on the shared options, set to `_<index>` on each worker's copy.
    pub keysuffix: Option<String>,
}

impl RunOptions {
    /// The longest [RunOptions::duration] a run accepts.
    ///
    /// Keeps the join budget of `2 * duration + 1` seconds well inside what a [Duration] can hold.
    pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    pub fn new(host: impl Into<String>, port: u16, duration: Duration, num_testers: usize) -> Self {
        Self {
            host: host.into(),
            port,
            duration,
            num_testers,
            workload_args: Vec::with_capacity(0),
            keysuffix: None,
        }
    }

    pub fn with_workload_args(mut self, workload_args: Vec<String>) -> Self {
        self.workload_args = workload_args;
        self
    }

    /// A copy of these options with the key suffix replaced.
    pub fn with_keysuffix(&self, keysuffix: impl Into<String>) -> Self {
        Self {
            keysuffix: Some(keysuffix.into()),
            ..self.clone()
        }
    }

    /// The options for the worker at `index`, with its key space suffixed by `_<index>`.
    pub fn for_worker(&self, index: usize) -> Self {
        self.with_keysuffix(format!("_{index}"))
    }

    pub fn validate(&self) -> Result<(), InvalidOptionsError> {
        if self.num_testers == 0 {
            return Err(InvalidOptionsError::new(
                "At least one tester is required, got 0",
            ));
        }
        if self.host.is_empty() {
            return Err(InvalidOptionsError::new("The target host must not be empty"));
        }
        if self.duration > Self::MAX_DURATION {
            return Err(InvalidOptionsError::new(format!(
                "The duration must be at most {}s, got {}s",
                Self::MAX_DURATION.as_secs(),
                format_secs(self.duration)
            )));
        }

        Ok(())
    }

    /// The flags that tell a workload where to connect and how to behave. These are appended after
    /// [RunOptions::workload_args] on the workload's command line.
    pub fn workload_flags(&self) -> Vec<String> {
        let mut flags = vec![
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
            "--duration".to_string(),
            format_secs(self.duration),
        ];
        if let Some(keysuffix) = &self.keysuffix {
            flags.push("--keysuffix".to_string());
            flags.push(keysuffix.clone());
        }

        flags
    }
}

/// Whole seconds are written without a fractional part so that workloads which only accept
/// integers keep working.
fn format_secs(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        duration.as_secs().to_string()
    } else {
        duration.as_secs_f64().to_string()
    }
}
