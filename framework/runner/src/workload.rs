use std::env;
use std::path::{Path, PathBuf};

use anyhow::bail;
use anyhow::Context;

use crate::types::FanOutResult;

/// Environment variable to override the path to the workload program run by each worker.
pub const SERIAL_MIX_PATH_ENV: &str = "SERIAL_MIX_PATH";

/// The name of the workload program looked up on the user's `PATH` when nothing else is configured.
pub const DEFAULT_WORKLOAD_NAME: &str = "serial_mix";

/// Get the path to the workload program.
///
/// A path passed explicitly, usually from `--workload`, wins and must exist. Otherwise the
/// [`SERIAL_MIX_PATH_ENV`] environment variable is used if set. If neither is set then
/// [`DEFAULT_WORKLOAD_NAME`] is looked up on the user's `PATH`.
pub fn workload_path(explicit: Option<&Path>) -> FanOutResult<PathBuf> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("Workload program '{}' doesn't exist", path.display());
        }
        return Ok(path.to_path_buf());
    }

    match env::var(SERIAL_MIX_PATH_ENV).ok().as_deref() {
        Some("") => {
            bail!("'{SERIAL_MIX_PATH_ENV}' set to empty string");
        }
        Some(DEFAULT_WORKLOAD_NAME) | None => {
            log::warn!("'{SERIAL_MIX_PATH_ENV}' is not a path so looking in user's 'PATH'");
            which::which(DEFAULT_WORKLOAD_NAME).with_context(|| {
                format!(
                    "Workload program '{DEFAULT_WORKLOAD_NAME}' not found in PATH. Please install it, pass '--workload' or set '{SERIAL_MIX_PATH_ENV}' to the correct path."
                )
            })
        }
        Some(path) => {
            let workload_path = PathBuf::from(path);
            if !workload_path.exists() {
                bail!(
                    "Path to workload program overwritten with '{SERIAL_MIX_PATH_ENV}={path}' but that path doesn't exist",
                    path = workload_path.display()
                );
            }
            Ok(workload_path)
        }
    }
}
