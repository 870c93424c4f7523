use crate::cli::FanOutCli;
use clap::Parser;

/// Initialise the CLI and logging for the fan-out runner.
pub fn init() -> FanOutCli {
    env_logger::init();

    FanOutCli::parse()
}
