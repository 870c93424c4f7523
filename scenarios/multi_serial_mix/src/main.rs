use fanout_runner::prelude::*;

fn main() -> FanOutResult<()> {
    let cli = init();
    let (options, config) = cli.into_run()?;

    run(options, config)?;

    Ok(())
}
