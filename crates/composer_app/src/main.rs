mod actions;
mod cli;
mod config;
mod host;
mod logging;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use engine_logging::engine_info;

use crate::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::initialize(cli.log, &cli.log_file, cli.log_level());

    let mut config = config::load_config(&cli.config)?;
    if let Some(title) = cli.title {
        config.title = title;
    }

    if cli.write_config {
        let path = config::write_config(&cli.config, &config)
            .with_context(|| format!("writing {:?}", cli.config))?;
        engine_info!("Wrote configuration to {:?}", path);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;
    let result = runtime.block_on(host::run(config));
    // A pending stdin read would otherwise keep the runtime alive after `quit`.
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}
