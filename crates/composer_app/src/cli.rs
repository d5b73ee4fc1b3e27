use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

use crate::logging::LogDestination;

/// Background generation host for a live-preview editing surface.
///
/// Reads surface envelopes and host action lines from stdin and writes
/// surface commands to stdout, one JSON object per line.
#[derive(Debug, Parser)]
#[command(name = "composer_host", version)]
pub struct Cli {
    /// RON configuration file; defaults are used when it does not exist.
    #[arg(short, long, default_value = "composer.ron")]
    pub config: PathBuf,

    /// Document title; overrides the configured one.
    #[arg(short, long)]
    pub title: Option<String>,

    #[arg(long, value_enum, default_value_t = LogDestination::File)]
    pub log: LogDestination,

    #[arg(long, default_value = "composer.log")]
    pub log_file: PathBuf,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,

    /// Write the effective configuration to `--config` and exit.
    #[arg(long)]
    pub write_config: bool,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}
