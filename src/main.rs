use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod archive;
mod batch;
mod cli;
mod config;
mod error;
mod fixtures;
mod groups;
mod hooks;
mod lifecycle;
mod probe;
mod remote;
mod shell;
mod snapshot;
#[cfg(test)]
mod testing;
mod verify;
mod workflow;

const LOG_ENV: &str = "PAAS_ACCEPT_LOG";

fn main() -> Result<()> {
    let args = cli::RootArgs::parse();
    init_logging(args.global.verbose);
    workflow::run(args)
}

/// Log to stderr so stdout stays machine-readable.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = if verbose {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
