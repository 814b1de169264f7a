//! chroot-prep CLI entry point.

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use chroot_prep::cli::{Cli, log_filter};

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(rust_log.as_deref(), cli.debug)?;
    let plain = (!cli.log_json)
        .then(|| fmt::layer().with_target(true).with_writer(std::io::stderr));
    let json = cli
        .log_json
        .then(|| fmt::layer().json().with_target(true).with_writer(std::io::stderr));
    tracing_subscriber::registry()
        .with(plain)
        .with(json)
        .with(filter)
        .init();

    if !rustix::process::geteuid().is_root() {
        return Err(eyre!("chroot-prep must be run as root"));
    }

    // Execute command
    cli.execute()
}
