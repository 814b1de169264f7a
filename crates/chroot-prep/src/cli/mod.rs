//! CLI command definitions and handlers.

use std::path::{Path, PathBuf};

use chroot_prep_common::paths::{DEFAULT_OVERLAY_NAME, HOST_RESOLV_CONF};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;

use crate::environment::{ChrootManager, EnvironmentKind, EnvironmentSnapshot, ManagerConfig};

/// chroot-prep - Prepare and tear down chroot environments
#[derive(Parser)]
#[command(name = "chroot-prep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Host resolver configuration copied into environments
    #[arg(
        long,
        global = true,
        env = "CHROOT_PREP_RESOLV_CONF",
        default_value = HOST_RESOLV_CONF
    )]
    pub resolv_conf: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Environment selection shared by every command.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Base directory of the chroot environment
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Work on an overlay of the base ("overlay" if no name is given)
    #[arg(
        long,
        value_name = "NAME",
        num_args = 0..=1,
        default_missing_value = DEFAULT_OVERLAY_NAME
    )]
    pub overlay: Option<String>,
}

/// chroot-prep commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Mount essential filesystems and configure DNS
    Setup {
        /// Environment to set up.
        #[command(flatten)]
        target: Target,
    },

    /// Unmount essential filesystems and remove the DNS configuration
    Cleanup {
        /// Environment to clean up.
        #[command(flatten)]
        target: Target,
    },

    /// Clean up and delete an environment
    Remove {
        /// Environment to remove.
        #[command(flatten)]
        target: Target,

        /// Delete even if unmounting fails
        #[arg(short, long)]
        force: bool,
    },

    /// Show the state of an environment
    Status {
        /// Environment to inspect.
        #[command(flatten)]
        target: Target,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Execute the CLI command.
    pub fn execute(self) -> Result<()> {
        let config = ManagerConfig::default().with_host_resolv_conf(self.resolv_conf);
        let manager = ChrootManager::new(config);

        match self.command {
            Commands::Setup { target } => {
                let env = manager
                    .setup(&target.dir, target.overlay.as_deref())
                    .map_err(|e| eyre!("Failed to set up environment: {}", e))?;

                match env.overlay {
                    Some(name) => println!(
                        "Overlay {} set up, chroot into {}",
                        name,
                        env.root.display()
                    ),
                    None => println!("Chroot environment set up at {}", env.root.display()),
                }
                Ok(())
            }

            Commands::Cleanup { target } => {
                manager
                    .cleanup(&target.dir, target.overlay.as_deref())
                    .map_err(|e| eyre!("Failed to clean up environment: {}", e))?;

                match target.overlay {
                    Some(name) => println!("Overlay {} cleaned up", name),
                    None => println!(
                        "Chroot environment at {} cleaned up",
                        target.dir.display()
                    ),
                }
                Ok(())
            }

            Commands::Remove { target, force } => {
                let removal = manager
                    .remove(&target.dir, force, target.overlay.as_deref())
                    .map_err(|e| eyre!("Failed to remove environment: {}", e))?;

                for path in &removal.removed {
                    println!("Removed {}", path.display());
                }
                for warning in &removal.warnings {
                    eprintln!("warning: {warning}");
                }
                if !removal.warnings.is_empty() {
                    println!("Removed with {} warning(s)", removal.warnings.len());
                }
                Ok(())
            }

            Commands::Status { target, json } => {
                let snapshot = manager
                    .status(&target.dir, target.overlay.as_deref())
                    .map_err(|e| eyre!("Failed to inspect environment: {}", e))?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                } else {
                    print_status(&snapshot);
                }
                Ok(())
            }
        }
    }
}

/// Log filter for the CLI.
///
/// `rust_log` (the `RUST_LOG` value) wins when set; otherwise only
/// chroot-prep's own events at info are shown. `debug` raises chroot-prep
/// to debug on top of either.
///
/// # Errors
///
/// Returns a [`ParseError`] if `rust_log` holds an invalid directive.
pub fn log_filter(rust_log: Option<&str>, debug: bool) -> Result<EnvFilter, ParseError> {
    let filter = match rust_log.filter(|directives| !directives.trim().is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_new("chroot_prep=info")?,
    };
    if debug {
        Ok(filter.add_directive("chroot_prep=debug".parse()?))
    } else {
        Ok(filter)
    }
}

fn print_status(snapshot: &EnvironmentSnapshot) {
    println!("Base:        {}", describe(&snapshot.base, snapshot.base_exists));
    println!("Type:        {}", snapshot.kind);
    if snapshot.kind == EnvironmentKind::Overlay {
        println!("Overlay:     {}", snapshot.overlay);
        println!(
            "Merged:      {}",
            if snapshot.merged_mounted { "mounted" } else { "not mounted" }
        );
    }
    println!("Root:        {}", snapshot.root.display());

    let mounted: Vec<_> = snapshot
        .essential_mounts
        .iter()
        .filter_map(|p| p.file_name())
        .map(|name| name.to_string_lossy())
        .collect();
    if mounted.is_empty() {
        println!("Mounted:     none");
    } else {
        println!("Mounted:     {}", mounted.join(", "));
    }
    println!(
        "resolv.conf: {}",
        if snapshot.resolv_conf { "present" } else { "absent" }
    );
}

fn describe(path: &Path, exists: bool) -> String {
    if exists {
        path.display().to_string()
    } else {
        format!("{} (missing)", path.display())
    }
}
