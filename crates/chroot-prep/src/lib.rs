//! # chroot-prep
//!
//! Prepares directories for use as chroot roots and tears them down again.
//!
//! ## Features
//!
//! - **Normal environments**: `proc`, `dev` and `sys` mounted into a base
//!   directory, with the host's DNS configuration copied in
//! - **Overlay environments**: any number of named OverlayFS overlays on a
//!   read-only base, each under `<base>.<name>`
//! - **Safe removal**: everything is unmounted before anything is deleted,
//!   and deletion never crosses into a still-mounted filesystem
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//!
//! use chroot_prep::{ChrootManager, ManagerConfig};
//!
//! # fn example() -> chroot_prep_common::PrepResult<()> {
//! let manager = ChrootManager::new(ManagerConfig::default());
//!
//! // Mount an overlay named "build" on top of the base
//! let env = manager.setup(Path::new("/srv/chroots/jammy"), Some("build"))?;
//! println!("chroot into {}", env.root.display());
//!
//! // Tear it down and delete it
//! manager.remove(Path::new("/srv/chroots/jammy"), false, Some("build"))?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod environment;
pub mod filesystem;

pub use environment::{ChrootManager, Environment, EnvironmentKind, ManagerConfig, Removal};
pub use filesystem::{HostBackend, MountBackend};
