//! Chroot environment lifecycle.
//!
//! This module provides:
//! - Environment type resolution and overlay enumeration
//! - DNS resolver provisioning
//! - The [`ChrootManager`] with setup, cleanup, removal and status

mod config;
pub mod kind;
mod lifecycle;
pub mod resolv;

pub use config::ManagerConfig;
pub use kind::{EnvironmentKind, EnvironmentSnapshot};
pub use lifecycle::{ChrootManager, Environment, Removal};
