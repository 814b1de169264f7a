//! Filesystem operations for chroot environments.
//!
//! This module handles:
//! - Path inspection, directory creation and removal
//! - The mount table probe
//! - Mount operations and the kernel backend
//! - The essential `proc`/`dev`/`sys` filesystems
//! - OverlayFS layout and mounting

pub mod essential;
pub mod layout;
pub mod mountinfo;
pub mod mounts;
mod overlay;
pub mod probe;

pub use mounts::{
    HostBackend, MountAction, MountBackend, MountKind, MountRequest, UnmountAction, UnmountFlags,
    mount, unmount,
};
pub use overlay::OverlayFs;
