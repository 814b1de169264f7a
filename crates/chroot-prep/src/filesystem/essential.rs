//! Kernel filesystems every chroot root needs: `proc`, `dev` and `sys`.
//!
//! They are mounted as a unit in a fixed order so logs and tests are
//! reproducible, and unmounted in the reverse convention `sys`, `proc`,
//! `dev`.

use std::path::{Path, PathBuf};

use chroot_prep_common::{PrepError, PrepResult};

use super::mounts::{self, MountAction, MountBackend, MountRequest};
use super::probe;

/// Subdirectories checked before mounting, in check order.
const REQUIRED_DIRS: &[&str] = &["dev", "proc", "sys"];

/// Unmount order.
const UNMOUNT_ORDER: &[&str] = &["sys", "proc", "dev"];

/// The three mounts for `root`, in mount order.
#[must_use]
pub fn essential_mounts(root: &Path) -> [MountRequest; 3] {
    [
        MountRequest::proc(root.join("proc")),
        MountRequest::dev_bind(root.join("dev")),
        MountRequest::sys_bind(root.join("sys")),
    ]
}

/// Fail unless `dev`, `proc` and `sys` are directories under `root`.
///
/// # Errors
///
/// Returns [`PrepError::Structure`] naming the first missing directory.
pub fn check_structure(root: &Path) -> PrepResult<()> {
    for dir in REQUIRED_DIRS {
        if !probe::is_dir(&root.join(dir)) {
            return Err(PrepError::structure(
                root,
                format!("required directory {dir} does not exist"),
            ));
        }
    }
    Ok(())
}

/// Mount `proc`, `dev` and `sys` under `root`.
///
/// Points that are already mounted are skipped. The first failure aborts the
/// remaining mounts; undoing the ones that succeeded is up to the caller.
///
/// Returns the mount points this call actually mounted, in mount order.
///
/// # Errors
///
/// Returns [`PrepError::Structure`] if a required directory is missing and
/// the first [`PrepError::Mount`] otherwise.
pub fn mount_essential(backend: &dyn MountBackend, root: &Path) -> PrepResult<Vec<PathBuf>> {
    check_structure(root)?;

    tracing::debug!(root = %root.display(), "Mounting essential filesystems");

    let mut mounted = Vec::new();
    for request in essential_mounts(root) {
        if mounts::mount(backend, &request)? == MountAction::Mounted {
            mounted.push(request.target);
        }
    }
    Ok(mounted)
}

/// Unmount `sys`, `proc` and `dev` under `root`.
///
/// Keeps going past failures so as much as possible is released.
///
/// # Errors
///
/// Returns the first [`PrepError::Mount`] encountered.
pub fn umount_essential(backend: &dyn MountBackend, root: &Path) -> PrepResult<()> {
    tracing::debug!(root = %root.display(), "Unmounting essential filesystems");

    let mut first_err = None;
    for dir in UNMOUNT_ORDER {
        if let Err(err) = mounts::unmount(backend, &root.join(dir)) {
            tracing::warn!(error = %err, "Failed to unmount essential filesystem");
            first_err.get_or_insert(err);
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Essential mount points under `root` that are mounted right now, in
/// mount order.
#[must_use]
pub fn mounted_essentials(backend: &dyn MountBackend, root: &Path) -> Vec<PathBuf> {
    essential_mounts(root)
        .into_iter()
        .map(|request| request.target)
        .filter(|target| backend.is_mounted(target))
        .collect()
}

/// Undo `mounted` (as returned by [`mount_essential`]) in reverse order.
///
/// Failures are logged and otherwise ignored: rollback runs while another
/// error is already being reported.
pub fn rollback(backend: &dyn MountBackend, mounted: &[PathBuf]) {
    for target in mounted.iter().rev() {
        if let Err(err) = mounts::unmount(backend, target) {
            tracing::warn!(error = %err, "Rollback unmount failed");
        }
    }
}
