//! Creation and validation of an overlay's `upper`/`work`/`merged` tree.

use std::ffi::OsStr;
use std::path::Path;

use chroot_prep_common::paths::OverlayPaths;
use chroot_prep_common::{PrepError, PrepResult};

use super::mounts::MountBackend;
use super::probe;

/// Compute the layout of overlay `name` on `base`.
#[must_use]
pub fn layout_for(base: &Path, name: impl AsRef<OsStr>) -> OverlayPaths {
    OverlayPaths::new(base, name)
}

/// Create the overlay root and its three subdirectories with `mode`.
///
/// # Errors
///
/// Returns [`PrepError::Io`] if a directory cannot be created.
pub fn ensure_layout(
    base: &Path,
    name: impl AsRef<OsStr>,
    mode: u32,
) -> PrepResult<OverlayPaths> {
    let paths = layout_for(base, name);
    probe::ensure_dir(&paths.root, mode)?;
    for dir in paths.subdirs() {
        probe::ensure_dir(dir, mode)?;
    }
    Ok(paths)
}

/// Check everything OverlayFS needs before the mount is attempted.
///
/// # Errors
///
/// - [`PrepError::Structure`] if `base`, `upper` or `work` is missing
/// - [`PrepError::CrossDevice`] if `upper` and `work` are on different
///   filesystems
/// - [`PrepError::Io`] if either cannot be stat'ed
pub fn validate_preconditions(
    backend: &dyn MountBackend,
    base: &Path,
    name: impl AsRef<OsStr>,
) -> PrepResult<OverlayPaths> {
    if !probe::is_dir(base) {
        return Err(PrepError::structure(base, "base directory does not exist"));
    }

    let paths = layout_for(base, name);
    if !probe::is_dir(&paths.upper) {
        return Err(PrepError::structure(
            &paths.upper,
            "upper directory does not exist",
        ));
    }
    if !probe::is_dir(&paths.work) {
        return Err(PrepError::structure(
            &paths.work,
            "work directory does not exist",
        ));
    }

    let upper_dev = backend
        .device_id(&paths.upper)
        .map_err(|e| PrepError::io(&paths.upper, e))?;
    let work_dev = backend
        .device_id(&paths.work)
        .map_err(|e| PrepError::io(&paths.work, e))?;

    if upper_dev != work_dev {
        return Err(PrepError::CrossDevice {
            upper: paths.upper,
            work: paths.work,
        });
    }

    Ok(paths)
}

/// OverlayFS data string for `paths` on top of `base`.
#[must_use]
pub fn mount_options(base: &Path, paths: &OverlayPaths) -> String {
    format!(
        "lowerdir={},upperdir={},workdir={}",
        base.display(),
        paths.upper.display(),
        paths.work.display()
    )
}
