//! On-disk layout of chroot environments.
//!
//! A normal environment is a single directory `<base>` holding
//! `dev`, `proc`, `sys` and `etc`. Every overlay of that base is a sibling
//! directory `<base>.<name>` holding `upper`, `work` and `merged`. Other
//! tooling relies on these names, so they are fixed here.

use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

use crate::error::{PrepError, PrepResult};

/// Overlay name used when none is given.
pub const DEFAULT_OVERLAY_NAME: &str = "overlay";

/// Writable layer of an overlay.
pub const UPPER_DIR: &str = "upper";

/// OverlayFS bookkeeping directory.
pub const WORK_DIR: &str = "work";

/// Mount point of the merged view.
pub const MERGED_DIR: &str = "merged";

/// Host resolver configuration copied into environments.
pub const HOST_RESOLV_CONF: &str = "/etc/resolv.conf";

/// Resolver configuration path relative to an environment root.
pub const RESOLV_CONF: &str = "etc/resolv.conf";

/// Mode for every directory created by chroot-prep.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Mode of the resolver configuration written into an environment.
pub const RESOLV_CONF_MODE: u32 = 0o644;

/// Check that `name` can be used as the `<name>` in `<base>.<name>`.
///
/// # Errors
///
/// Returns [`PrepError::InvalidOverlayName`] for empty names, `.` and `..`,
/// and names containing `/` or NUL.
pub fn validate_overlay_name(name: &str) -> PrepResult<&str> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name == "." || name == ".." {
        Some("name is a relative path component")
    } else if name.contains('/') {
        Some("name contains a path separator")
    } else if name.contains('\0') {
        Some("name contains a NUL byte")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(PrepError::InvalidOverlayName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(name),
    }
}

/// Directory of overlay `name` for `base`: the sibling `<base>.<name>`.
///
/// `name` is taken as an OS string so that overlays found on disk with
/// non-UTF-8 names can still be addressed.
#[must_use]
pub fn overlay_dir(base: &Path, name: impl AsRef<OsStr>) -> PathBuf {
    let mut dir = OsString::from(base.as_os_str());
    dir.push(".");
    dir.push(name.as_ref());
    PathBuf::from(dir)
}

/// Make `path` absolute and resolve `.` and `..` lexically.
///
/// Symlinks are not resolved. Trailing separators are dropped so that
/// [`overlay_dir`] always yields a sibling of the base.
///
/// # Errors
///
/// Returns [`PrepError::Io`] if the working directory cannot be read and
/// [`PrepError::Structure`] if the path resolves to `/`.
pub fn normalize_base(path: &Path) -> PrepResult<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(|e| PrepError::io(path, e))?;
        cwd.join(path)
    };

    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::RootDir => clean.push(Component::RootDir),
            Component::Normal(part) => clean.push(part),
            Component::ParentDir => {
                clean.pop();
            }
            Component::CurDir | Component::Prefix(_) => {}
        }
    }

    if clean.file_name().is_none() {
        return Err(PrepError::structure(
            clean,
            "the filesystem root cannot be used as a chroot base",
        ));
    }
    Ok(clean)
}

/// Paths that make up one overlay instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayPaths {
    /// Overlay root (`<base>.<name>`).
    pub root: PathBuf,
    /// Writable layer.
    pub upper: PathBuf,
    /// OverlayFS work directory.
    pub work: PathBuf,
    /// Merged mount point, the chroot root of the overlay.
    pub merged: PathBuf,
}

impl OverlayPaths {
    /// Compute the layout of overlay `name` on `base`.
    #[must_use]
    pub fn new(base: &Path, name: impl AsRef<OsStr>) -> Self {
        let root = overlay_dir(base, name);
        Self {
            upper: root.join(UPPER_DIR),
            work: root.join(WORK_DIR),
            merged: root.join(MERGED_DIR),
            root,
        }
    }

    /// The three subdirectories in creation order.
    #[must_use]
    pub fn subdirs(&self) -> [&Path; 3] {
        [&self.upper, &self.work, &self.merged]
    }
}
