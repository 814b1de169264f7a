//! Environment type resolution.
//!
//! Nothing about an environment is stored: whether a base is used as a
//! normal root or through an overlay is derived from what exists on disk.

use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use chroot_prep_common::OverlayPaths;
use chroot_prep_common::overlay_dir;
use chroot_prep_common::paths::DEFAULT_OVERLAY_NAME;
use serde::Serialize;

use super::resolv;
use crate::filesystem::{MountBackend, essential, probe};

/// Type of a chroot environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    /// The base directory is the chroot root.
    Normal,
    /// The chroot root is the `merged` view of an overlay on the base.
    Overlay,
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Overlay => write!(f, "overlay"),
        }
    }
}

/// Classify `base` for overlay `name` (`overlay` when `None`).
///
/// The environment is an overlay iff `<base>.<name>` is a directory.
#[must_use]
pub fn classify(base: &Path, name: Option<&str>) -> EnvironmentKind {
    let name = name.unwrap_or(DEFAULT_OVERLAY_NAME);
    if probe::is_dir(&overlay_dir(base, name)) {
        EnvironmentKind::Overlay
    } else {
        EnvironmentKind::Normal
    }
}

/// Names of every overlay directory next to `base`.
///
/// Only directories named `<basename>.<suffix>` with a non-empty suffix
/// count; symlinks and files are skipped. Suffixes are returned as OS
/// strings so that an overlay with a non-UTF-8 name is never missed.
#[must_use]
pub fn list_overlays(base: &Path) -> BTreeSet<OsString> {
    let mut names = BTreeSet::new();

    let (Some(parent), Some(base_name)) = (base.parent(), base.file_name()) else {
        return names;
    };

    let entries = match std::fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(
                parent = %parent.display(),
                error = %e,
                "Cannot read parent directory, assuming no overlays"
            );
            return names;
        }
    };

    let mut prefix = base_name.as_bytes().to_vec();
    prefix.push(b'.');

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }

        let file_name = entry.file_name();
        let Some(suffix) = file_name.as_bytes().strip_prefix(prefix.as_slice()) else {
            continue;
        };
        if !suffix.is_empty() {
            names.insert(OsStr::from_bytes(suffix).to_os_string());
        }
    }

    tracing::debug!(base = %base.display(), overlays = ?names, "Enumerated overlays");
    names
}

/// Point-in-time view of an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentSnapshot {
    /// Environment type.
    pub kind: EnvironmentKind,
    /// Base directory.
    pub base: PathBuf,
    /// Overlay name the snapshot was taken for.
    pub overlay: String,
    /// Effective chroot root: the base, or `merged` for an overlay.
    pub root: PathBuf,
    /// Whether the base directory exists.
    pub base_exists: bool,
    /// Whether the overlay directory exists.
    pub overlay_exists: bool,
    /// Whether the overlay's `merged` directory is mounted.
    pub merged_mounted: bool,
    /// Essential mount points currently mounted under `root`.
    pub essential_mounts: Vec<PathBuf>,
    /// Whether `root` has an `etc/resolv.conf`.
    pub resolv_conf: bool,
}

impl EnvironmentSnapshot {
    /// Inspect `base` and overlay `name` without changing anything.
    #[must_use]
    pub fn capture(backend: &dyn MountBackend, base: &Path, name: Option<&str>) -> Self {
        let overlay = name.unwrap_or(DEFAULT_OVERLAY_NAME).to_string();
        let kind = classify(base, Some(&overlay));
        let paths = OverlayPaths::new(base, &overlay);

        let overlay_exists = kind == EnvironmentKind::Overlay;
        let merged_mounted = overlay_exists && backend.is_mounted(&paths.merged);
        let root = match kind {
            EnvironmentKind::Normal => base.to_path_buf(),
            EnvironmentKind::Overlay => paths.merged,
        };

        Self {
            kind,
            base: base.to_path_buf(),
            overlay,
            base_exists: probe::is_dir(base),
            overlay_exists,
            merged_mounted,
            essential_mounts: essential::mounted_essentials(backend, &root),
            resolv_conf: resolv::has_resolv_conf(&root),
            root,
        }
    }
}
