//! OverlayFS mount of a named overlay on a chroot base.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use chroot_prep_common::paths::{DEFAULT_DIR_MODE, OverlayPaths};
use chroot_prep_common::{PrepError, PrepResult};

use super::essential;
use super::layout;
use super::mounts::{self, MountBackend, MountRequest};
use super::probe;

/// One overlay instance, identified by its base and name.
pub struct OverlayFs<'a> {
    backend: &'a dyn MountBackend,
    base: PathBuf,
    name: OsString,
    dir_mode: u32,
    paths: OverlayPaths,
}

impl<'a> OverlayFs<'a> {
    /// Overlay `name` on `base`.
    ///
    /// `base` is expected to be normalized already.
    pub fn new(backend: &'a dyn MountBackend, base: &Path, name: impl AsRef<OsStr>) -> Self {
        let name = name.as_ref();
        Self {
            backend,
            base: base.to_path_buf(),
            name: name.to_os_string(),
            dir_mode: DEFAULT_DIR_MODE,
            paths: layout::layout_for(base, name),
        }
    }

    /// Mode for the overlay directories created by [`Self::mount`].
    #[must_use]
    pub fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    /// Paths of this overlay.
    #[must_use]
    pub fn paths(&self) -> &OverlayPaths {
        &self.paths
    }

    /// Overlay name.
    #[must_use]
    pub fn name(&self) -> &OsStr {
        &self.name
    }

    /// Whether the overlay directory exists and `merged` is mounted.
    ///
    /// The directory alone is not enough: unmounting leaves it behind.
    #[must_use]
    pub fn is_active(&self) -> bool {
        probe::is_dir(&self.paths.root) && self.backend.is_mounted(&self.paths.merged)
    }

    /// Get the mount options string.
    #[must_use]
    pub fn mount_options(&self) -> String {
        layout::mount_options(&self.base, &self.paths)
    }

    /// Create the layout, mount the overlay and its essential filesystems.
    ///
    /// If the essential filesystems cannot be mounted, whatever was mounted
    /// is unmounted again before the error is returned.
    ///
    /// # Errors
    ///
    /// - [`PrepError::AlreadyExists`] if the overlay is active
    /// - layout and precondition errors from [`layout`]
    /// - [`PrepError::Mount`] if a mount fails
    pub fn mount(&self) -> PrepResult<()> {
        let name = self.name.to_string_lossy();
        if self.is_active() {
            return Err(PrepError::AlreadyExists {
                what: format!("overlay '{name}'"),
                path: self.base.clone(),
            });
        }

        layout::ensure_layout(&self.base, &self.name, self.dir_mode)?;
        layout::validate_preconditions(self.backend, &self.base, &self.name)?;

        let options = self.mount_options();
        tracing::debug!(
            overlay = %name,
            merged = %self.paths.merged.display(),
            options = %options,
            "Mounting overlayfs"
        );
        mounts::mount(
            self.backend,
            &MountRequest::overlay(&self.paths.merged, options),
        )?;

        if let Err(err) = essential::mount_essential(self.backend, &self.paths.merged) {
            tracing::warn!(
                overlay = %name,
                error = %err,
                "Essential filesystems failed, unmounting overlay"
            );
            if let Err(e) = essential::umount_essential(self.backend, &self.paths.merged) {
                tracing::warn!(error = %e, "Rollback of essential filesystems failed");
            }
            if let Err(e) = mounts::unmount(self.backend, &self.paths.merged) {
                tracing::warn!(error = %e, "Rollback of overlay mount failed");
            }
            return Err(err);
        }

        tracing::info!(
            overlay = %name,
            merged = %self.paths.merged.display(),
            "OverlayFS mounted successfully"
        );
        Ok(())
    }

    /// Unmount the essential filesystems and then the overlay itself.
    ///
    /// Does nothing if `merged` is not mounted. Failing to unmount the
    /// essential filesystems is only logged; the overlay unmount is still
    /// attempted.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::Mount`] if `merged` cannot be unmounted.
    pub fn unmount(&self) -> PrepResult<()> {
        let name = self.name.to_string_lossy();
        if !self.backend.is_mounted(&self.paths.merged) {
            tracing::debug!(
                overlay = %name,
                merged = %self.paths.merged.display(),
                "Overlay is not mounted"
            );
            return Ok(());
        }

        if let Err(err) = essential::umount_essential(self.backend, &self.paths.merged) {
            tracing::warn!(
                overlay = %name,
                error = %err,
                "Failed to unmount essential filesystems"
            );
        }

        mounts::unmount(self.backend, &self.paths.merged)?;

        tracing::info!(overlay = %name, "OverlayFS unmounted successfully");
        Ok(())
    }
}

impl std::fmt::Debug for OverlayFs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayFs")
            .field("base", &self.base)
            .field("name", &self.name)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}
