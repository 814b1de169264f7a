//! Setup, cleanup and removal of chroot environments.
//!
//! The manager holds no state about environments. Every call normalizes the
//! base path and re-derives what exists from the filesystem and the live
//! mount table, so it can be pointed at environments prepared by an earlier
//! invocation.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use chroot_prep_common::{
    OverlayPaths, PrepError, PrepResult, normalize_base, overlay_dir, validate_overlay_name,
};
use serde::Serialize;

use super::config::ManagerConfig;
use super::kind::{self, EnvironmentKind, EnvironmentSnapshot};
use super::resolv;
use crate::filesystem::{HostBackend, MountBackend, OverlayFs, essential, probe};

/// An environment that has been set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    /// Base directory.
    pub base: PathBuf,
    /// Environment type.
    pub kind: EnvironmentKind,
    /// Overlay name, for overlay environments.
    pub overlay: Option<String>,
    /// Directory to chroot into.
    pub root: PathBuf,
}

/// Outcome of [`ChrootManager::remove`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Removal {
    /// Deleted directories, in deletion order.
    pub removed: Vec<PathBuf>,
    /// Failures that `force` turned into warnings.
    pub warnings: Vec<String>,
}

/// Chroot environment manager.
#[derive(Debug)]
pub struct ChrootManager<B: MountBackend = HostBackend> {
    backend: B,
    config: ManagerConfig,
}

impl ChrootManager<HostBackend> {
    /// Manager operating on the running host.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_backend(HostBackend, config)
    }
}

impl Default for ChrootManager<HostBackend> {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl<B: MountBackend> ChrootManager<B> {
    /// Manager using a custom mount backend.
    pub const fn with_backend(backend: B, config: ManagerConfig) -> Self {
        Self { backend, config }
    }

    /// The mount backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The configuration.
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Prepare an environment for chrooting.
    ///
    /// Without an overlay name the essential filesystems and the resolver
    /// configuration go directly into `base`. With a name, the overlay
    /// `<base>.<name>` is created and mounted and they go into its `merged`
    /// view. A failure after something was mounted undoes what this call
    /// mounted.
    ///
    /// # Errors
    ///
    /// - [`PrepError::InvalidOverlayName`] for an unusable name
    /// - [`PrepError::Structure`] if `base` or its `dev`/`proc`/`sys` are missing
    /// - [`PrepError::AlreadyExists`] if the environment is already set up
    /// - [`PrepError::CrossDevice`] if the overlay's upper and work dirs differ
    /// - [`PrepError::Mount`] or [`PrepError::Io`] otherwise
    pub fn setup(&self, base: &Path, overlay: Option<&str>) -> PrepResult<Environment> {
        let base = prepare_args(base, overlay)?;
        if !probe::is_dir(&base) {
            return Err(PrepError::structure(&base, "base directory does not exist"));
        }

        match overlay {
            None => self.setup_normal(&base),
            Some(name) => self.setup_overlay(&base, name),
        }
    }

    fn setup_normal(&self, base: &Path) -> PrepResult<Environment> {
        let before = essential::mounted_essentials(&self.backend, base);
        if before.len() == essential::essential_mounts(base).len() {
            return Err(PrepError::AlreadyExists {
                what: "chroot environment".to_string(),
                path: base.to_path_buf(),
            });
        }

        tracing::info!(base = %base.display(), "Setting up chroot environment");

        let mounted = match essential::mount_essential(&self.backend, base) {
            Ok(mounted) => mounted,
            Err(err) => {
                let partial: Vec<_> = essential::mounted_essentials(&self.backend, base)
                    .into_iter()
                    .filter(|target| !before.contains(target))
                    .collect();
                essential::rollback(&self.backend, &partial);
                return Err(err);
            }
        };

        if let Err(err) =
            resolv::setup_resolv_conf(&self.config.host_resolv_conf, base, self.config.dir_mode)
        {
            essential::rollback(&self.backend, &mounted);
            return Err(err);
        }

        tracing::info!(base = %base.display(), "Chroot environment ready");
        Ok(Environment {
            base: base.to_path_buf(),
            kind: EnvironmentKind::Normal,
            overlay: None,
            root: base.to_path_buf(),
        })
    }

    fn setup_overlay(&self, base: &Path, name: &str) -> PrepResult<Environment> {
        tracing::info!(base = %base.display(), overlay = name, "Setting up overlay environment");

        let overlay = OverlayFs::new(&self.backend, base, name)
            .with_dir_mode(self.config.dir_mode);
        overlay.mount()?;

        let merged = overlay.paths().merged.clone();
        if let Err(err) =
            resolv::setup_resolv_conf(&self.config.host_resolv_conf, &merged, self.config.dir_mode)
        {
            if let Err(e) = overlay.unmount() {
                tracing::warn!(overlay = name, error = %e, "Failed to roll back overlay mount");
            }
            return Err(err);
        }

        tracing::info!(overlay = name, root = %merged.display(), "Overlay environment ready");
        Ok(Environment {
            base: base.to_path_buf(),
            kind: EnvironmentKind::Overlay,
            overlay: Some(name.to_string()),
            root: merged,
        })
    }

    /// Tear an environment down without deleting anything but the copied
    /// resolver configuration.
    ///
    /// # Errors
    ///
    /// - [`PrepError::InvalidOverlayName`] for an unusable name
    /// - [`PrepError::Structure`] if the base or overlay directory is missing
    /// - [`PrepError::Mount`] if an unmount fails
    pub fn cleanup(&self, base: &Path, overlay: Option<&str>) -> PrepResult<()> {
        let base = prepare_args(base, overlay)?;
        match overlay {
            None => self.cleanup_normal(&base),
            Some(name) => self.cleanup_overlay(&base, OsStr::new(name)),
        }
    }

    fn cleanup_normal(&self, base: &Path) -> PrepResult<()> {
        if probe::path_kind(base) == probe::PathKind::Missing {
            return Err(PrepError::structure(base, "base directory does not exist"));
        }

        tracing::info!(base = %base.display(), "Cleaning up chroot environment");
        essential::umount_essential(&self.backend, base)?;

        if let Err(err) = resolv::cleanup_resolv_conf(base) {
            tracing::warn!(base = %base.display(), error = %err, "Failed to remove resolv.conf");
        }
        Ok(())
    }

    fn cleanup_overlay(&self, base: &Path, name: &OsStr) -> PrepResult<()> {
        let overlay = OverlayFs::new(&self.backend, base, name);
        let root = &overlay.paths().root;
        if !probe::is_dir(root) {
            return Err(PrepError::structure(root, "overlay directory does not exist"));
        }

        let label = name.to_string_lossy();
        tracing::info!(base = %base.display(), overlay = %label, "Cleaning up overlay environment");

        let merged = &overlay.paths().merged;
        if self.backend.is_mounted(merged) {
            if let Err(err) = resolv::cleanup_resolv_conf(merged) {
                tracing::warn!(overlay = %label, error = %err, "Failed to remove resolv.conf");
            }
        }

        overlay.unmount()
    }

    /// Tear down and delete an environment.
    ///
    /// With an overlay name only `<base>.<name>` is removed; the base and
    /// sibling overlays stay. Without one, every overlay of `base` is
    /// removed and then `base` itself. Everything is torn down before
    /// anything is deleted, and overlays are deleted before the base.
    ///
    /// A directory is never deleted while one of its mount points is still
    /// mounted. Without `force` the first failure aborts; a teardown failure
    /// aborts before anything is deleted. With `force` teardown and deletion
    /// failures become warnings in the returned [`Removal`] and the
    /// remaining targets are still deleted.
    ///
    /// # Errors
    ///
    /// - [`PrepError::InvalidOverlayName`] for an unusable name
    /// - [`PrepError::Structure`] if there is nothing to remove
    /// - teardown errors without `force`
    /// - [`PrepError::Io`] if a directory cannot be deleted, without `force`
    pub fn remove(&self, base: &Path, force: bool, overlay: Option<&str>) -> PrepResult<Removal> {
        let base = prepare_args(base, overlay)?;
        match overlay {
            Some(name) => self.remove_overlay(&base, name, force),
            None => self.remove_all(&base, force),
        }
    }

    fn remove_overlay(&self, base: &Path, name: &str, force: bool) -> PrepResult<Removal> {
        let root = overlay_dir(base, name);
        if !probe::is_dir(&root) {
            return Err(PrepError::structure(&root, "overlay directory does not exist"));
        }

        let name = OsStr::new(name);
        let mut removal = Removal::default();
        if let Err(err) = self.cleanup_overlay(base, name) {
            downgrade(err, force, &mut removal)?;
        }

        self.delete(root, &overlay_mount_points(base, name), force, &mut removal)?;
        Ok(removal)
    }

    fn remove_all(&self, base: &Path, force: bool) -> PrepResult<Removal> {
        let overlays = kind::list_overlays(base);
        let base_exists = probe::is_dir(base);
        if overlays.is_empty() && !base_exists {
            return Err(PrepError::structure(base, "nothing to remove"));
        }

        tracing::info!(
            base = %base.display(),
            overlays = overlays.len(),
            force,
            "Removing chroot environment"
        );

        let mut removal = Removal::default();
        for name in &overlays {
            if let Err(err) = self.cleanup_overlay(base, name) {
                downgrade(err, force, &mut removal)?;
            }
        }
        if base_exists {
            if let Err(err) = self.cleanup_normal(base) {
                downgrade(err, force, &mut removal)?;
            }
        }

        let mut targets: Vec<(PathBuf, Vec<PathBuf>)> = overlays
            .iter()
            .map(|name| (overlay_dir(base, name), overlay_mount_points(base, name)))
            .collect();
        if base_exists {
            targets.push((base.to_path_buf(), essential_mount_points(base)));
        }

        for (target, mount_points) in targets {
            self.delete(target, &mount_points, force, &mut removal)?;
        }
        Ok(removal)
    }

    /// Delete `target` unless one of `mount_points` is still mounted.
    ///
    /// Under `force` a failure is recorded as a warning instead.
    fn delete(
        &self,
        target: PathBuf,
        mount_points: &[PathBuf],
        force: bool,
        removal: &mut Removal,
    ) -> PrepResult<()> {
        let live = mount_points
            .iter()
            .find(|point| self.backend.is_mounted(point));
        let result = match live {
            Some(point) => Err(PrepError::io(
                point,
                io::Error::new(io::ErrorKind::ResourceBusy, "still mounted, not deleting"),
            )),
            None => probe::remove_if_exists(&target),
        };

        match result {
            Ok(()) => {
                tracing::info!(path = %target.display(), "Removed");
                removal.removed.push(target);
                Ok(())
            }
            Err(err) if force => {
                tracing::warn!(
                    path = %target.display(),
                    error = %err,
                    "Failed to remove, continuing"
                );
                removal.warnings.push(err.to_string());
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Inspect an environment without changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::InvalidOverlayName`] for an unusable name and
    /// [`PrepError::Structure`] if `base` cannot be normalized.
    pub fn status(&self, base: &Path, overlay: Option<&str>) -> PrepResult<EnvironmentSnapshot> {
        let base = prepare_args(base, overlay)?;
        Ok(EnvironmentSnapshot::capture(&self.backend, &base, overlay))
    }
}

/// Validate the overlay name and normalize `base`.
fn prepare_args(base: &Path, overlay: Option<&str>) -> PrepResult<PathBuf> {
    if let Some(name) = overlay {
        validate_overlay_name(name)?;
    }
    normalize_base(base)
}

/// Mount points under an environment root.
fn essential_mount_points(root: &Path) -> Vec<PathBuf> {
    essential::essential_mounts(root)
        .into_iter()
        .map(|request| request.target)
        .collect()
}

/// Mount points under overlay `name`: its essentials and `merged` itself.
fn overlay_mount_points(base: &Path, name: &OsStr) -> Vec<PathBuf> {
    let merged = OverlayPaths::new(base, name).merged;
    let mut points = essential_mount_points(&merged);
    points.push(merged);
    points
}

/// Return `err` unless `force`, in which case it is recorded as a warning.
fn downgrade(err: PrepError, force: bool, removal: &mut Removal) -> PrepResult<()> {
    if !force {
        return Err(err);
    }
    tracing::warn!(error = %err, "Teardown failed, removing anyway");
    removal.warnings.push(err.to_string());
    Ok(())
}
