//! Mount operations.
//!
//! [`mount`] and [`unmount`] apply the idempotency and fallback policy on
//! top of a [`MountBackend`], which performs the raw kernel calls.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chroot_prep_common::{PrepError, PrepResult};

/// Kind of mount point managed by chroot-prep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MountKind {
    /// procfs instance.
    Proc,
    /// Bind mount of the host `/dev`.
    DevBind,
    /// Bind mount of the host `/sys`.
    SysBind,
    /// OverlayFS union mount.
    Overlay,
}

impl fmt::Display for MountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proc => write!(f, "proc"),
            Self::DevBind => write!(f, "dev bind"),
            Self::SysBind => write!(f, "sys bind"),
            Self::Overlay => write!(f, "overlay"),
        }
    }
}

/// A single mount to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    /// Mount source (`proc`, a host directory, or `overlay`).
    pub source: PathBuf,
    /// Mount point.
    pub target: PathBuf,
    /// What kind of mount this is.
    pub kind: MountKind,
    /// Filesystem-specific data, e.g. the overlay directories.
    pub data: Option<String>,
}

impl MountRequest {
    /// procfs on `target`.
    #[must_use]
    pub fn proc(target: impl Into<PathBuf>) -> Self {
        Self {
            source: PathBuf::from("proc"),
            target: target.into(),
            kind: MountKind::Proc,
            data: None,
        }
    }

    /// Bind of the host `/dev` on `target`.
    #[must_use]
    pub fn dev_bind(target: impl Into<PathBuf>) -> Self {
        Self {
            source: PathBuf::from("/dev"),
            target: target.into(),
            kind: MountKind::DevBind,
            data: None,
        }
    }

    /// Bind of the host `/sys` on `target`.
    #[must_use]
    pub fn sys_bind(target: impl Into<PathBuf>) -> Self {
        Self {
            source: PathBuf::from("/sys"),
            target: target.into(),
            kind: MountKind::SysBind,
            data: None,
        }
    }

    /// OverlayFS on `target` with the given `lowerdir=...` option string.
    #[must_use]
    pub fn overlay(target: impl Into<PathBuf>, options: impl Into<String>) -> Self {
        Self {
            source: PathBuf::from("overlay"),
            target: target.into(),
            kind: MountKind::Overlay,
            data: Some(options.into()),
        }
    }
}

/// Unmount flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnmountFlags {
    /// Lazy unmount (detach).
    pub detach: bool,
}

impl UnmountFlags {
    /// Lazy detach (`MNT_DETACH`).
    #[must_use]
    pub const fn lazy() -> Self {
        Self { detach: true }
    }
}

/// Kernel-facing operations the manager depends on.
///
/// Every query goes to the live system; implementations must not cache.
pub trait MountBackend {
    /// Whether `target` is currently a mount point.
    fn is_mounted(&self, target: &Path) -> bool;

    /// Perform the raw mount.
    ///
    /// # Errors
    ///
    /// Returns the kernel error.
    fn mount(&self, request: &MountRequest) -> io::Result<()>;

    /// Perform the raw unmount.
    ///
    /// # Errors
    ///
    /// Returns the kernel error.
    fn unmount(&self, target: &Path, flags: UnmountFlags) -> io::Result<()>;

    /// Identifier of the filesystem holding `path`.
    ///
    /// # Errors
    ///
    /// Returns the `stat(2)` error.
    fn device_id(&self, path: &Path) -> io::Result<u64> {
        super::probe::device_id(path)
    }
}

/// [`MountBackend`] for the running host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostBackend;

#[cfg(target_os = "linux")]
impl MountBackend for HostBackend {
    fn is_mounted(&self, target: &Path) -> bool {
        super::mountinfo::is_mounted(target)
    }

    fn mount(&self, request: &MountRequest) -> io::Result<()> {
        use rustix::mount::{MountFlags, mount, mount_bind};
        use std::ffi::CString;

        match request.kind {
            MountKind::Proc => mount(
                request.source.as_path(),
                request.target.as_path(),
                "proc",
                MountFlags::empty(),
                c"",
            )?,
            MountKind::DevBind | MountKind::SysBind => {
                mount_bind(request.source.as_path(), request.target.as_path())?;
            }
            MountKind::Overlay => {
                let data = CString::new(request.data.as_deref().unwrap_or_default())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                mount(
                    request.source.as_path(),
                    request.target.as_path(),
                    "overlay",
                    MountFlags::empty(),
                    data.as_c_str(),
                )?;
            }
        }
        Ok(())
    }

    fn unmount(&self, target: &Path, flags: UnmountFlags) -> io::Result<()> {
        use rustix::mount::{UnmountFlags as RustixUnmountFlags, unmount};

        let mut rflags = RustixUnmountFlags::empty();
        if flags.detach {
            rflags |= RustixUnmountFlags::DETACH;
        }
        unmount(target, rflags)?;
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
impl MountBackend for HostBackend {
    fn is_mounted(&self, _target: &Path) -> bool {
        false
    }

    fn mount(&self, _request: &MountRequest) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    fn unmount(&self, _target: &Path, _flags: UnmountFlags) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

/// What [`mount`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountAction {
    /// The mount was performed.
    Mounted,
    /// The target was already a mount point; nothing was done.
    AlreadyMounted,
}

/// What [`unmount`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountAction {
    /// The target was not a mount point; nothing was done.
    NotMounted,
    /// A normal unmount succeeded.
    Detached,
    /// The normal unmount failed and a lazy detach was issued instead.
    ///
    /// The kernel may keep the filesystem alive until its last user exits.
    LazilyDetached,
}

/// Mount `request` unless its target is already mounted.
///
/// # Errors
///
/// Returns [`PrepError::Mount`] if the kernel rejects the mount.
pub fn mount(backend: &dyn MountBackend, request: &MountRequest) -> PrepResult<MountAction> {
    if backend.is_mounted(&request.target) {
        tracing::debug!(
            target = %request.target.display(),
            kind = %request.kind,
            "Already mounted, skipping"
        );
        return Ok(MountAction::AlreadyMounted);
    }

    tracing::debug!(
        source = %request.source.display(),
        target = %request.target.display(),
        kind = %request.kind,
        data = ?request.data,
        "Mounting filesystem"
    );

    backend
        .mount(request)
        .map_err(|e| PrepError::mount(&request.target, e))?;

    tracing::info!(target = %request.target.display(), kind = %request.kind, "Mounted");
    Ok(MountAction::Mounted)
}

/// Unmount `target` if it is mounted, falling back to a lazy detach.
///
/// # Errors
///
/// Returns [`PrepError::Mount`] carrying the lazy attempt's error when both
/// the normal and the lazy unmount fail.
pub fn unmount(backend: &dyn MountBackend, target: &Path) -> PrepResult<UnmountAction> {
    if !backend.is_mounted(target) {
        tracing::debug!(target = %target.display(), "Not mounted, skipping");
        return Ok(UnmountAction::NotMounted);
    }

    tracing::debug!(target = %target.display(), "Unmounting filesystem");

    match backend.unmount(target, UnmountFlags::default()) {
        Ok(()) => {
            tracing::info!(target = %target.display(), "Unmounted");
            Ok(UnmountAction::Detached)
        }
        Err(e) => {
            tracing::warn!(
                target = %target.display(),
                error = %e,
                "Normal unmount failed, trying lazy unmount"
            );
            backend
                .unmount(target, UnmountFlags::lazy())
                .map_err(|e| PrepError::mount(target, e))?;
            tracing::info!(target = %target.display(), "Lazily detached");
            Ok(UnmountAction::LazilyDetached)
        }
    }
}
