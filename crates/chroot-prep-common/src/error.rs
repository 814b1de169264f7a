//! Error types for chroot environment management.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`PrepError`].
pub type PrepResult<T> = Result<T, PrepError>;

/// Errors raised while preparing, tearing down or removing an environment.
#[derive(Error, Diagnostic, Debug)]
pub enum PrepError {
    /// An expected directory is missing or is not a directory.
    #[error("Invalid environment structure at {}: {reason}", .path.display())]
    #[diagnostic(code(chroot_prep::structure))]
    Structure {
        /// Path that failed the structure check.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// The environment is already set up.
    #[error("{what} is already set up at {}", .path.display())]
    #[diagnostic(
        code(chroot_prep::already_exists),
        help("Run `chroot-prep cleanup` first to tear the environment down")
    )]
    AlreadyExists {
        /// Human readable name of what is already configured.
        what: String,
        /// Path of the configured environment root.
        path: PathBuf,
    },

    /// Upper and work directories live on different filesystems.
    #[error(
        "Upper directory {} and work directory {} are not on the same filesystem",
        .upper.display(),
        .work.display()
    )]
    #[diagnostic(
        code(chroot_prep::cross_device),
        help("OverlayFS requires upperdir and workdir on one filesystem")
    )]
    CrossDevice {
        /// Upper (writable) directory.
        upper: PathBuf,
        /// Work directory.
        work: PathBuf,
    },

    /// A mount or unmount was rejected by the kernel.
    #[error("Mount operation failed at {}: {source}", .target.display())]
    #[diagnostic(
        code(chroot_prep::mount),
        help("Mounting requires root privileges; check `dmesg` for details")
    )]
    Mount {
        /// Mount point the operation targeted.
        target: PathBuf,
        /// Underlying kernel error.
        source: std::io::Error,
    },

    /// A file or directory operation failed.
    #[error("I/O error at {}: {source}", .path.display())]
    #[diagnostic(code(chroot_prep::io))]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The overlay name cannot be used as a directory suffix.
    #[error("Invalid overlay name {name:?}: {reason}")]
    #[diagnostic(
        code(chroot_prep::invalid_overlay_name),
        help("Overlay names must be non-empty and must not contain '/'")
    )]
    InvalidOverlayName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Feature not supported on this platform.
    #[error("Feature not supported: {feature}")]
    #[diagnostic(code(chroot_prep::unsupported), help("chroot-prep requires Linux"))]
    Unsupported {
        /// The unsupported feature.
        feature: String,
    },
}

impl PrepError {
    /// Build a [`PrepError::Structure`].
    pub fn structure(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Structure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Build a [`PrepError::Io`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a [`PrepError::Mount`].
    pub fn mount(target: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Mount {
            target: target.into(),
            source,
        }
    }
}
