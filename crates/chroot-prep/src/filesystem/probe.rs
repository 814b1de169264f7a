//! Path inspection, directory creation and recursive removal.

use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;

use chroot_prep_common::{PrepError, PrepResult};
use walkdir::WalkDir;

/// What currently lives at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Nothing.
    Missing,
    /// Anything that is not a directory (regular file, symlink, device...).
    File,
    /// A directory.
    Directory,
}

/// Inspect `path` without following a final symlink.
#[must_use]
pub fn path_kind(path: &Path) -> PathKind {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => PathKind::Directory,
        Ok(_) => PathKind::File,
        Err(_) => PathKind::Missing,
    }
}

/// Whether `path` is a directory.
#[must_use]
pub fn is_dir(path: &Path) -> bool {
    path_kind(path) == PathKind::Directory
}

/// Create `path` and any missing ancestors with `mode`.
///
/// Does nothing if `path` is already a directory.
///
/// # Errors
///
/// Returns [`PrepError::Io`] if `path` exists but is not a directory, or if
/// creation is denied.
pub fn ensure_dir(path: &Path, mode: u32) -> PrepResult<()> {
    match path_kind(path) {
        PathKind::Directory => return Ok(()),
        PathKind::File => {
            return Err(PrepError::io(
                path,
                io::Error::new(io::ErrorKind::AlreadyExists, "exists and is not a directory"),
            ));
        }
        PathKind::Missing => {}
    }

    tracing::debug!(path = %path.display(), mode = format_args!("{mode:o}"), "Creating directory");
    fs::DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(path)
        .map_err(|e| PrepError::io(path, e))?;

    // mkdir(2) applies the umask; the layout contract wants the exact mode.
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| PrepError::io(path, e))
}

/// Recursively delete `path` if it exists.
///
/// The walk never descends into a directory on a different filesystem than
/// `path` itself, so anything still mounted inside the tree is left alone
/// and reported as a failure. Removal carries on past individual failures;
/// the first one is returned and the tree may be left partially removed.
///
/// # Errors
///
/// Returns [`PrepError::Io`] for the first entry that could not be removed.
pub fn remove_if_exists(path: &Path) -> PrepResult<()> {
    if path_kind(path) == PathKind::Missing {
        return Ok(());
    }

    tracing::debug!(path = %path.display(), "Removing tree");

    let mut first_err = None;
    let walker = WalkDir::new(path)
        .follow_root_links(false)
        .follow_links(false)
        .same_file_system(true)
        .contents_first(true);

    for entry in walker {
        let result = match entry {
            Ok(entry) => {
                let removed = if entry.file_type().is_dir() {
                    fs::remove_dir(entry.path())
                } else {
                    fs::remove_file(entry.path())
                };
                removed.map_err(|e| PrepError::io(entry.path(), e))
            }
            Err(e) => {
                let at = e.path().unwrap_or(path).to_path_buf();
                Err(PrepError::io(at, io::Error::other(e)))
            }
        };

        if let Err(err) = result {
            tracing::debug!(error = %err, "Failed to remove entry");
            first_err.get_or_insert(err);
        }
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Identifier of the filesystem holding `path`.
///
/// # Errors
///
/// Returns the `stat(2)` error.
pub fn device_id(path: &Path) -> io::Result<u64> {
    let stat = rustix::fs::stat(path)?;
    #[allow(clippy::useless_conversion)]
    Ok(u64::from(stat.st_dev))
}
