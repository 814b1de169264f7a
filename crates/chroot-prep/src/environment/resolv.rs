//! DNS resolver configuration inside an environment.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use chroot_prep_common::paths::{RESOLV_CONF, RESOLV_CONF_MODE};
use chroot_prep_common::{PrepError, PrepResult};

use crate::filesystem::probe::{self, PathKind};

/// Copy `host` to `<root>/etc/resolv.conf` with mode 0644.
///
/// `<root>/etc` is created with `dir_mode` if absent. A symlink at the
/// destination is replaced, never written through.
///
/// # Errors
///
/// Returns [`PrepError::Io`] if `host` cannot be read or the destination
/// cannot be written.
pub fn setup_resolv_conf(host: &Path, root: &Path, dir_mode: u32) -> PrepResult<()> {
    let contents = fs::read(host).map_err(|e| PrepError::io(host, e))?;

    let dest = root.join(RESOLV_CONF);
    if let Some(etc) = dest.parent() {
        probe::ensure_dir(etc, dir_mode)?;
    }

    if fs::symlink_metadata(&dest).is_ok_and(|meta| meta.file_type().is_symlink()) {
        tracing::debug!(path = %dest.display(), "Replacing resolv.conf symlink");
        fs::remove_file(&dest).map_err(|e| PrepError::io(&dest, e))?;
    }

    fs::write(&dest, contents).map_err(|e| PrepError::io(&dest, e))?;
    fs::set_permissions(&dest, fs::Permissions::from_mode(RESOLV_CONF_MODE))
        .map_err(|e| PrepError::io(&dest, e))?;

    tracing::info!(
        host = %host.display(),
        path = %dest.display(),
        "Configured DNS resolution"
    );
    Ok(())
}

/// Remove `<root>/etc/resolv.conf` if present.
///
/// # Errors
///
/// Returns [`PrepError::Io`] if the file exists and cannot be removed.
pub fn cleanup_resolv_conf(root: &Path) -> PrepResult<()> {
    let dest = root.join(RESOLV_CONF);
    match probe::path_kind(&dest) {
        PathKind::Missing => Ok(()),
        PathKind::File => {
            fs::remove_file(&dest).map_err(|e| PrepError::io(&dest, e))?;
            tracing::debug!(path = %dest.display(), "Removed resolv.conf");
            Ok(())
        }
        PathKind::Directory => Err(PrepError::io(
            &dest,
            std::io::Error::other("resolv.conf is a directory"),
        )),
    }
}

/// Whether `<root>/etc/resolv.conf` exists (as a file or a link).
#[must_use]
pub fn has_resolv_conf(root: &Path) -> bool {
    probe::path_kind(&root.join(RESOLV_CONF)) == PathKind::File
}
