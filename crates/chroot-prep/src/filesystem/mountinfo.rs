//! Mount table probe backed by `/proc/self/mountinfo`.
//!
//! The mount table is re-read on every query; nothing is cached because
//! other processes may mount and unmount at any time.

use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

/// Location of the calling process's mount table.
pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// Mount points listed in a mountinfo table.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    mount_points: Vec<PathBuf>,
}

impl MountTable {
    /// Read the current mount table.
    ///
    /// An unreadable table is treated as empty.
    #[must_use]
    pub fn read() -> Self {
        match std::fs::read(MOUNTINFO_PATH) {
            Ok(raw) => Self::parse(&raw),
            Err(e) => {
                tracing::warn!(path = MOUNTINFO_PATH, error = %e, "Cannot read mount table");
                Self::default()
            }
        }
    }

    /// Parse mountinfo content.
    ///
    /// The fifth field of each line is the mount point, with spaces, tabs,
    /// newlines and backslashes octal-escaped by the kernel.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let mount_points = raw
            .split(|b| *b == b'\n')
            .filter_map(|line| line.split(|b| *b == b' ').nth(4))
            .map(|field| PathBuf::from(OsString::from_vec(unescape(field))))
            .collect();
        Self { mount_points }
    }

    /// Whether `path` is exactly one of the mount points.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.mount_points.iter().any(|mp| mp == path)
    }

    /// All mount points, in table order.
    #[must_use]
    pub fn mount_points(&self) -> &[PathBuf] {
        &self.mount_points
    }
}

/// Whether `path` is currently a mount point.
///
/// Existing paths are canonicalized first so that a base reached through a
/// symlink still matches the kernel's view.
#[must_use]
pub fn is_mounted(path: &Path) -> bool {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    MountTable::read().contains(&resolved)
}

fn unescape(field: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(field.len());
    let mut i = 0;
    while let Some(&byte) = field.get(i) {
        if byte == b'\\' {
            if let Some(value) = field.get(i + 1..i + 4).and_then(octal_byte) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(byte);
        i += 1;
    }
    out
}

fn octal_byte(digits: &[u8]) -> Option<u8> {
    if !digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
        return None;
    }
    let value = digits
        .iter()
        .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
    u8::try_from(value).ok()
}
