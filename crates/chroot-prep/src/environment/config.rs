//! Manager configuration.

use std::path::PathBuf;

use chroot_prep_common::paths::{DEFAULT_DIR_MODE, HOST_RESOLV_CONF};

/// Configuration options for [`ChrootManager`](super::ChrootManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Host resolver configuration copied into environments.
    pub host_resolv_conf: PathBuf,
    /// Mode for the overlay directories and the `etc` directory created
    /// for an environment.
    pub dir_mode: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            host_resolv_conf: PathBuf::from(HOST_RESOLV_CONF),
            dir_mode: DEFAULT_DIR_MODE,
        }
    }
}

impl ManagerConfig {
    /// Set the host resolver configuration file.
    #[must_use]
    pub fn with_host_resolv_conf(mut self, path: impl Into<PathBuf>) -> Self {
        self.host_resolv_conf = path.into();
        self
    }

    /// Set the mode for created directories.
    #[must_use]
    pub const fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }
}
