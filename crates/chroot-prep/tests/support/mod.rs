//! In-memory mount table shared by the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use chroot_prep::ChrootManager;
use chroot_prep::environment::ManagerConfig;
use chroot_prep::filesystem::{MountBackend, MountKind, MountRequest, UnmountFlags};

/// One call that reached the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A mount was performed.
    Mount(PathBuf, MountKind),
    /// An unmount was attempted; `true` for a lazy detach.
    Unmount(PathBuf, bool),
}

#[derive(Debug, Default)]
struct State {
    mounted: BTreeSet<PathBuf>,
    journal: Vec<Event>,
    fail_mount: HashSet<PathBuf>,
    fail_unmount: HashSet<PathBuf>,
    fail_lazy_unmount: HashSet<PathBuf>,
    devices: HashMap<PathBuf, u64>,
}

/// Mount backend that only records mounts in memory.
#[derive(Debug, Default)]
pub struct FakeBackend {
    state: RefCell<State>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every mount on `target`.
    pub fn fail_mount(&self, target: impl Into<PathBuf>) {
        self.state.borrow_mut().fail_mount.insert(target.into());
    }

    /// Reject normal unmounts of `target`; a lazy detach still works.
    pub fn fail_normal_unmount(&self, target: impl Into<PathBuf>) {
        self.state.borrow_mut().fail_unmount.insert(target.into());
    }

    /// Reject both normal and lazy unmounts of `target`.
    pub fn fail_unmount(&self, target: impl Into<PathBuf>) {
        let target = target.into();
        let mut state = self.state.borrow_mut();
        state.fail_unmount.insert(target.clone());
        state.fail_lazy_unmount.insert(target);
    }

    /// Report `path` as living on device `id`.
    pub fn set_device(&self, path: impl Into<PathBuf>, id: u64) {
        self.state.borrow_mut().devices.insert(path.into(), id);
    }

    /// Mark `target` as mounted without going through a mount call.
    pub fn premount(&self, target: impl Into<PathBuf>) {
        self.state.borrow_mut().mounted.insert(target.into());
    }

    /// Currently mounted targets.
    pub fn mounted(&self) -> BTreeSet<PathBuf> {
        self.state.borrow().mounted.clone()
    }

    /// Every call recorded so far.
    pub fn journal(&self) -> Vec<Event> {
        self.state.borrow().journal.clone()
    }

    /// Number of mounts performed on `target`.
    pub fn mount_count(&self, target: &Path) -> usize {
        self.state
            .borrow()
            .journal
            .iter()
            .filter(|event| matches!(event, Event::Mount(t, _) if t == target))
            .count()
    }

    /// Targets of every unmount attempt, in call order.
    pub fn unmount_targets(&self) -> Vec<PathBuf> {
        self.state
            .borrow()
            .journal
            .iter()
            .filter_map(|event| match event {
                Event::Unmount(target, false) => Some(target.clone()),
                _ => None,
            })
            .collect()
    }
}

impl MountBackend for FakeBackend {
    fn is_mounted(&self, target: &Path) -> bool {
        self.state.borrow().mounted.contains(target)
    }

    fn mount(&self, request: &MountRequest) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_mount.contains(&request.target) {
            return Err(io::Error::from_raw_os_error(1));
        }
        if request.kind == MountKind::Overlay {
            mirror_lower_dir(request)?;
        }
        state
            .journal
            .push(Event::Mount(request.target.clone(), request.kind));
        state.mounted.insert(request.target.clone());
        Ok(())
    }

    fn unmount(&self, target: &Path, flags: UnmountFlags) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        state
            .journal
            .push(Event::Unmount(target.to_path_buf(), flags.detach));

        let failing = if flags.detach {
            &state.fail_lazy_unmount
        } else {
            &state.fail_unmount
        };
        if failing.contains(target) {
            // EBUSY for a normal unmount, EINVAL for a lazy one
            let errno = if flags.detach { 22 } else { 16 };
            return Err(io::Error::from_raw_os_error(errno));
        }
        state.mounted.remove(target);
        Ok(())
    }

    fn device_id(&self, path: &Path) -> io::Result<u64> {
        if let Some(id) = self.state.borrow().devices.get(path) {
            return Ok(*id);
        }
        std::fs::metadata(path).map(|meta| meta.dev())
    }
}

/// Show the lower directory's top-level directories in the merged view,
/// the way a real overlay mount would.
fn mirror_lower_dir(request: &MountRequest) -> io::Result<()> {
    let Some(lower) = request
        .data
        .as_deref()
        .and_then(|data| data.split(',').find_map(|opt| opt.strip_prefix("lowerdir=")))
    else {
        return Ok(());
    };
    for entry in std::fs::read_dir(lower)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::create_dir_all(request.target.join(entry.file_name()))?;
        }
    }
    Ok(())
}

/// A base directory `jammy` with `dev`, `proc` and `sys` under `parent`.
pub fn make_base(parent: &Path) -> PathBuf {
    let base = parent.join("jammy");
    for dir in ["dev", "proc", "sys"] {
        std::fs::create_dir_all(base.join(dir)).unwrap();
    }
    base
}

/// A host resolver file under `parent`.
pub fn host_resolv_conf(parent: &Path) -> PathBuf {
    let path = parent.join("host-resolv.conf");
    std::fs::write(&path, "nameserver 192.0.2.53\n").unwrap();
    path
}

/// Manager over a fresh [`FakeBackend`] copying `host_resolv`.
pub fn manager(host_resolv: &Path) -> ChrootManager<FakeBackend> {
    ChrootManager::with_backend(
        FakeBackend::new(),
        ManagerConfig::default().with_host_resolv_conf(host_resolv),
    )
}
