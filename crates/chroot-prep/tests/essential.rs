//! Integration tests for the essential filesystems.

mod support;

use chroot_prep::filesystem::{MountAction, MountRequest, UnmountAction, essential, mount, unmount};
use chroot_prep_common::PrepError;
use support::{Event, FakeBackend, make_base};
use tempfile::TempDir;

#[test_log::test]
fn mount_essential_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let root = make_base(temp.path());
    let backend = FakeBackend::new();

    let first = essential::mount_essential(&backend, &root).unwrap();
    assert_eq!(
        first,
        vec![root.join("proc"), root.join("dev"), root.join("sys")]
    );

    let second = essential::mount_essential(&backend, &root).unwrap();
    assert!(second.is_empty());

    for dir in ["proc", "dev", "sys"] {
        assert_eq!(backend.mount_count(&root.join(dir)), 1);
    }
}

#[test_log::test]
fn unmount_order_is_sys_proc_dev() {
    let temp = TempDir::new().unwrap();
    let root = make_base(temp.path());
    let backend = FakeBackend::new();

    essential::mount_essential(&backend, &root).unwrap();
    essential::umount_essential(&backend, &root).unwrap();

    assert_eq!(
        backend.unmount_targets(),
        vec![root.join("sys"), root.join("proc"), root.join("dev")]
    );
    assert!(backend.mounted().is_empty());
}

#[test_log::test]
fn umount_continues_past_failures() {
    let temp = TempDir::new().unwrap();
    let root = make_base(temp.path());
    let backend = FakeBackend::new();

    essential::mount_essential(&backend, &root).unwrap();
    backend.fail_unmount(root.join("sys"));

    let err = essential::umount_essential(&backend, &root).unwrap_err();
    assert!(matches!(err, PrepError::Mount { ref target, .. } if *target == root.join("sys")));

    let mounted = backend.mounted();
    assert!(mounted.contains(&root.join("sys")));
    assert!(!mounted.contains(&root.join("proc")));
    assert!(!mounted.contains(&root.join("dev")));
}

#[test_log::test]
fn first_mount_failure_aborts_the_rest() {
    let temp = TempDir::new().unwrap();
    let root = make_base(temp.path());
    let backend = FakeBackend::new();
    backend.fail_mount(root.join("dev"));

    let err = essential::mount_essential(&backend, &root).unwrap_err();
    assert!(matches!(err, PrepError::Mount { .. }));

    // proc stays mounted: undoing it is the caller's job
    assert!(backend.mounted().contains(&root.join("proc")));
    assert_eq!(backend.mount_count(&root.join("sys")), 0);

    essential::rollback(&backend, &[root.join("proc")]);
    assert!(backend.mounted().is_empty());
}

#[test]
fn missing_directory_mounts_nothing() {
    let temp = TempDir::new().unwrap();
    let root = make_base(temp.path());
    std::fs::remove_dir(root.join("sys")).unwrap();
    let backend = FakeBackend::new();

    let err = essential::mount_essential(&backend, &root).unwrap_err();
    assert!(matches!(err, PrepError::Structure { .. }));
    assert!(backend.journal().is_empty());
}

#[test]
fn mounted_essentials_probes_live_state() {
    let temp = TempDir::new().unwrap();
    let root = make_base(temp.path());
    let backend = FakeBackend::new();
    backend.premount(root.join("sys"));

    assert_eq!(
        essential::mounted_essentials(&backend, &root),
        vec![root.join("sys")]
    );
}

#[test_log::test]
fn unmount_falls_back_to_lazy_detach() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("proc");
    let backend = FakeBackend::new();

    assert_eq!(
        mount(&backend, &MountRequest::proc(&target)).unwrap(),
        MountAction::Mounted
    );
    assert_eq!(
        mount(&backend, &MountRequest::proc(&target)).unwrap(),
        MountAction::AlreadyMounted
    );

    backend.fail_normal_unmount(&target);
    assert_eq!(
        unmount(&backend, &target).unwrap(),
        UnmountAction::LazilyDetached
    );
    assert_eq!(
        backend.journal()[1..],
        [
            Event::Unmount(target.clone(), false),
            Event::Unmount(target.clone(), true),
        ]
    );
    assert_eq!(unmount(&backend, &target).unwrap(), UnmountAction::NotMounted);
}

#[test]
fn unmount_reports_lazy_failure() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("sys");
    let backend = FakeBackend::new();
    backend.premount(&target);
    backend.fail_unmount(&target);

    let err = unmount(&backend, &target).unwrap_err();
    let PrepError::Mount { source, .. } = err else {
        panic!("expected a mount error");
    };
    assert_eq!(source.raw_os_error(), Some(22));
}
