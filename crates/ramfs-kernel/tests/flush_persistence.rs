//! Flush mirroring to a backing directory.
//!
//! Every test binds a fresh `tempfile::TempDir` as the backing directory.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use ramfs_kernel::{ConfigError, FlushFailure, RamFs, RamfsConfig, VfsError, VfsOps};

fn p(path: &str) -> &Path {
    Path::new(path)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ramfs_kernel=debug")
        .with_test_writer()
        .try_init();
}

fn backed_fs(dir: &Path) -> RamFs {
    init_tracing();
    let config = RamfsConfig::default()
        .with_backing_dir(dir)
        .with_sync_on_flush(true);
    RamFs::new(&config).unwrap()
}

fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn flush_exports_exact_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backed_fs(dir.path());

    fs.mknod(p("/a"), 0o644).unwrap();
    fs.write(p("/a"), 0, b"hello").unwrap();
    fs.truncate(p("/a"), 2).unwrap();
    fs.flush(p("/a")).unwrap();

    assert_eq!(fs::read(dir.path().join("a")).unwrap(), b"he");
}

#[test]
fn flush_mirrors_nested_paths() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backed_fs(dir.path());

    fs.mkdir(p("/docs"), 0o755).unwrap();
    fs.mkdir(p("/docs/notes"), 0o755).unwrap();
    fs.write_all(p("/docs/notes/today.md"), b"# today").unwrap();
    fs.fsync(p("/docs/notes/today.md"), false).unwrap();

    assert_eq!(
        fs::read(dir.path().join("docs/notes/today.md")).unwrap(),
        b"# today"
    );
}

#[test]
fn flush_handles_names_at_length_limit() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backed_fs(dir.path());
    let leaf = "n".repeat(250);
    let path = format!("/{leaf}");

    fs.write_all(p(&path), b"long name").unwrap();
    fs.flush(p(&path)).unwrap();
    fs.write_all(p(&path), b"again").unwrap();
    fs.flush(p(&path)).unwrap();

    assert_eq!(fs::read(dir.path().join(&leaf)).unwrap(), b"again");
    assert_eq!(dir_names(dir.path()), vec![leaf]);
}

#[test]
fn flush_of_directory_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backed_fs(dir.path());

    fs.mkdir(p("/d"), 0o755).unwrap();
    fs.flush(p("/d")).unwrap();

    assert!(dir_names(dir.path()).is_empty());
}

#[test]
fn reflush_replaces_previous_version_without_leftovers() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backed_fs(dir.path());

    fs.write_all(p("/f"), b"a much longer first version").unwrap();
    fs.flush(p("/f")).unwrap();
    fs.write_all(p("/f"), b"v2").unwrap();
    fs.flush(p("/f")).unwrap();

    assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"v2");
    assert_eq!(dir_names(dir.path()), vec!["f"]);
}

#[test]
fn interrupted_flush_leaves_previous_version_intact() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backed_fs(dir.path());

    fs.write_all(p("/f"), b"committed").unwrap();
    fs.flush(p("/f")).unwrap();

    // Stage the next version but never commit it, as if the process died
    // between writing the temp file and renaming it into place.
    fs.write_all(p("/f"), b"in flight").unwrap();
    let backing = fs.backing().unwrap();
    let staged = backing.stage("/f", &fs.read_all(p("/f")).unwrap()).unwrap();
    assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"committed");
    assert_eq!(dir_names(dir.path()).len(), 2);
    drop(staged);

    assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"committed");
    assert_eq!(dir_names(dir.path()), vec!["f"]);

    fs.flush(p("/f")).unwrap();
    assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"in flight");
}

#[test]
fn failed_flush_keeps_memory_and_can_retry() {
    let dir = tempfile::tempdir().unwrap();
    let fs = backed_fs(dir.path());

    // A plain file where the mirror needs a directory.
    fs::write(dir.path().join("sub"), b"blocker").unwrap();
    fs.mkdir(p("/sub"), 0o755).unwrap();
    fs.write_all(p("/sub/f"), b"precious").unwrap();

    let err = fs.flush(p("/sub/f")).unwrap_err();
    assert!(matches!(err, VfsError::Flush { .. }), "got {err}");
    assert_eq!(err.errno(), libc::EIO);
    assert_eq!(fs.read_all(p("/sub/f")).unwrap(), b"precious");

    fs::remove_file(dir.path().join("sub")).unwrap();
    fs.flush(p("/sub/f")).unwrap();
    assert_eq!(fs::read(dir.path().join("sub/f")).unwrap(), b"precious");
}

#[test]
fn flush_into_read_only_backing_is_permission_denied() {
    // Permission bits do not bind the superuser.
    if unsafe { libc::geteuid() } == 0 {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let fs = backed_fs(dir.path());
    fs.write_all(p("/f"), b"x").unwrap();

    fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o500)).unwrap();
    let result = fs.flush(p("/f"));
    fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).unwrap();

    match result {
        Err(VfsError::Flush { failure, .. }) => assert_eq!(failure, FlushFailure::PermissionDenied),
        other => panic!("expected permission failure, got {other:?}"),
    }
    assert_eq!(fs.read_all(p("/f")).unwrap(), b"x");
}

#[test]
fn flush_recreates_removed_backing_root() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("mirror");
    fs::create_dir(&root).unwrap();
    let fs = backed_fs(&root);
    fs.write_all(p("/f"), b"x").unwrap();

    fs::remove_dir(&root).unwrap();
    // create_dir_all recreates the mirror root, so flush still succeeds.
    fs.flush(p("/f")).unwrap();
    assert_eq!(fs::read(root.join("f")).unwrap(), b"x");
}

#[test]
fn construction_rejects_missing_backing_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = RamfsConfig::default().with_backing_dir(dir.path().join("absent"));
    assert!(matches!(RamFs::new(&config), Err(ConfigError::BackingDir(_))));
}

#[test]
fn config_file_drives_engine() {
    let dir = tempfile::tempdir().unwrap();
    let mirror = dir.path().join("mirror");
    fs::create_dir(&mirror).unwrap();
    let config_path = dir.path().join("ramfs.ron");
    fs::write(
        &config_path,
        format!(
            "(backing_dir: Some({:?}), sync_on_flush: false, root_mode: 0o700)",
            mirror.display().to_string()
        ),
    )
    .unwrap();

    let config = RamfsConfig::load(&config_path).unwrap();
    let fs = RamFs::new(&config).unwrap();
    assert_eq!(fs.getattr(p("/")).unwrap().perm, 0o700);

    fs.write_all(p("/cfg"), b"ok").unwrap();
    fs.flush(p("/cfg")).unwrap();
    assert_eq!(fs::read(mirror.join("cfg")).unwrap(), b"ok");
}
