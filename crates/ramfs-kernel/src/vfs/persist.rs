//! Backing-directory mirroring.
//!
//! `flush` exports a file's bytes to `<backing>/<path>` in two steps: the
//! bytes go to a uniquely named sibling temp file, then the temp file is
//! renamed over the destination. The destination is therefore always either
//! the previous complete version or the new one. A [`StagedFile`] that is
//! dropped without [`StagedFile::commit`] removes its temp file and leaves the
//! destination untouched.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::ConfigError;

use super::error::{VfsError, VfsResult};

/// Root of the on-disk mirror.
#[derive(Debug, Clone)]
pub struct BackingStore {
    root: PathBuf,
    sync: bool,
}

impl BackingStore {
    /// Bind to an existing directory.
    pub fn bind(root: impl Into<PathBuf>, sync: bool) -> Result<Self, ConfigError> {
        let root: PathBuf = root.into();
        if !root.is_dir() {
            return Err(ConfigError::BackingDir(root));
        }
        let root = root.canonicalize().unwrap_or(root);
        tracing::info!(root = %root.display(), sync, "bound backing directory");
        Ok(Self { root, sync })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk location mirroring an in-memory path.
    pub fn mirror_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    /// Write `data` to a temp file next to `path`'s mirror, creating parent
    /// directories on demand. Nothing at the destination changes yet.
    pub fn stage(&self, path: &str, data: &[u8]) -> VfsResult<StagedFile> {
        let dest = self.mirror_path(path);
        let parent = match (dest.parent(), dest.file_name()) {
            (Some(parent), Some(_)) => parent.to_path_buf(),
            _ => return Err(VfsError::invalid_path(path)),
        };

        fs::create_dir_all(&parent).map_err(|e| VfsError::flush(path, e))?;

        // Fixed-length name: the leaf may already be at the name-length limit.
        let temp = parent.join(format!(".ramfs.{}.tmp", uuid::Uuid::new_v4().simple()));
        let staged = StagedFile {
            path: path.to_string(),
            temp,
            dest,
            sync: self.sync,
            committed: false,
        };

        let mut file = File::create(&staged.temp).map_err(|e| VfsError::flush(path, e))?;
        file.write_all(data).map_err(|e| VfsError::flush(path, e))?;
        if self.sync {
            file.sync_all().map_err(|e| VfsError::flush(path, e))?;
        }
        Ok(staged)
    }

    /// Stage and commit in one go.
    pub fn flush(&self, path: &str, data: &[u8]) -> VfsResult<()> {
        self.stage(path, data)?.commit()
    }
}

/// A fully written temp file waiting to be renamed into place.
#[derive(Debug)]
pub struct StagedFile {
    path: String,
    temp: PathBuf,
    dest: PathBuf,
    sync: bool,
    committed: bool,
}

impl StagedFile {
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    pub fn dest_path(&self) -> &Path {
        &self.dest
    }

    /// Atomically replace the destination with the staged bytes.
    pub fn commit(mut self) -> VfsResult<()> {
        fs::rename(&self.temp, &self.dest).map_err(|e| VfsError::flush(self.path.as_str(), e))?;
        self.committed = true;

        if self.sync {
            // Persist the rename itself. Best effort: some filesystems refuse
            // to fsync a directory.
            if let Some(parent) = self.dest.parent() {
                if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
                    tracing::debug!(path = %self.path, error = %e, "directory sync skipped");
                }
            }
        }
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match fs::remove_file(&self.temp) {
            Ok(()) => {
                tracing::warn!(path = %self.path, temp = %self.temp.display(), "abandoned staged flush")
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path,
                temp = %self.temp.display(),
                error = %e,
                "could not remove abandoned temp file"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::error::FlushFailure;

    #[test]
    fn test_bind_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(
            BackingStore::bind(&file, false),
            Err(ConfigError::BackingDir(_))
        ));
        assert!(matches!(
            BackingStore::bind(dir.path().join("missing"), false),
            Err(ConfigError::BackingDir(_))
        ));
        assert!(BackingStore::bind(dir.path(), false).is_ok());
    }

    #[test]
    fn test_flush_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackingStore::bind(dir.path(), true).unwrap();

        store.flush("/a/b/c.txt", b"deep").unwrap();

        assert_eq!(fs::read(dir.path().join("a/b/c.txt")).unwrap(), b"deep");
    }

    #[test]
    fn test_flush_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackingStore::bind(dir.path(), false).unwrap();

        store.flush("/f", b"one").unwrap();
        store.flush("/f", b"two").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["f".to_string()]);
        assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"two");
    }

    #[test]
    fn test_uncommitted_stage_keeps_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackingStore::bind(dir.path(), false).unwrap();
        store.flush("/f", b"old").unwrap();

        let staged = store.stage("/f", b"new contents").unwrap();
        let temp = staged.temp_path().to_path_buf();
        assert!(temp.exists());
        assert_eq!(fs::read(staged.dest_path()).unwrap(), b"old");
        drop(staged);

        assert!(!temp.exists());
        assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"old");
    }

    #[test]
    fn test_temp_name_independent_of_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackingStore::bind(dir.path(), false).unwrap();
        let leaf = "n".repeat(250);

        let staged = store.stage(&format!("/{leaf}"), b"x").unwrap();
        let temp_name = staged.temp_path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(temp_name.starts_with(".ramfs."));
        assert!(temp_name.len() < 64);
        staged.commit().unwrap();

        assert_eq!(fs::read(dir.path().join(&leaf)).unwrap(), b"x");
    }

    #[test]
    fn test_flush_blocked_by_file_in_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackingStore::bind(dir.path(), false).unwrap();
        fs::write(dir.path().join("blocker"), b"").unwrap();

        let err = store.flush("/blocker/f", b"x").unwrap_err();
        match err {
            VfsError::Flush { failure, .. } => assert_ne!(failure, FlushFailure::PermissionDenied),
            other => panic!("unexpected error: {other}"),
        }
    }
}
