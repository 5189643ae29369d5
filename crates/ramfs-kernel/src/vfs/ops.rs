//! The operation surface.
//!
//! This is the seam the kernel-protocol adapter calls through. One method per
//! filesystem primitive, path-based, synchronous: each call runs to
//! completion or failure on the calling thread.

use std::path::Path;
use std::time::SystemTime;

use super::types::{DirEntry, FileAttr, FileHandle, OpenFlags, SetAttr, StatFs};
use super::VfsResult;

/// One method per filesystem primitive.
///
/// Paths are absolute (`/a/b`). Implementations must be safe to call from
/// many threads at once.
pub trait VfsOps: Send + Sync {
    // ========================================================================
    // Lookup and read
    // ========================================================================

    /// Metadata of the inode `path` names.
    fn getattr(&self, path: &Path) -> VfsResult<FileAttr>;

    /// Read directory entries, sorted by name. `.` and `..` are not included.
    fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>>;

    /// Up to `size` bytes from `offset`. Short at EOF, empty past it.
    fn read(&self, path: &Path, offset: u64, size: u32) -> VfsResult<Vec<u8>>;

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Copy `data` in at `offset`, zero-filling any gap past the current
    /// end. Returns the byte count written.
    fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u32>;

    /// Create a regular file.
    fn mknod(&self, path: &Path, mode: u32) -> VfsResult<FileAttr>;

    /// Create a regular file and open it for writing.
    fn create(&self, path: &Path, mode: u32) -> VfsResult<FileHandle>;

    /// Create an empty directory. Bumps the parent's link count.
    fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr>;

    /// Remove a path. The inode is freed once no path names it.
    fn unlink(&self, path: &Path) -> VfsResult<()>;

    /// Remove a directory that has no children.
    fn rmdir(&self, path: &Path) -> VfsResult<()>;

    /// Rename a file or directory, replacing a compatible destination.
    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()>;

    /// Create a hard link at `newpath` to the file at `oldpath`.
    fn link(&self, oldpath: &Path, newpath: &Path) -> VfsResult<FileAttr>;

    /// Truncate or zero-extend a file to `size` bytes.
    fn truncate(&self, path: &Path, size: u64) -> VfsResult<()>;

    /// Set access and modification times. `None` means "now".
    fn utimens(&self, path: &Path, times: Option<(SystemTime, SystemTime)>) -> VfsResult<()>;

    /// Set size and/or times in one call.
    fn setattr(&self, path: &Path, attr: SetAttr) -> VfsResult<FileAttr>;

    /// Permission bits are not enforced; this only checks the path.
    fn chmod(&self, path: &Path, mode: u32) -> VfsResult<()>;

    /// Ownership is not tracked; this only checks the path.
    fn chown(&self, path: &Path, uid: u32, gid: u32) -> VfsResult<()>;

    // ========================================================================
    // Handles and persistence
    // ========================================================================

    /// Open a file or directory, returning a fresh handle.
    fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<FileHandle>;

    /// Forget a handle returned by `open` or `create`.
    fn release(&self, fh: FileHandle) -> VfsResult<()>;

    /// Export a file's bytes to the backing directory.
    fn flush(&self, path: &Path) -> VfsResult<()>;

    /// Same as `flush`; there is no separate metadata to sync.
    fn fsync(&self, path: &Path, datasync: bool) -> VfsResult<()>;

    /// Usage report for `statfs(2)`.
    fn statfs(&self) -> VfsResult<StatFs>;

    // ========================================================================
    // Helpers built on the primitives
    // ========================================================================

    /// True if `path` resolves.
    fn exists(&self, path: &Path) -> bool {
        self.getattr(path).is_ok()
    }

    /// Whole-file read.
    fn read_all(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let attr = self.getattr(path)?;
        let size = u32::try_from(attr.size).unwrap_or(u32::MAX);
        self.read(path, 0, size)
    }

    /// Write entire file contents, creating the file if needed.
    fn write_all(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        if self.exists(path) {
            self.truncate(path, 0)?;
        } else {
            self.mknod(path, 0o644)?;
        }
        self.write(path, 0, data)?;
        Ok(())
    }
}
