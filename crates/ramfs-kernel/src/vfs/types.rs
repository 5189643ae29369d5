//! Plain-data values handed across the `VfsOps` seam.
//!
//! Everything here is serializable so a kernel-protocol adapter can ship it
//! over whatever transport it speaks.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Identifier of an inode. Never reused while the inode is reachable.
pub type InodeId = u64;

/// Identifier of an open-file handle returned by `open`/`create`.
pub type FileHandle = u64;

/// Inode id of `/`.
pub const ROOT_INODE: InodeId = 1;

/// The two kinds of object the store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum FileType {
    File,
    Directory,
}

impl FileType {
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// The `S_IFMT` bits for this type.
    pub fn mode_bits(&self) -> u32 {
        match self {
            FileType::File => libc::S_IFREG as u32,
            FileType::Directory => libc::S_IFDIR as u32,
        }
    }
}

/// Snapshot of an inode's metadata, as returned by `getattr`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttr {
    pub ino: InodeId,
    /// Byte length for files; always 0 for directories.
    pub size: u64,
    pub kind: FileType,
    /// Permission bits only, without `S_IFMT`.
    pub perm: u32,
    /// Paths naming a file; `2 + subdirectories` for a directory.
    pub nlink: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl FileAttr {
    /// Full `st_mode`: type bits plus permissions.
    pub fn mode(&self) -> u32 {
        self.kind.mode_bits() | (self.perm & 0o7777)
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// One child of a directory, as listed by `readdir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Leaf name within the parent.
    pub name: String,
    pub ino: InodeId,
    pub kind: FileType,
}

/// Fields a `setattr` call changes. `None` leaves a field alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetAttr {
    /// Truncate or zero-extend to this length.
    pub size: Option<u64>,
    pub atime: Option<SystemTime>,
    pub mtime: Option<SystemTime>,
}

impl SetAttr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_times(mut self, atime: SystemTime, mtime: SystemTime) -> Self {
        self.atime = Some(atime);
        self.mtime = Some(mtime);
        self
    }
}

/// `statvfs`-shaped usage report.
///
/// Capacity is nominal: memory is the only real limit, so the totals are
/// fixed and only the free counts move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatFs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

impl StatFs {
    const BLOCK_SIZE: u32 = 4096;
    const TOTAL_BLOCKS: u64 = 1024 * 1024;
    const TOTAL_INODES: u64 = 1024 * 1024;

    /// Statistics for a store holding `inodes` live inodes and `bytes` of file data.
    pub fn from_usage(inodes: u64, bytes: u64, namelen: u32) -> Self {
        let used_blocks = bytes.div_ceil(Self::BLOCK_SIZE as u64);
        let bfree = Self::TOTAL_BLOCKS.saturating_sub(used_blocks);
        Self {
            blocks: Self::TOTAL_BLOCKS,
            bfree,
            bavail: bfree,
            files: Self::TOTAL_INODES,
            ffree: Self::TOTAL_INODES.saturating_sub(inodes),
            bsize: Self::BLOCK_SIZE,
            namelen,
            frsize: Self::BLOCK_SIZE,
        }
    }
}

/// Access mode recorded with an open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    pub write: bool,
    /// Cut the file to zero bytes as part of the open.
    pub truncate: bool,
}

impl OpenFlags {
    pub fn read() -> Self {
        Self::default()
    }

    pub fn write() -> Self {
        Self {
            write: true,
            truncate: false,
        }
    }

    /// `O_WRONLY | O_TRUNC`.
    pub fn write_truncate() -> Self {
        Self {
            write: true,
            truncate: true,
        }
    }

    /// Decode from raw `open(2)` flags.
    pub fn from_raw(flags: i32) -> Self {
        let access = flags & libc::O_ACCMODE;
        let write = access == libc::O_WRONLY || access == libc::O_RDWR;
        Self {
            write,
            truncate: write && flags & libc::O_TRUNC != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type() {
        assert!(FileType::File.is_file());
        assert!(!FileType::File.is_dir());
        assert!(FileType::Directory.is_dir());
        assert_eq!(FileType::Directory.to_string(), "directory");
    }

    #[test]
    fn test_mode_bits() {
        let now = SystemTime::now();
        let attr = FileAttr {
            ino: 2,
            size: 0,
            kind: FileType::Directory,
            perm: 0o755,
            nlink: 2,
            atime: now,
            mtime: now,
            ctime: now,
        };
        assert_eq!(attr.mode(), libc::S_IFDIR as u32 | 0o755);
    }

    #[test]
    fn test_setattr_builder() {
        let attr = SetAttr::new().with_size(2048);
        assert_eq!(attr.size, Some(2048));
        assert!(attr.mtime.is_none());
    }

    #[test]
    fn test_statfs_usage() {
        let stats = StatFs::from_usage(3, 4097, 255);
        assert_eq!(stats.blocks - stats.bfree, 2);
        assert_eq!(stats.files - stats.ffree, 3);
    }

    #[test]
    fn test_open_flags_from_raw() {
        assert_eq!(OpenFlags::from_raw(libc::O_RDONLY), OpenFlags::read());
        assert_eq!(OpenFlags::from_raw(libc::O_RDWR), OpenFlags::write());
        assert_eq!(
            OpenFlags::from_raw(libc::O_WRONLY | libc::O_TRUNC),
            OpenFlags::write_truncate()
        );
        // O_TRUNC without write access is ignored.
        assert_eq!(OpenFlags::from_raw(libc::O_RDONLY | libc::O_TRUNC), OpenFlags::read());
    }
}
