//! # ramfs-kernel
//!
//! In-memory hierarchical file store with POSIX-like semantics:
//! directories, regular files, hard links, rename, truncate. File contents
//! can be mirrored to a backing directory on flush.
//!
//! The engine sits behind a kernel-protocol adapter (FUSE or similar) that
//! owns mounting and translates OS requests into [`VfsOps`] calls and
//! [`VfsError`]s back into errno values.
//!
//! ```no_run
//! use std::path::Path;
//! use ramfs_kernel::{RamFs, RamfsConfig, VfsOps};
//!
//! let config = RamfsConfig::default().with_backing_dir("/var/lib/ramfs");
//! let fs = RamFs::new(&config)?;
//! fs.mknod(Path::new("/hello.txt"), 0o644)?;
//! fs.write(Path::new("/hello.txt"), 0, b"hello")?;
//! fs.flush(Path::new("/hello.txt"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod vfs;

pub use config::{ConfigError, RamfsConfig};
pub use vfs::{
    BackingStore, DirEntry, FileAttr, FileHandle, FileType, FlushFailure, InodeId, OpenFlags,
    RamFs, SetAttr, StatFs, VfsError, VfsOps, VfsResult,
};
