//! Virtual filesystem core.
//!
//! Key components:
//!
//! - [`InodeStore`] - Id-keyed inode arena; allocation and release
//! - [`Namespace`] - Path index over the arena (hard links = many paths, one id)
//! - [`RamFs`] - The engine: two-tier locking and every filesystem primitive
//! - [`BackingStore`] - Write-temp-then-rename mirroring to a backing directory
//! - [`VfsOps`] - The trait the kernel-protocol adapter calls through
//!
//! ## Design Decisions
//!
//! - **Two indices, one arena**: inodes live in a table keyed by id; paths
//!   map to ids. Directory child maps mirror the path index.
//! - **Namespace lock before inode lock**: structural mutations hold the
//!   namespace lock; data operations hold only their inode's lock.
//! - **Rename replaces**: an existing destination is unlinked properly, with
//!   its link count decremented, before the source moves in.

mod data;
mod error;
mod handles;
mod inode;
pub mod namespace;
mod ops;
mod persist;
mod ramfs;
mod types;

pub use data::{read_at, resize, write_at};
pub use error::{FlushFailure, VfsError, VfsResult};
pub use handles::{HandleTable, OpenFile};
pub use inode::{Inode, InodeBody, InodeRef, InodeStore};
pub use namespace::Namespace;
pub use ops::VfsOps;
pub use persist::{BackingStore, StagedFile};
pub use ramfs::RamFs;
pub use types::{
    DirEntry, FileAttr, FileHandle, FileType, InodeId, OpenFlags, ROOT_INODE, SetAttr, StatFs,
};
