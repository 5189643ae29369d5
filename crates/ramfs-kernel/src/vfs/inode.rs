//! Inode records and the id-keyed inode table.
//!
//! Every filesystem object lives in exactly one [`Inode`], owned by the
//! [`InodeStore`] and shared out as an [`InodeRef`] (`Arc<Mutex<Inode>>`).
//! The mutex is the per-inode lock: it guards the byte buffer or child map
//! and all metadata fields. The table itself is only touched while the
//! namespace lock is held.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use super::error::{VfsError, VfsResult};
use super::types::{FileAttr, FileType, InodeId, ROOT_INODE};

/// Shared handle to one inode and its lock.
pub type InodeRef = Arc<Mutex<Inode>>;

/// Contents of an inode.
#[derive(Debug)]
pub enum InodeBody {
    /// Regular file bytes. The file size is always `data.len()`.
    File(Vec<u8>),
    /// Directory entries, name -> child inode.
    Directory(BTreeMap<String, InodeId>),
}

/// One filesystem object.
#[derive(Debug)]
pub struct Inode {
    pub id: InodeId,
    pub perm: u32,
    pub nlink: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub body: InodeBody,
}

impl Inode {
    fn new(id: InodeId, kind: FileType, perm: u32) -> Self {
        let now = SystemTime::now();
        let (nlink, body) = match kind {
            FileType::File => (1, InodeBody::File(Vec::new())),
            // self (".") plus the parent's entry
            FileType::Directory => (2, InodeBody::Directory(BTreeMap::new())),
        };
        Self {
            id,
            perm: perm & 0o7777,
            nlink,
            atime: now,
            mtime: now,
            ctime: now,
            body,
        }
    }

    pub fn kind(&self) -> FileType {
        match self.body {
            InodeBody::File(_) => FileType::File,
            InodeBody::Directory(_) => FileType::Directory,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.body, InodeBody::Directory(_))
    }

    /// Size in bytes. Directories report zero.
    pub fn size(&self) -> u64 {
        match &self.body {
            InodeBody::File(data) => data.len() as u64,
            InodeBody::Directory(_) => 0,
        }
    }

    /// Child map of a directory inode.
    pub fn children(&self) -> Option<&BTreeMap<String, InodeId>> {
        match &self.body {
            InodeBody::Directory(children) => Some(children),
            InodeBody::File(_) => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut BTreeMap<String, InodeId>> {
        match &mut self.body {
            InodeBody::Directory(children) => Some(children),
            InodeBody::File(_) => None,
        }
    }

    /// Record a content change: mtime and ctime move to `now`.
    pub fn touch_modified(&mut self, now: SystemTime) {
        self.mtime = now;
        self.ctime = now;
    }

    /// Snapshot the metadata for `getattr`.
    pub fn attr(&self) -> FileAttr {
        FileAttr {
            ino: self.id,
            size: self.size(),
            kind: self.kind(),
            perm: self.perm,
            nlink: self.nlink,
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
        }
    }
}

/// Table entry: the inode plus what can be read without locking it.
#[derive(Debug)]
struct Slot {
    /// Fixed for the inode's lifetime.
    kind: FileType,
    inode: InodeRef,
    /// Serializes exports of this inode to the backing directory.
    flush: Arc<Mutex<()>>,
}

/// Id-keyed inode table.
///
/// Ids are handed out from a monotonically increasing counter, so an id is
/// never reused while anything can still name it. Each id's kind is kept
/// beside its lock so directory listings never wait on a busy child.
#[derive(Debug)]
pub struct InodeStore {
    slots: HashMap<InodeId, Slot>,
    next_id: InodeId,
}

impl InodeStore {
    /// Create a table holding only the root directory.
    pub fn new(root_perm: u32) -> Self {
        let mut store = Self {
            slots: HashMap::new(),
            next_id: ROOT_INODE,
        };
        store.allocate(FileType::Directory, root_perm);
        store
    }

    /// Create a fresh inode: nlink 1 for files, 2 for directories, size 0.
    pub fn allocate(&mut self, kind: FileType, perm: u32) -> (InodeId, InodeRef) {
        let id = self.next_id;
        self.next_id += 1;
        let inode = Arc::new(Mutex::new(Inode::new(id, kind, perm)));
        self.slots.insert(
            id,
            Slot {
                kind,
                inode: Arc::clone(&inode),
                flush: Arc::new(Mutex::new(())),
            },
        );
        (id, inode)
    }

    fn slot(&self, id: InodeId) -> VfsResult<&Slot> {
        self.slots
            .get(&id)
            .ok_or_else(|| VfsError::not_found(format!("inode {id}")))
    }

    /// Look up an inode. Lock the returned handle for read or write access.
    pub fn get(&self, id: InodeId) -> VfsResult<InodeRef> {
        self.slot(id).map(|slot| Arc::clone(&slot.inode))
    }

    /// Kind of an inode, without taking its lock.
    pub fn kind(&self, id: InodeId) -> VfsResult<FileType> {
        self.slot(id).map(|slot| slot.kind)
    }

    /// The lock a flush of `id` holds for its whole export.
    pub fn flush_lock(&self, id: InodeId) -> VfsResult<Arc<Mutex<()>>> {
        self.slot(id).map(|slot| Arc::clone(&slot.flush))
    }

    /// Drop an inode's storage. The caller must not hold its lock and must
    /// already have removed every path that names it.
    pub fn release(&mut self, id: InodeId) {
        if let Some(slot) = self.slots.remove(&id) {
            debug_assert!(
                slot.inode.try_lock().is_none_or(|i| i.nlink == 0),
                "released inode {id} while still linked"
            );
            tracing::trace!(ino = id, kind = %slot.kind, "inode released");
        }
    }

    /// True while `id` is allocated.
    pub fn contains(&self, id: InodeId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Number of live inodes.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Never true in practice: the root is always present.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Handles to every live inode, for callers that must lock them after
    /// releasing the namespace lock.
    pub fn snapshot(&self) -> Vec<InodeRef> {
        self.slots.values().map(|slot| Arc::clone(&slot.inode)).collect()
    }
}
