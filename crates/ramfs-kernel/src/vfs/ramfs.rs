//! The in-memory filesystem engine.
//!
//! # Locking
//!
//! Two tiers, always acquired in this order:
//!
//! 1. The namespace lock (`RamFs::tree`) guards the path index, the inode
//!    table, the handle table and their counters. Structural operations hold
//!    it for their whole critical section.
//! 2. Each inode's own mutex guards its bytes, child map and metadata.
//!
//! At most one inode lock is held at any moment. Data operations resolve the
//! path under the namespace lock, drop it, then lock only the target inode,
//! so data operations on different files run in parallel. Kind checks read
//! the inode table, never a child's lock.
//!
//! Flush takes a third, per-inode flush lock that orders exports of one
//! file. It holds the inode lock only long enough to copy the bytes out;
//! the disk I/O runs with neither of the other two locks held.

use std::path::Path;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::config::{ConfigError, RamfsConfig};

use super::error::{VfsError, VfsResult};
use super::handles::{HandleTable, OpenFile};
use super::inode::{InodeRef, InodeStore};
use super::namespace::{self, Namespace, ROOT};
use super::ops::VfsOps;
use super::persist::BackingStore;
use super::types::{
    DirEntry, FileAttr, FileHandle, FileType, InodeId, OpenFlags, SetAttr, StatFs,
};

/// State guarded by the namespace lock.
#[derive(Debug)]
struct Tree {
    namespace: Namespace,
    inodes: InodeStore,
    handles: HandleTable,
}

impl Tree {
    /// Resolve a path to its id and inode.
    fn lookup(&self, path: &str) -> VfsResult<(InodeId, InodeRef)> {
        let id = self.namespace.resolve(path)?;
        Ok((id, self.inodes.get(id)?))
    }

    /// Resolve the directory that would contain `path`.
    fn parent_dir<'p>(&self, path: &'p str) -> VfsResult<(InodeRef, &'p str)> {
        let (parent_id, name) = self.namespace.resolve_parent(path)?;
        let parent = self.inodes.get(parent_id)?;
        if !self.inodes.kind(parent_id)?.is_dir() {
            let parent_path = namespace::split_parent(path).map_or(ROOT, |(p, _)| p);
            return Err(VfsError::not_a_directory(parent_path));
        }
        Ok((parent, name))
    }

    /// Allocate an inode at `path` and link it into its parent.
    fn make_node(
        &mut self,
        path: &str,
        kind: FileType,
        mode: u32,
    ) -> VfsResult<(InodeId, InodeRef)> {
        if self.namespace.contains(path) {
            return Err(VfsError::already_exists(path));
        }
        let (parent, name) = self.parent_dir(path)?;

        let (id, inode) = self.inodes.allocate(kind, mode);
        self.namespace.insert(path.to_string(), id)?;

        let mut dir = parent.lock();
        if let Some(children) = dir.children_mut() {
            children.insert(name.to_string(), id);
        }
        if kind.is_dir() {
            dir.nlink += 1;
        }
        dir.touch_modified(SystemTime::now());
        Ok((id, inode))
    }

    /// Remove `name` from its parent's child map.
    fn detach(&self, parent: &InodeRef, name: &str, was_dir: bool) {
        let mut dir = parent.lock();
        if let Some(children) = dir.children_mut() {
            children.remove(name);
        }
        if was_dir {
            dir.nlink = dir.nlink.saturating_sub(1);
        }
        dir.touch_modified(SystemTime::now());
    }

    /// Drop one reference to an inode, releasing it at zero.
    ///
    /// Directories go straight to zero: they are never hard linked.
    fn drop_link(&mut self, id: InodeId, inode: &InodeRef) {
        let remaining = {
            let mut node = inode.lock();
            node.nlink = if node.is_dir() { 0 } else { node.nlink.saturating_sub(1) };
            node.ctime = SystemTime::now();
            node.nlink
        };
        if remaining == 0 {
            self.inodes.release(id);
        }
    }
}

/// In-memory filesystem with optional backing-directory mirroring.
#[derive(Debug)]
pub struct RamFs {
    tree: Mutex<Tree>,
    backing: Option<BackingStore>,
    max_name_len: usize,
}

impl Default for RamFs {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl RamFs {
    /// Build an engine from config, binding the backing directory if one is set.
    pub fn new(config: &RamfsConfig) -> Result<Self, ConfigError> {
        let backing = config.backing_store()?;
        Ok(Self::build(config, backing))
    }

    /// An engine with default settings and no backing directory.
    pub fn in_memory() -> Self {
        Self::build(&RamfsConfig::default(), None)
    }

    fn build(config: &RamfsConfig, backing: Option<BackingStore>) -> Self {
        Self {
            tree: Mutex::new(Tree {
                namespace: Namespace::new(),
                inodes: InodeStore::new(config.root_mode),
                handles: HandleTable::new(),
            }),
            backing,
            max_name_len: config.max_name_len,
        }
    }

    /// The bound backing directory, if any.
    pub fn backing(&self) -> Option<&BackingStore> {
        self.backing.as_ref()
    }

    /// Look up an open handle.
    pub fn handle(&self, fh: FileHandle) -> VfsResult<OpenFile> {
        self.tree.lock().handles.get(fh).cloned()
    }

    /// Number of live inodes, root included.
    pub fn inode_count(&self) -> usize {
        self.tree.lock().inodes.len()
    }

    fn normalize(&self, path: &Path) -> VfsResult<String> {
        namespace::normalize(path, self.max_name_len)
    }

    /// Resolve under the namespace lock and hand back the inode with the
    /// namespace lock already released.
    fn inode_for(&self, path: &str) -> VfsResult<InodeRef> {
        let tree = self.tree.lock();
        tree.lookup(path).map(|(_, inode)| inode)
    }
}

impl VfsOps for RamFs {
    fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        let path = self.normalize(path)?;
        let inode = self.inode_for(&path)?;
        let attr = inode.lock().attr();
        Ok(attr)
    }

    fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let path = self.normalize(path)?;
        let tree = self.tree.lock();
        let (_, dir) = tree.lookup(&path)?;

        let children: Vec<(String, InodeId)> = {
            let dir = dir.lock();
            dir.children()
                .ok_or_else(|| VfsError::not_a_directory(path.as_str()))?
                .iter()
                .map(|(name, id)| (name.clone(), *id))
                .collect()
        };

        children
            .into_iter()
            .map(|(name, ino)| -> VfsResult<DirEntry> {
                let kind = tree.inodes.kind(ino)?;
                Ok(DirEntry { name, ino, kind })
            })
            .collect()
    }

    fn read(&self, path: &Path, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        let path = self.normalize(path)?;
        let inode = self.inode_for(&path)?;
        let mut node = inode.lock();
        node.read(offset, size, &path)
    }

    fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u32> {
        let path = self.normalize(path)?;
        let inode = self.inode_for(&path)?;
        let mut node = inode.lock();
        node.write(offset, data, &path)
    }

    fn mknod(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let path = self.normalize(path)?;
        let inode = {
            let mut tree = self.tree.lock();
            let (_, inode) = tree.make_node(&path, FileType::File, mode)?;
            inode
        };
        tracing::debug!(path = %path, mode, "mknod");
        let attr = inode.lock().attr();
        Ok(attr)
    }

    fn create(&self, path: &Path, mode: u32) -> VfsResult<FileHandle> {
        let path = self.normalize(path)?;
        let mut tree = self.tree.lock();
        let (ino, _) = tree.make_node(&path, FileType::File, mode)?;
        let fh = tree.handles.open(OpenFile {
            ino,
            path: path.clone(),
            flags: OpenFlags::write(),
        });
        tracing::debug!(path = %path, ino, fh, "create");
        Ok(fh)
    }

    fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr> {
        let path = self.normalize(path)?;
        let inode = {
            let mut tree = self.tree.lock();
            let (_, inode) = tree.make_node(&path, FileType::Directory, mode)?;
            inode
        };
        tracing::debug!(path = %path, mode, "mkdir");
        let attr = inode.lock().attr();
        Ok(attr)
    }

    fn unlink(&self, path: &Path) -> VfsResult<()> {
        let path = self.normalize(path)?;
        if path == ROOT {
            return Err(VfsError::permission_denied("cannot remove root"));
        }

        let mut tree = self.tree.lock();
        let (id, inode) = tree.lookup(&path)?;
        if tree.inodes.kind(id)?.is_dir() {
            return Err(VfsError::is_a_directory(path));
        }
        let (parent, name) = tree.parent_dir(&path)?;

        tree.namespace.remove(&path)?;
        tree.detach(&parent, name, false);
        tree.drop_link(id, &inode);
        tracing::debug!(path = %path, ino = id, freed = !tree.inodes.contains(id), "unlink");
        Ok(())
    }

    fn rmdir(&self, path: &Path) -> VfsResult<()> {
        let path = self.normalize(path)?;
        if path == ROOT {
            return Err(VfsError::permission_denied("cannot remove root"));
        }

        let mut tree = self.tree.lock();
        let (id, inode) = tree.lookup(&path)?;
        {
            let dir = inode.lock();
            match dir.children() {
                None => return Err(VfsError::not_a_directory(path)),
                Some(children) if !children.is_empty() => {
                    return Err(VfsError::directory_not_empty(path));
                }
                Some(_) => {}
            }
        }
        let (parent, name) = tree.parent_dir(&path)?;

        tree.namespace.remove(&path)?;
        tree.detach(&parent, name, true);
        tree.drop_link(id, &inode);
        tracing::debug!(path = %path, ino = id, "rmdir");
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> VfsResult<()> {
        let from = self.normalize(from)?;
        let to = self.normalize(to)?;
        if from == ROOT || to == ROOT {
            return Err(VfsError::permission_denied("cannot rename root"));
        }

        let mut tree = self.tree.lock();
        let (src_id, src) = tree.lookup(&from)?;
        let src_is_dir = tree.inodes.kind(src_id)?.is_dir();
        let (old_parent, old_name) = tree.parent_dir(&from)?;
        let (new_parent, new_name) = tree.parent_dir(&to)?;

        if src_is_dir && namespace::is_within(&to, &from) && to != from {
            return Err(VfsError::invalid_path(format!(
                "cannot move {from} into its own subtree {to}"
            )));
        }

        if let Ok((dst_id, dst)) = tree.lookup(&to) {
            // Same inode (the same path, or two links to one file): nothing to do.
            if dst_id == src_id {
                return Ok(());
            }
            let dst_is_dir = tree.inodes.kind(dst_id)?.is_dir();
            let dst_empty = !dst_is_dir || dst.lock().children().is_none_or(|c| c.is_empty());
            match (src_is_dir, dst_is_dir) {
                (true, false) => return Err(VfsError::not_a_directory(to.as_str())),
                (false, true) => return Err(VfsError::is_a_directory(to.as_str())),
                (true, true) if !dst_empty => {
                    return Err(VfsError::directory_not_empty(to.as_str()));
                }
                _ => {}
            }

            tree.namespace.remove(&to)?;
            tree.detach(&new_parent, new_name, dst_is_dir);
            tree.drop_link(dst_id, &dst);
            tracing::debug!(path = %to, ino = dst_id, "rename replaced destination");
        }

        tree.namespace.rename(&from, &to, src_is_dir)?;
        tree.detach(&old_parent, old_name, src_is_dir);
        {
            let mut dir = new_parent.lock();
            if let Some(children) = dir.children_mut() {
                children.insert(new_name.to_string(), src_id);
            }
            if src_is_dir {
                dir.nlink += 1;
            }
            dir.touch_modified(SystemTime::now());
        }
        src.lock().ctime = SystemTime::now();

        tracing::debug!(from = %from, to = %to, ino = src_id, "rename");
        Ok(())
    }

    fn link(&self, oldpath: &Path, newpath: &Path) -> VfsResult<FileAttr> {
        let oldpath = self.normalize(oldpath)?;
        let newpath = self.normalize(newpath)?;

        let mut tree = self.tree.lock();
        let (id, inode) = tree.lookup(&oldpath)?;
        if tree.inodes.kind(id)?.is_dir() {
            return Err(VfsError::is_a_directory(oldpath));
        }
        if tree.namespace.contains(&newpath) {
            return Err(VfsError::already_exists(newpath));
        }
        let (parent, name) = tree.parent_dir(&newpath)?;
        tree.namespace.insert(newpath.clone(), id)?;
        {
            let mut dir = parent.lock();
            if let Some(children) = dir.children_mut() {
                children.insert(name.to_string(), id);
            }
            dir.touch_modified(SystemTime::now());
        }

        let attr = {
            let mut node = inode.lock();
            node.nlink += 1;
            node.ctime = SystemTime::now();
            node.attr()
        };
        tracing::debug!(target_path = %oldpath, link = %newpath, ino = id, nlink = attr.nlink, "link");
        Ok(attr)
    }

    fn truncate(&self, path: &Path, size: u64) -> VfsResult<()> {
        let path = self.normalize(path)?;
        let inode = self.inode_for(&path)?;
        let mut node = inode.lock();
        node.truncate(size, &path)
    }

    fn utimens(&self, path: &Path, times: Option<(SystemTime, SystemTime)>) -> VfsResult<()> {
        let path = self.normalize(path)?;
        let inode = self.inode_for(&path)?;
        let now = SystemTime::now();
        let (atime, mtime) = times.unwrap_or((now, now));
        let mut node = inode.lock();
        node.atime = atime;
        node.mtime = mtime;
        node.ctime = now;
        Ok(())
    }

    fn setattr(&self, path: &Path, set: SetAttr) -> VfsResult<FileAttr> {
        let path = self.normalize(path)?;
        let inode = self.inode_for(&path)?;
        let mut node = inode.lock();
        if let Some(size) = set.size {
            node.truncate(size, &path)?;
        }
        if set.atime.is_some() || set.mtime.is_some() {
            if let Some(atime) = set.atime {
                node.atime = atime;
            }
            if let Some(mtime) = set.mtime {
                node.mtime = mtime;
            }
            node.ctime = SystemTime::now();
        }
        Ok(node.attr())
    }

    fn chmod(&self, path: &Path, mode: u32) -> VfsResult<()> {
        let path = self.normalize(path)?;
        self.inode_for(&path)?;
        tracing::trace!(path = %path, mode, "chmod ignored");
        Ok(())
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> VfsResult<()> {
        let path = self.normalize(path)?;
        self.inode_for(&path)?;
        tracing::trace!(path = %path, uid, gid, "chown ignored");
        Ok(())
    }

    fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<FileHandle> {
        let path = self.normalize(path)?;
        let (fh, inode) = {
            let mut tree = self.tree.lock();
            let (ino, inode) = tree.lookup(&path)?;
            if flags.write && tree.inodes.kind(ino)?.is_dir() {
                return Err(VfsError::is_a_directory(path));
            }
            let fh = tree.handles.open(OpenFile {
                ino,
                path: path.clone(),
                flags,
            });
            (fh, inode)
        };
        if flags.truncate {
            inode.lock().truncate(0, &path)?;
        }
        tracing::trace!(path = %path, fh, "open");
        Ok(fh)
    }

    fn release(&self, fh: FileHandle) -> VfsResult<()> {
        let file = self.tree.lock().handles.release(fh)?;
        tracing::trace!(path = %file.path, fh, "release");
        Ok(())
    }

    fn flush(&self, path: &Path) -> VfsResult<()> {
        let path = self.normalize(path)?;
        let (inode, order) = {
            let tree = self.tree.lock();
            let (id, inode) = tree.lookup(&path)?;
            if tree.inodes.kind(id)?.is_dir() {
                return Ok(());
            }
            (inode, tree.inodes.flush_lock(id)?)
        };
        let Some(backing) = &self.backing else {
            return Ok(());
        };

        // Exports of one file land in the order their snapshots were taken.
        let _order = order.lock();
        let data = inode.lock().contents().map(<[u8]>::to_vec).unwrap_or_default();
        match backing.flush(&path, &data) {
            Ok(()) => {
                tracing::info!(path = %path, bytes = data.len(), "flushed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "flush failed");
                Err(e)
            }
        }
    }

    fn fsync(&self, path: &Path, _datasync: bool) -> VfsResult<()> {
        self.flush(path)
    }

    fn statfs(&self) -> VfsResult<StatFs> {
        let inodes = self.tree.lock().inodes.snapshot();
        // Sized one inode at a time, outside the namespace lock.
        let bytes: u64 = inodes.iter().map(|inode| inode.lock().size()).sum();
        let namelen = u32::try_from(self.max_name_len).unwrap_or(u32::MAX);
        Ok(StatFs::from_usage(inodes.len() as u64, bytes, namelen))
    }
}
