//! Path index: absolute path string -> inode id.
//!
//! This is the second index over the inode arena. Several paths may name the
//! same file inode (hard links); each directory inode is named by exactly one
//! path. Directory child maps inside the inodes mirror this index and are
//! always updated together with it under the namespace lock.

use std::collections::HashMap;
use std::path::{Component, Path};

use super::error::{VfsError, VfsResult};
use super::types::{InodeId, ROOT_INODE};

/// Path string of the root directory.
pub const ROOT: &str = "/";

/// Normalize an absolute path: collapse `//`, drop `.`, resolve `..`
/// lexically, strip any trailing `/`.
///
/// Each component must be valid UTF-8 and no longer than `max_name_len` bytes.
pub fn normalize(path: &Path, max_name_len: usize) -> VfsResult<String> {
    if !path.has_root() {
        return Err(VfsError::invalid_path(path.display().to_string()));
    }

    let mut parts: Vec<&str> = Vec::new();
    for component in path.components() {
        match component {
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(s) => {
                let name = s
                    .to_str()
                    .ok_or_else(|| VfsError::invalid_path(path.display().to_string()))?;
                if name.len() > max_name_len {
                    return Err(VfsError::NameTooLong(name.to_string()));
                }
                parts.push(name);
            }
        }
    }

    if parts.is_empty() {
        return Ok(ROOT.to_string());
    }
    let mut normalized = String::with_capacity(path.as_os_str().len());
    for part in parts {
        normalized.push('/');
        normalized.push_str(part);
    }
    Ok(normalized)
}

/// Split a normalized path into parent path and final component.
/// Returns `None` for the root.
pub fn split_parent(path: &str) -> Option<(&str, &str)> {
    if path == ROOT {
        return None;
    }
    let idx = path.rfind('/')?;
    let parent = if idx == 0 { ROOT } else { &path[..idx] };
    Some((parent, &path[idx + 1..]))
}

/// True if `path` is `ancestor` or lies beneath it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == ROOT {
        return true;
    }
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/'))
}

/// Path-keyed lookup over the inode table.
#[derive(Debug)]
pub struct Namespace {
    paths: HashMap<String, InodeId>,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespace {
    /// Create an index containing only `/`.
    pub fn new() -> Self {
        let mut paths = HashMap::new();
        paths.insert(ROOT.to_string(), ROOT_INODE);
        Self { paths }
    }

    /// Exact-match lookup.
    pub fn resolve(&self, path: &str) -> VfsResult<InodeId> {
        self.paths
            .get(path)
            .copied()
            .ok_or_else(|| VfsError::not_found(path))
    }

    /// Resolve the parent directory of `path`, returning its id and the leaf
    /// name. The root has no parent.
    pub fn resolve_parent<'p>(&self, path: &'p str) -> VfsResult<(InodeId, &'p str)> {
        let (parent, name) =
            split_parent(path).ok_or_else(|| VfsError::permission_denied(path))?;
        Ok((self.resolve(parent)?, name))
    }

    /// True if `path` is bound.
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    /// Bind a new path. Fails rather than overwriting.
    pub fn insert(&mut self, path: String, id: InodeId) -> VfsResult<()> {
        if self.paths.contains_key(&path) {
            return Err(VfsError::already_exists(path));
        }
        self.paths.insert(path, id);
        Ok(())
    }

    /// Unbind a path, returning the inode it named.
    pub fn remove(&mut self, path: &str) -> VfsResult<InodeId> {
        self.paths
            .remove(path)
            .ok_or_else(|| VfsError::not_found(path))
    }

    /// Move `old` to `new`. With `subtree` set (a directory), every path
    /// beneath `old` is re-keyed beneath `new` as well.
    ///
    /// `new` and its would-be descendants must already be unbound.
    pub fn rename(&mut self, old: &str, new: &str, subtree: bool) -> VfsResult<()> {
        let id = self.remove(old)?;
        if !subtree {
            self.paths.insert(new.to_string(), id);
            return Ok(());
        }
        let moved: Vec<String> = self
            .paths
            .keys()
            .filter(|p| is_within(p, old))
            .cloned()
            .collect();
        for child in moved {
            if let Some(child_id) = self.paths.remove(&child) {
                let rekeyed = format!("{new}{}", &child[old.len()..]);
                self.paths.insert(rekeyed, child_id);
            }
        }
        self.paths.insert(new.to_string(), id);
        Ok(())
    }

    /// Number of bound paths (hard links count once per path).
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Never true in practice: `/` is always bound.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
