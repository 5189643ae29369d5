//! Open-file handle table.
//!
//! Handles are advisory bookkeeping for the adapter: data operations stay
//! path-based. The counter and table live beside the namespace and share its
//! lock.

use std::collections::HashMap;

use super::error::{VfsError, VfsResult};
use super::types::{FileHandle, InodeId, OpenFlags};

/// What an open handle refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFile {
    pub ino: InodeId,
    pub path: String,
    pub flags: OpenFlags,
}

/// Open handles keyed by id. Ids are never reissued.
#[derive(Debug)]
pub struct HandleTable {
    open: HashMap<FileHandle, OpenFile>,
    next: FileHandle,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    /// An empty table; the first handle issued is 1.
    pub fn new() -> Self {
        Self {
            open: HashMap::new(),
            next: 1,
        }
    }

    /// Record an open file and return its fresh handle.
    pub fn open(&mut self, file: OpenFile) -> FileHandle {
        let fh = self.next;
        self.next += 1;
        self.open.insert(fh, file);
        fh
    }

    /// The record behind `fh`, or `BadHandle`.
    pub fn get(&self, fh: FileHandle) -> VfsResult<&OpenFile> {
        self.open.get(&fh).ok_or(VfsError::BadHandle(fh))
    }

    /// Forget `fh`, returning what it referred to.
    pub fn release(&mut self, fh: FileHandle) -> VfsResult<OpenFile> {
        self.open.remove(&fh).ok_or(VfsError::BadHandle(fh))
    }

    /// Number of handles currently open.
    pub fn len(&self) -> usize {
        self.open.len()
    }

    /// True when no handle is open.
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}
