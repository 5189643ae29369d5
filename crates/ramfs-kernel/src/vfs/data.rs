//! Byte-buffer operations for regular files.
//!
//! Sparse semantics: a write or truncate past the end zero-fills the gap,
//! so no byte that was never written is ever anything but `0`. Callers hold
//! the inode lock for the duration of each call.

use std::time::SystemTime;

use super::error::{VfsError, VfsResult};
use super::inode::{Inode, InodeBody};

fn to_index(value: u64) -> VfsResult<usize> {
    usize::try_from(value).map_err(|_| VfsError::FileTooLarge(value))
}

/// Copy up to `size` bytes starting at `offset`. Short (or empty) past EOF.
pub fn read_at(data: &[u8], offset: u64, size: u32) -> Vec<u8> {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
    let end = start.saturating_add(size as usize).min(data.len());
    data[start..end].to_vec()
}

/// Write `buf` at `offset`, zero-extending the buffer first if needed.
/// Never shrinks the buffer.
pub fn write_at(data: &mut Vec<u8>, offset: u64, buf: &[u8]) -> VfsResult<u32> {
    let written = u32::try_from(buf.len()).map_err(|_| VfsError::FileTooLarge(buf.len() as u64))?;
    let start = to_index(offset)?;
    let end = start
        .checked_add(buf.len())
        .ok_or(VfsError::FileTooLarge(offset))?;
    if end > data.len() {
        data.resize(end, 0);
    }
    data[start..end].copy_from_slice(buf);
    Ok(written)
}

/// Cut or zero-extend the buffer to exactly `len` bytes.
pub fn resize(data: &mut Vec<u8>, len: u64) -> VfsResult<()> {
    let len = to_index(len)?;
    data.resize(len, 0);
    if data.capacity() > len.saturating_mul(2) {
        data.shrink_to_fit();
    }
    Ok(())
}

impl Inode {
    fn file_data(&self) -> Option<&Vec<u8>> {
        match &self.body {
            InodeBody::File(data) => Some(data),
            InodeBody::Directory(_) => None,
        }
    }

    fn file_data_mut(&mut self) -> Option<&mut Vec<u8>> {
        match &mut self.body {
            InodeBody::File(data) => Some(data),
            InodeBody::Directory(_) => None,
        }
    }

    /// File bytes, or `None` for a directory.
    pub fn contents(&self) -> Option<&[u8]> {
        self.file_data().map(Vec::as_slice)
    }

    /// Read from a regular file, updating atime.
    pub fn read(&mut self, offset: u64, size: u32, path: &str) -> VfsResult<Vec<u8>> {
        let bytes = self
            .file_data()
            .map(|data| read_at(data, offset, size))
            .ok_or_else(|| VfsError::is_a_directory(path))?;
        self.atime = SystemTime::now();
        Ok(bytes)
    }

    /// Write to a regular file, updating mtime and ctime.
    pub fn write(&mut self, offset: u64, buf: &[u8], path: &str) -> VfsResult<u32> {
        let data = self
            .file_data_mut()
            .ok_or_else(|| VfsError::is_a_directory(path))?;
        let written = write_at(data, offset, buf)?;
        self.touch_modified(SystemTime::now());
        Ok(written)
    }

    /// Truncate or extend a regular file, updating mtime and ctime.
    pub fn truncate(&mut self, len: u64, path: &str) -> VfsResult<()> {
        let data = self
            .file_data_mut()
            .ok_or_else(|| VfsError::is_a_directory(path))?;
        resize(data, len)?;
        self.touch_modified(SystemTime::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_past_eof() {
        let data = b"hello".to_vec();
        assert_eq!(read_at(&data, 3, 10), b"lo");
        assert!(read_at(&data, 5, 10).is_empty());
        assert!(read_at(&data, 1000, 10).is_empty());
        assert!(read_at(&data, u64::MAX, 10).is_empty());
    }

    #[test]
    fn test_write_zero_fills_gap() {
        let mut data = b"ab".to_vec();
        assert_eq!(write_at(&mut data, 5, b"xy").unwrap(), 2);
        assert_eq!(data, b"ab\0\0\0xy");
    }

    #[test]
    fn test_write_inside_does_not_shrink() {
        let mut data = b"hello world".to_vec();
        write_at(&mut data, 0, b"J").unwrap();
        assert_eq!(data, b"Jello world");
    }

    #[test]
    fn test_write_at_append_point() {
        let mut data = b"abc".to_vec();
        write_at(&mut data, 3, b"def").unwrap();
        assert_eq!(data, b"abcdef");
    }

    #[test]
    fn test_write_offset_overflow() {
        let mut data = Vec::new();
        let err = write_at(&mut data, u64::MAX, b"x").unwrap_err();
        assert!(matches!(err, VfsError::FileTooLarge(_)));
        assert!(data.is_empty());
    }

    #[test]
    fn test_resize_shrink_then_extend() {
        let mut data = b"hello".to_vec();
        resize(&mut data, 2).unwrap();
        assert_eq!(data, b"he");
        resize(&mut data, 4).unwrap();
        assert_eq!(data, b"he\0\0");
    }
}
