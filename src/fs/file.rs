//! Sequential File Handle
//!
//! A file occupies exactly one disk block in this file system. Opening
//! a file pulls its block into a cache; reads and writes move a shared
//! sequential cursor inside it; the cache is written back when the
//! handle is dropped.

use crate::drivers::disk::{BlockDevice, BLOCK_SIZE};

use super::FileSystem;

/// An open file with a sequential cursor.
pub struct File<'fs, D: BlockDevice> {
    fs: &'fs mut FileSystem<D>,
    slot: usize,
    cache: [u8; BLOCK_SIZE],
    position: usize,
}

impl<'fs, D: BlockDevice> File<'fs, D> {
    pub(super) fn open(fs: &'fs mut FileSystem<D>, slot: usize) -> Self {
        let mut cache = [0u8; BLOCK_SIZE];
        let block = fs.inode(slot).block;
        fs.device_mut().read_block(block, &mut cache);

        Self {
            fs,
            slot,
            cache,
            position: 0,
        }
    }

    /// Read up to `buf.len()` bytes from the cursor onward.
    ///
    /// Returns the number of bytes read, which is short only when the
    /// end of the file is reached.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let available = BLOCK_SIZE - self.position;
        let count = buf.len().min(available);

        buf[..count].copy_from_slice(&self.cache[self.position..self.position + count]);
        self.position += count;
        count
    }

    /// Write up to `buf.len()` bytes at the cursor.
    ///
    /// Returns the number of bytes written, short only when the end of
    /// the file is reached.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        let available = BLOCK_SIZE - self.position;
        let count = buf.len().min(available);

        self.cache[self.position..self.position + count].copy_from_slice(&buf[..count]);
        self.position += count;
        count
    }

    /// Move the cursor back to the start of the file.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Whether the cursor sits at the end of the file.
    pub fn at_end(&self) -> bool {
        self.position >= BLOCK_SIZE
    }
}

impl<D: BlockDevice> Drop for File<'_, D> {
    fn drop(&mut self) {
        // Closing writes cached data back to the file's block.
        let block = self.fs.inode(self.slot).block;
        self.fs.device_mut().write_block(block, &self.cache);
    }
}
