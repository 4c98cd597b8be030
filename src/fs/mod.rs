//! Simple File System
//!
//! Numerical file identifiers over block-granularity storage. The
//! on-disk layout is two metadata blocks followed by data:
//! - Block 0: a fixed table of 64 inodes (8 bytes each: id, data block)
//! - Block 1: a free-block bitmap, one bit per block, 4096 blocks
//!
//! Every file occupies exactly one data block. Metadata is cached in
//! memory while mounted and written back on every mutation and on
//! `sync`.

mod file;

pub use file::File;

use core::fmt;

use crate::drivers::disk::{BlockDevice, BLOCK_SIZE};

/// Inode slots in block 0.
pub const MAX_INODES: usize = BLOCK_SIZE / Inode::DISK_SIZE;

/// Blocks tracked by the bitmap in block 1.
pub const MAX_BLOCKS: usize = BLOCK_SIZE * 8;

/// Block holding the inode table.
const INODE_BLOCK: u32 = 0;
/// Block holding the free-block bitmap.
const BITMAP_BLOCK: u32 = 1;

/// Identifier value marking a free inode slot (the all-ones pattern,
/// `-1` in the on-disk signed convention).
const FREE_ID: u32 = u32::MAX;

/// Error type for file system operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// A file with this id already exists.
    AlreadyExists,
    /// No file with this id exists.
    NotFound,
    /// The inode table is full.
    NoFreeInode,
    /// No data block is free.
    NoFreeBlock,
    /// The id is reserved for free-slot marking.
    InvalidId,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists => write!(f, "file already exists"),
            Self::NotFound => write!(f, "file not found"),
            Self::NoFreeInode => write!(f, "inode table is full"),
            Self::NoFreeBlock => write!(f, "no free data block"),
            Self::InvalidId => write!(f, "reserved file id"),
        }
    }
}

/// One slot of the on-disk inode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    /// File identifier, or [`FREE_ID`] for a free slot.
    pub id: u32,
    /// Data block owned by the file.
    pub block: u32,
}

impl Inode {
    /// Bytes one inode occupies in block 0.
    pub const DISK_SIZE: usize = 8;

    const EMPTY: Self = Self { id: FREE_ID, block: 0 };

    #[inline]
    fn is_free(&self) -> bool {
        self.id == FREE_ID
    }

    fn to_bytes(self) -> [u8; Self::DISK_SIZE] {
        let mut bytes = [0u8; Self::DISK_SIZE];
        bytes[..4].copy_from_slice(&self.id.to_le_bytes());
        bytes[4..].copy_from_slice(&self.block.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            id: u32::from_le_bytes(bytes[..4].try_into().unwrap()),
            block: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
        }
    }
}

/// A mounted file system.
pub struct FileSystem<D: BlockDevice> {
    device: D,
    inodes: [Inode; MAX_INODES],
    free_map: [u8; BLOCK_SIZE],
}

impl<D: BlockDevice> FileSystem<D> {
    /// Write an empty file system to `device`.
    ///
    /// Populates an empty inode table and a bitmap with the two
    /// metadata blocks marked used, so data allocation can never hand
    /// them out.
    pub fn format(device: &mut D) {
        let inodes = [Inode::EMPTY; MAX_INODES];
        let mut free_map = [0u8; BLOCK_SIZE];
        mark_block(&mut free_map, INODE_BLOCK, true);
        mark_block(&mut free_map, BITMAP_BLOCK, true);

        device.write_block(INODE_BLOCK, &inode_table_bytes(&inodes));
        device.write_block(BITMAP_BLOCK, &free_map);
        log::info!("formatted disk: {} inode slots, {} blocks", MAX_INODES, MAX_BLOCKS);
    }

    /// Mount the file system on `device`, reading its metadata blocks.
    pub fn mount(mut device: D) -> Self {
        let mut table = [0u8; BLOCK_SIZE];
        device.read_block(INODE_BLOCK, &mut table);
        let mut inodes = [Inode::EMPTY; MAX_INODES];
        for (slot, inode) in inodes.iter_mut().enumerate() {
            *inode = Inode::from_bytes(&table[slot * Inode::DISK_SIZE..]);
        }

        let mut free_map = [0u8; BLOCK_SIZE];
        device.read_block(BITMAP_BLOCK, &mut free_map);

        log::debug!("mounted file system");
        Self {
            device,
            inodes,
            free_map,
        }
    }

    /// Write the cached metadata back to disk.
    pub fn sync(&mut self) {
        self.device.write_block(INODE_BLOCK, &inode_table_bytes(&self.inodes));
        self.device.write_block(BITMAP_BLOCK, &self.free_map);
    }

    /// Give the device back, syncing metadata first.
    pub fn unmount(mut self) -> D {
        self.sync();
        self.device
    }

    /// The inode slot holding `id`, if the file exists.
    pub fn lookup(&self, id: u32) -> Option<usize> {
        self.inodes
            .iter()
            .position(|inode| !inode.is_free() && inode.id == id)
    }

    /// Create an empty file named `id`.
    pub fn create(&mut self, id: u32) -> Result<(), FsError> {
        if id == FREE_ID {
            return Err(FsError::InvalidId);
        }
        if self.lookup(id).is_some() {
            return Err(FsError::AlreadyExists);
        }

        let slot = self
            .inodes
            .iter()
            .position(Inode::is_free)
            .ok_or(FsError::NoFreeInode)?;
        let block = self.claim_free_block().ok_or(FsError::NoFreeBlock)?;

        // The file starts out as one zeroed block.
        self.device.write_block(block, &[0u8; BLOCK_SIZE]);
        self.inodes[slot] = Inode { id, block };
        self.sync();

        log::debug!("created file {} in slot {} (block {})", id, slot, block);
        Ok(())
    }

    /// Delete the file named `id`, releasing its block.
    pub fn delete(&mut self, id: u32) -> Result<(), FsError> {
        let slot = self.lookup(id).ok_or(FsError::NotFound)?;

        mark_block(&mut self.free_map, self.inodes[slot].block, false);
        self.inodes[slot] = Inode::EMPTY;
        self.sync();

        log::debug!("deleted file {}", id);
        Ok(())
    }

    /// Open the file named `id` for sequential access.
    pub fn open(&mut self, id: u32) -> Result<File<'_, D>, FsError> {
        let slot = self.lookup(id).ok_or(FsError::NotFound)?;
        Ok(File::open(self, slot))
    }

    /// Claim the lowest free block in the bitmap.
    fn claim_free_block(&mut self) -> Option<u32> {
        for block in 0..MAX_BLOCKS as u32 {
            if !block_is_used(&self.free_map, block) {
                mark_block(&mut self.free_map, block, true);
                return Some(block);
            }
        }
        None
    }

    fn inode(&self, slot: usize) -> Inode {
        self.inodes[slot]
    }

    fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

fn inode_table_bytes(inodes: &[Inode; MAX_INODES]) -> [u8; BLOCK_SIZE] {
    let mut bytes = [0u8; BLOCK_SIZE];
    for (slot, inode) in inodes.iter().enumerate() {
        bytes[slot * Inode::DISK_SIZE..(slot + 1) * Inode::DISK_SIZE]
            .copy_from_slice(&inode.to_bytes());
    }
    bytes
}

#[inline]
fn block_is_used(map: &[u8; BLOCK_SIZE], block: u32) -> bool {
    let block = block as usize;
    (map[block / 8] >> (block % 8)) & 1 == 1
}

#[inline]
fn mark_block(map: &mut [u8; BLOCK_SIZE], block: u32, used: bool) {
    let block = block as usize;
    if used {
        map[block / 8] |= 1 << (block % 8);
    } else {
        map[block / 8] &= !(1 << (block % 8));
    }
}
