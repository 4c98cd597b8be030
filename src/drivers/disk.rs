//! Blocking Disk Driver
//!
//! Block-granularity read/write over a ready/poll controller contract.
//! While an operation is pending the driver does not busy-spin: it
//! gives the CPU away through the scheduler's [`Yield`] seam and polls
//! again when it next runs.
//!
//! The controller itself sits behind [`DiskBus`]; the ATA PIO
//! implementation drives the primary IDE channel.

use crate::sched::Yield;

/// Bytes per disk block.
pub const BLOCK_SIZE: usize = 512;

/// Words transferred per block through the data register.
const WORDS_PER_BLOCK: usize = BLOCK_SIZE / 2;

/// Direction of a disk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskOp {
    Read,
    Write,
}

/// The disk controller contract the driver consumes.
pub trait DiskBus {
    /// Start an operation on `block`.
    fn issue(&mut self, op: DiskOp, block: u32);

    /// Whether the controller is ready to transfer data.
    fn is_ready(&self) -> bool;

    /// Pop the next 16-bit word of a pending read.
    fn read_data(&mut self) -> u16;

    /// Push the next 16-bit word of a pending write.
    fn write_data(&mut self, word: u16);
}

/// Block-granularity storage, as the file system sees it.
pub trait BlockDevice {
    fn read_block(&mut self, block: u32, buf: &mut [u8; BLOCK_SIZE]);
    fn write_block(&mut self, block: u32, buf: &[u8; BLOCK_SIZE]);
}

impl<D: BlockDevice> BlockDevice for &mut D {
    fn read_block(&mut self, block: u32, buf: &mut [u8; BLOCK_SIZE]) {
        (**self).read_block(block, buf)
    }

    fn write_block(&mut self, block: u32, buf: &[u8; BLOCK_SIZE]) {
        (**self).write_block(block, buf)
    }
}

/// A disk that blocks cooperatively instead of busy-waiting.
pub struct BlockingDisk<B: DiskBus, Y: Yield> {
    bus: B,
    yielder: Y,
}

impl<B: DiskBus, Y: Yield> BlockingDisk<B, Y> {
    pub fn new(bus: B, yielder: Y) -> Self {
        Self { bus, yielder }
    }

    /// Yield the CPU until the controller is ready to transfer.
    fn wait_ready(&mut self) {
        while !self.bus.is_ready() {
            self.yielder.yield_now();
        }
    }
}

impl<B: DiskBus, Y: Yield> BlockDevice for BlockingDisk<B, Y> {
    fn read_block(&mut self, block: u32, buf: &mut [u8; BLOCK_SIZE]) {
        self.bus.issue(DiskOp::Read, block);
        self.wait_ready();

        for chunk in buf.chunks_exact_mut(2) {
            let word = self.bus.read_data();
            chunk[0] = word as u8;
            chunk[1] = (word >> 8) as u8;
        }
        log::trace!("read block {}", block);
    }

    fn write_block(&mut self, block: u32, buf: &[u8; BLOCK_SIZE]) {
        self.bus.issue(DiskOp::Write, block);
        self.wait_ready();

        for chunk in buf.chunks_exact(2) {
            self.bus.write_data(u16::from(chunk[0]) | (u16::from(chunk[1]) << 8));
        }
        log::trace!("wrote block {}", block);
    }
}

/// ATA PIO controller on the primary IDE channel, LBA28 addressing.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub struct AtaPio {
    /// 0 = master, 1 = slave.
    drive: u8,
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod ata {
    /// Primary channel register ports.
    pub const DATA: u16 = 0x1F0;
    pub const FEATURES: u16 = 0x1F1;
    pub const SECTOR_COUNT: u16 = 0x1F2;
    pub const LBA_LOW: u16 = 0x1F3;
    pub const LBA_MID: u16 = 0x1F4;
    pub const LBA_HIGH: u16 = 0x1F5;
    pub const DRIVE_HEAD: u16 = 0x1F6;
    pub const COMMAND: u16 = 0x1F7;
    pub const STATUS: u16 = 0x1F7;

    pub const CMD_READ: u8 = 0x20;
    pub const CMD_WRITE: u8 = 0x30;

    /// Status bit: data request — the drive wants a transfer.
    pub const STATUS_DRQ: u8 = 1 << 3;
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl AtaPio {
    /// Driver for the given drive on the primary channel.
    pub const fn new(drive: u8) -> Self {
        Self { drive }
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl DiskBus for AtaPio {
    fn issue(&mut self, op: DiskOp, block: u32) {
        use crate::arch::outb;

        let command = match op {
            DiskOp::Read => ata::CMD_READ,
            DiskOp::Write => ata::CMD_WRITE,
        };

        // SAFETY: Documented single-sector LBA28 command sequence on
        // the primary channel ports.
        unsafe {
            outb(ata::FEATURES, 0);
            outb(ata::SECTOR_COUNT, 1);
            outb(ata::LBA_LOW, block as u8);
            outb(ata::LBA_MID, (block >> 8) as u8);
            outb(ata::LBA_HIGH, (block >> 16) as u8);
            outb(
                ata::DRIVE_HEAD,
                0xE0 | (self.drive << 4) | ((block >> 24) as u8 & 0x0F),
            );
            outb(ata::COMMAND, command);
        }
    }

    fn is_ready(&self) -> bool {
        // SAFETY: Status reads have no transfer side effects.
        unsafe { crate::arch::inb(ata::STATUS) & ata::STATUS_DRQ != 0 }
    }

    fn read_data(&mut self) -> u16 {
        // SAFETY: Only called while DRQ is set with a read pending.
        unsafe { crate::arch::inw(ata::DATA) }
    }

    fn write_data(&mut self, word: u16) {
        // SAFETY: Only called while DRQ is set with a write pending.
        unsafe { crate::arch::outw(ata::DATA, word) }
    }
}
