//! Page Directory / Page Table Entry Encoding
//!
//! Implements the two-level IA-32 paging records: 32-bit entries holding
//! a frame number in the high 20 bits and protection flags in the low 12.
//! Page directories and page tables share this layout, so one `Entry`
//! type covers both.
//!
//! All bit packing for the paging geometry lives here and in `addr`;
//! the fault-handling policy in `vmm` never touches raw bits, so an
//! alternate geometry could be substituted behind these types.

use core::fmt;

use bitflags::bitflags;

use super::addr::{Frame, VirtAddr};

bitflags! {
    /// Protection and status bits of a directory or table entry.
    ///
    /// The layout is mandated by the hardware page walker; bits 5 and 6
    /// are written back by the hardware and only read by software.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u32 {
        /// Entry maps a frame; clear means the walker raises a fault.
        const PRESENT = 1 << 0;
        /// Writes are allowed through this entry.
        const WRITABLE = 1 << 1;
        /// User-mode accesses are allowed through this entry.
        const USER = 1 << 2;
        /// Write-through caching for the mapped frame.
        const WRITE_THROUGH = 1 << 3;
        /// Caching disabled for the mapped frame.
        const NO_CACHE = 1 << 4;
        /// Set by hardware on first access.
        const ACCESSED = 1 << 5;
        /// Set by hardware on first write (table entries only).
        const DIRTY = 1 << 6;
    }
}

bitflags! {
    /// Error code pushed by the hardware alongside a page fault.
    ///
    /// Bit 0 is the classification bit the fault handler branches on:
    /// clear means no usable translation existed, set means a present
    /// entry denied the access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FaultCode: u32 {
        /// Present entry, access violated its protection flags.
        const PROTECTION = 1 << 0;
        /// The faulting access was a write.
        const WRITE = 1 << 1;
        /// The faulting access came from user mode.
        const USER = 1 << 2;
        /// A reserved bit was set in a paging structure.
        const RESERVED = 1 << 3;
        /// The faulting access was an instruction fetch.
        const FETCH = 1 << 4;
    }
}

/// A single 32-bit directory or table entry.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Entry(u32);

impl Entry {
    /// Frame-number mask (bits 31..12).
    const FRAME_MASK: u32 = 0xFFFF_F000;

    /// An empty, absent entry.
    #[inline]
    pub const fn absent() -> Self {
        Self(0)
    }

    /// The deferred-allocation sentinel: not present, but flagged
    /// writable to mark the slot as valid-range-not-yet-backed rather
    /// than invalid.
    #[inline]
    pub const fn deferred() -> Self {
        Self(EntryFlags::WRITABLE.bits())
    }

    /// An entry mapping `frame` with the given flags.
    #[inline]
    pub const fn mapping(frame: Frame, flags: EntryFlags) -> Self {
        Self((frame.base().as_u32() & Self::FRAME_MASK) | flags.bits())
    }

    /// Reconstruct an entry from its raw bits.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw bits of this entry.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check if the entry is present.
    #[inline]
    pub const fn is_present(self) -> bool {
        self.0 & EntryFlags::PRESENT.bits() != 0
    }

    /// Check if the entry allows writes.
    #[inline]
    pub const fn is_writable(self) -> bool {
        self.0 & EntryFlags::WRITABLE.bits() != 0
    }

    /// The frame this entry maps. Meaningless if the entry is absent.
    #[inline]
    pub const fn frame(self) -> Frame {
        Frame::new((self.0 & Self::FRAME_MASK) >> 12)
    }

    /// The flag bits of this entry.
    #[inline]
    pub fn flags(self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.0 & !Self::FRAME_MASK)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_present() {
            write!(f, "Entry({:?}, {:?})", self.frame(), self.flags())
        } else {
            write!(f, "Entry(absent, {:?})", self.flags())
        }
    }
}

/// The translation hardware this core drives.
///
/// Models exactly the surface the memory manager consumes: word-granular
/// loads and stores issued through the (possibly enabled) translation,
/// the translation base register, the translation enable flag, and
/// per-page translation invalidation. The x86 implementation lives in
/// `arch`; tests substitute a software walker.
pub trait Mmu {
    /// Load the 32-bit word at `addr`.
    fn read_word(&self, addr: VirtAddr) -> u32;

    /// Store a 32-bit word at `addr`.
    fn write_word(&mut self, addr: VirtAddr, value: u32);

    /// Point the translation base register at a directory frame.
    fn set_translation_base(&mut self, directory: Frame);

    /// The directory frame currently held by the translation base.
    fn translation_base(&self) -> Frame;

    /// Turn on page-table-based translation. Idempotent.
    fn enable_translation(&mut self);

    /// Whether translation is currently enabled.
    fn translation_enabled(&self) -> bool;

    /// Drop any cached translation for the page containing `addr`.
    fn flush(&mut self, addr: VirtAddr);
}

/// Error type for virtual memory operations.
///
/// Every variant is fatal at the trap boundary today; the typed split
/// exists so a later swapping layer can intercept `DataPoolExhausted`
/// without changing this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// A present entry denied the access. No recovery path.
    ProtectionViolation,
    /// The structure pool had no frame for a directory or table.
    StructurePoolExhausted,
    /// The data pool had no frame for a process page.
    DataPoolExhausted,
    /// The hardware error code and the observed table state disagree.
    InconsistentState,
    /// A fault or lifecycle operation arrived before any address space
    /// was activated.
    NoActiveSpace,
    /// The page has no present mapping to operate on.
    NotMapped,
    /// The address or range is not page-aligned.
    Misaligned,
    /// The region overlaps an existing region or reserved territory.
    RegionOverlap,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtectionViolation => write!(f, "access violated protection flags"),
            Self::StructurePoolExhausted => write!(f, "out of frames for paging structures"),
            Self::DataPoolExhausted => write!(f, "out of frames for process pages"),
            Self::InconsistentState => write!(f, "fault state contradicts page tables"),
            Self::NoActiveSpace => write!(f, "no address space is active"),
            Self::NotMapped => write!(f, "page is not mapped"),
            Self::Misaligned => write!(f, "address not page-aligned"),
            Self::RegionOverlap => write!(f, "region overlaps reserved or registered range"),
        }
    }
}
