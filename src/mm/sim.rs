//! Software MMU for tests
//!
//! A word-granular model of the translation hardware: a flat block of
//! simulated physical memory, a translation base register and an enable
//! flag. Loads and stores walk the *real* directory and table entries
//! the code under test built, through the same two-level decomposition
//! the hardware uses — so the recursive-mapping window only works in a
//! test if the reserved slot actually references the directory.
//!
//! No TLB is modelled; `flush` is a no-op.

use alloc::vec;
use alloc::vec::Vec;

use super::addr::{Frame, VirtAddr, PAGE_SIZE};
use super::paging::{Entry, Mmu};

pub struct SimMmu {
    phys: Vec<u8>,
    base: Frame,
    enabled: bool,
}

impl SimMmu {
    /// Simulated machine with `frames` frames of physical memory.
    pub fn new(frames: usize) -> Self {
        Self {
            phys: vec![0; frames * PAGE_SIZE as usize],
            base: Frame::new(0),
            enabled: false,
        }
    }

    /// Read a word straight from physical memory, bypassing translation.
    pub fn phys_word(&self, addr: u32) -> u32 {
        let at = addr as usize;
        let bytes: [u8; 4] = self.phys[at..at + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    /// Write a word straight to physical memory, bypassing translation.
    pub fn set_phys_word(&mut self, addr: u32, value: u32) {
        let at = addr as usize;
        self.phys[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Walk the active structures exactly as the hardware would.
    ///
    /// Panics on an absent entry: the code under test dereferenced an
    /// address it never mapped, which on hardware would be a nested
    /// fault inside the fault handler.
    fn translate(&self, addr: VirtAddr) -> u32 {
        if !self.enabled {
            return addr.as_u32();
        }

        let pde_at = self.base.base().as_u32() + (addr.directory_index() as u32) * 4;
        let pde = Entry::from_bits(self.phys_word(pde_at));
        assert!(
            pde.is_present(),
            "translation fault: no table backs {} (directory slot {})",
            addr,
            addr.directory_index()
        );

        let pte_at = pde.frame().base().as_u32() + (addr.table_index() as u32) * 4;
        let pte = Entry::from_bits(self.phys_word(pte_at));
        assert!(
            pte.is_present(),
            "translation fault: no frame backs {} (table slot {})",
            addr,
            addr.table_index()
        );

        pte.frame().base().as_u32() + addr.page_offset()
    }
}

impl Mmu for SimMmu {
    fn read_word(&self, addr: VirtAddr) -> u32 {
        self.phys_word(self.translate(addr))
    }

    fn write_word(&mut self, addr: VirtAddr, value: u32) {
        let at = self.translate(addr);
        self.set_phys_word(at, value);
    }

    fn set_translation_base(&mut self, directory: Frame) {
        self.base = directory;
    }

    fn translation_base(&self) -> Frame {
        self.base
    }

    fn enable_translation(&mut self) {
        self.enabled = true;
    }

    fn translation_enabled(&self) -> bool {
        self.enabled
    }

    fn flush(&mut self, _addr: VirtAddr) {}
}

#[cfg(test)]
mod tests {
    use super::super::paging::EntryFlags;
    use super::*;

    #[test]
    fn identity_until_translation_is_enabled() {
        let mut sim = SimMmu::new(16);
        sim.write_word(VirtAddr::new(0x2000), 0xABCD);
        assert_eq!(sim.phys_word(0x2000), 0xABCD);
        assert_eq!(sim.read_word(VirtAddr::new(0x2000)), 0xABCD);
    }

    #[test]
    fn enabled_walks_go_through_both_levels() {
        let mut sim = SimMmu::new(16);
        let flags = EntryFlags::PRESENT | EntryFlags::WRITABLE;

        // Directory in frame 1, table in frame 2, data in frame 3;
        // map virtual page 0x0040_0000 (slot 1, entry 0) to frame 3.
        sim.set_phys_word(0x1000 + 4, Entry::mapping(Frame::new(2), flags).bits());
        sim.set_phys_word(0x2000, Entry::mapping(Frame::new(3), flags).bits());
        sim.set_phys_word(0x3008, 0x5EED);

        sim.set_translation_base(Frame::new(1));
        sim.enable_translation();
        assert_eq!(sim.read_word(VirtAddr::new(0x0040_0008)), 0x5EED);
    }

    #[test]
    #[should_panic(expected = "translation fault")]
    fn unmapped_access_panics() {
        let mut sim = SimMmu::new(16);
        sim.set_translation_base(Frame::new(1));
        sim.enable_translation();
        sim.read_word(VirtAddr::new(0x0080_0000));
    }
}
