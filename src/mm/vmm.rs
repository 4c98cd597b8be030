//! Virtual Memory Manager
//!
//! The context object that owns demand paging: it builds two-level
//! paging structures per address space, tracks which directory the
//! hardware consults, and resolves page faults by allocating frames on
//! first touch.
//!
//! # Structure of an address space
//! - Directory slot 0 maps a shared table that identity-maps the low
//!   physical region; the mapping is identical in every address space,
//!   so kernel structures stay addressable across switches.
//! - Directory slot 1023 references the directory's own frame. Through
//!   this recursive slot every page table is reachable as ordinary data
//!   at a fixed window, which lets the fault handler edit table entries
//!   without a separate translation step.
//! - All other slots start as the deferred sentinel: valid range, not
//!   yet backed by a table.
//!
//! # Allocation ordering
//! A fault handler must never fault on the memory it uses to record a
//! mapping. Structure frames are drawn from a pool inside the shared
//! region (always mapped, edited at identity addresses), a fresh table
//! is filled before the directory entry exposes it, and the data frame
//! is installed last.

use super::addr::{Frame, VirtAddr, ENTRIES_PER_TABLE, PAGE_SHIFT, PAGE_SIZE, RECURSIVE_SLOT};
use super::paging::{Entry, EntryFlags, FaultCode, Mmu, VmError};
use super::pool::FramePool;
use super::region::{Region, RegionTable};

/// Flags for demand-allocated directory and table entries.
const DEMAND_FLAGS: EntryFlags = EntryFlags::PRESENT
    .union(EntryFlags::WRITABLE)
    .union(EntryFlags::USER);

/// Flags for the shared identity mapping.
const SHARED_FLAGS: EntryFlags = EntryFlags::PRESENT
    .union(EntryFlags::WRITABLE)
    .union(EntryFlags::USER);

/// Flags for the recursive slot: supervisor-only, so user code can
/// never write page tables through the window.
const RECURSIVE_FLAGS: EntryFlags = EntryFlags::PRESENT.union(EntryFlags::WRITABLE);

/// One address space: a directory frame plus its registered regions.
///
/// Created once by [`Vmm::create_space`]; its page tables grow lazily as
/// the fault handler touches new directory slots. There is no teardown —
/// releasing a whole space back to its pools is future work.
#[derive(Debug)]
pub struct AddressSpace {
    directory: Frame,
    shared_table: Frame,
    shared_pages: usize,
    regions: RegionTable,
}

impl AddressSpace {
    fn new(directory: Frame, shared_table: Frame, shared_pages: usize) -> Self {
        Self {
            directory,
            shared_table,
            shared_pages,
            regions: RegionTable::new(),
        }
    }

    /// The frame holding this space's page directory.
    #[inline]
    pub fn directory(&self) -> Frame {
        self.directory
    }

    /// The frame holding the shared identity table.
    #[inline]
    pub fn shared_table(&self) -> Frame {
        self.shared_table
    }

    /// Register a region owner against this space.
    ///
    /// Rejects ranges that touch the shared identity region or the
    /// recursive-mapping window, and any overlap with a region already
    /// registered.
    pub fn register_region(&mut self, region: Region) -> Result<(), VmError> {
        let shared_end = (self.shared_pages as u32) << PAGE_SHIFT;
        if region.start().as_u32() < shared_end {
            return Err(VmError::RegionOverlap);
        }
        if region.end() > super::addr::TABLE_WINDOW_BASE as u64 {
            return Err(VmError::RegionOverlap);
        }

        self.regions.register(region)
    }

    /// The registered region containing `addr`, if any.
    pub fn region_for(&self, addr: VirtAddr) -> Option<&Region> {
        self.regions.find(addr)
    }
}

/// What the fault handler did to resolve a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultResolution {
    /// Table frame allocated for the directory slot, if one was needed.
    pub new_table: Option<Frame>,
    /// Data frame now backing the faulting page.
    pub page: Frame,
}

/// The virtual memory manager context.
///
/// Owns the translation hardware seam and the two frame pools, and
/// carries the single point of truth for "the directory the hardware
/// will next consult". The trap dispatcher holds one of these; nothing
/// here is a global.
pub struct Vmm<M: Mmu, P: FramePool> {
    mmu: M,
    structure_pool: P,
    data_pool: P,
    shared_pages: usize,
    active: Option<Frame>,
}

impl<M: Mmu, P: FramePool> Vmm<M, P> {
    /// Wire up the manager.
    ///
    /// `structure_pool` backs directories and tables and must hand out
    /// frames inside the shared identity region; `data_pool` backs
    /// process pages. `shared_size` is the byte length of the identity-
    /// mapped low region.
    ///
    /// # Panics
    /// Panics if `shared_size` is not page-aligned or exceeds what one
    /// table maps (4 MiB); both are boot-configuration errors.
    pub fn new(mmu: M, structure_pool: P, data_pool: P, shared_size: u32) -> Self {
        if shared_size % PAGE_SIZE != 0 {
            panic!("shared region size {:#x} is not page-aligned", shared_size);
        }
        let shared_pages = (shared_size >> PAGE_SHIFT) as usize;
        if shared_pages == 0 || shared_pages > ENTRIES_PER_TABLE {
            panic!("shared region of {} pages does not fit one table", shared_pages);
        }

        Self {
            mmu,
            structure_pool,
            data_pool,
            shared_pages,
            active: None,
        }
    }

    /// Build a fresh address space.
    ///
    /// Allocates a directory frame and a shared-table frame, populates
    /// the shared identity mapping, plants the recursive slot and marks
    /// every other directory slot deferred. An address space cannot
    /// exist without its directory, so pool exhaustion here is fatal to
    /// the caller.
    pub fn create_space(&mut self) -> Result<AddressSpace, VmError> {
        let directory = self
            .structure_pool
            .get_frames(1)
            .ok_or(VmError::StructurePoolExhausted)?;
        let shared = self
            .structure_pool
            .get_frames(1)
            .ok_or(VmError::StructurePoolExhausted)?;

        // Shared table: ascending identity mapping of the low region,
        // one entry per frame starting at physical 0.
        for index in 0..ENTRIES_PER_TABLE {
            let entry = if index < self.shared_pages {
                Entry::mapping(Frame::new(index as u32), SHARED_FLAGS)
            } else {
                Entry::deferred()
            };
            self.write_structure(shared, index, entry);
        }

        self.write_structure(directory, 0, Entry::mapping(shared, SHARED_FLAGS));
        for index in 1..RECURSIVE_SLOT {
            self.write_structure(directory, index, Entry::deferred());
        }
        self.write_structure(
            directory,
            RECURSIVE_SLOT,
            Entry::mapping(directory, RECURSIVE_FLAGS),
        );

        log::info!(
            "built address space: directory {}, shared table {} ({} pages)",
            directory,
            shared,
            self.shared_pages
        );
        Ok(AddressSpace::new(directory, shared, self.shared_pages))
    }

    /// Make `space` the one the hardware consults.
    ///
    /// Must precede the first [`Self::enable_translation`]; may be
    /// called again at any later point to switch address spaces. A fault
    /// arriving after a switch resolves against the new directory.
    pub fn activate(&mut self, space: &AddressSpace) {
        self.active = Some(space.directory());
        self.mmu.set_translation_base(space.directory());
        log::debug!("activated directory {}", space.directory());
    }

    /// Turn on page-table-based translation.
    ///
    /// Idempotent; intended to be called exactly once per boot, after
    /// the first [`Self::activate`].
    pub fn enable_translation(&mut self) -> Result<(), VmError> {
        if self.active.is_none() {
            return Err(VmError::NoActiveSpace);
        }

        self.mmu.enable_translation();
        log::info!("translation enabled");
        Ok(())
    }

    /// The directory currently registered as active.
    #[inline]
    pub fn active_directory(&self) -> Option<Frame> {
        self.active
    }

    /// Free frames remaining in (structure pool, data pool).
    pub fn free_frame_counts(&self) -> (usize, usize) {
        (self.structure_pool.free_frames(), self.data_pool.free_frames())
    }

    /// Resolve a page fault at `addr`.
    ///
    /// Runs once, synchronously, on the faulting execution context. On
    /// success a present mapping covers `addr` and the hardware can
    /// re-execute the faulting instruction. Every error is fatal at the
    /// trap boundary; the typed split exists for a future swapping layer
    /// (see [`VmError`]).
    pub fn handle_fault(
        &mut self,
        addr: VirtAddr,
        code: FaultCode,
    ) -> Result<FaultResolution, VmError> {
        log::trace!("page fault at {} (code {:?})", addr, code);

        // A present entry denied the access: never retried, never
        // resolved by allocation.
        if code.contains(FaultCode::PROTECTION) {
            return Err(VmError::ProtectionViolation);
        }

        let directory = self.active.ok_or(VmError::NoActiveSpace)?;
        if !self.mmu.translation_enabled() || self.mmu.translation_base() != directory {
            // Registry and hardware disagree about which directory is
            // live; resolving the fault against either would corrupt
            // one of them.
            return Err(VmError::InconsistentState);
        }

        if addr.in_table_window() {
            // Absent translation inside the table window: ordinary
            // allocation must never write through the recursive slot.
            return Err(VmError::InconsistentState);
        }
        let dir_index = addr.directory_index();
        let table_index = addr.table_index();

        let pde_at = VirtAddr::directory_entry(dir_index);
        let pde = Entry::from_bits(self.mmu.read_word(pde_at));
        let mut new_table = None;
        if !pde.is_present() {
            let table = self
                .structure_pool
                .get_frames(1)
                .ok_or(VmError::StructurePoolExhausted)?;
            // Fill the table before the directory entry exposes it; a
            // present entry must never reference garbage.
            for index in 0..ENTRIES_PER_TABLE {
                self.write_structure(table, index, Entry::deferred());
            }
            self.mmu
                .write_word(pde_at, Entry::mapping(table, DEMAND_FLAGS).bits());
            new_table = Some(table);
        }

        let pte_at = VirtAddr::table_entry(dir_index, table_index);
        let pte = Entry::from_bits(self.mmu.read_word(pte_at));
        if pte.is_present() {
            // The error code said no translation existed. A present
            // entry here means the hardware and the tables disagree.
            return Err(VmError::InconsistentState);
        }

        let page = self
            .data_pool
            .get_frames(1)
            .ok_or(VmError::DataPoolExhausted)?;
        self.mmu
            .write_word(pte_at, Entry::mapping(page, DEMAND_FLAGS).bits());
        self.wipe_page(addr.page_base());

        log::debug!("demand-mapped {} to frame {}", addr.page_base(), page);
        Ok(FaultResolution { new_table, page })
    }

    /// Release the data frame backing the page containing `addr`.
    ///
    /// Clears the table entry back to the deferred sentinel, flushes the
    /// cached translation and returns the frame to the data pool. The
    /// shared identity region and the table window are refused: the
    /// frames behind them are not data-pool property.
    pub fn free_page(&mut self, addr: VirtAddr) -> Result<Frame, VmError> {
        let directory = self.active.ok_or(VmError::NoActiveSpace)?;
        if !self.mmu.translation_enabled() || self.mmu.translation_base() != directory {
            return Err(VmError::InconsistentState);
        }

        if addr.in_table_window() {
            return Err(VmError::ProtectionViolation);
        }
        if ((addr.as_u32() >> PAGE_SHIFT) as usize) < self.shared_pages {
            return Err(VmError::ProtectionViolation);
        }
        let dir_index = addr.directory_index();

        let pde = Entry::from_bits(self.mmu.read_word(VirtAddr::directory_entry(dir_index)));
        if !pde.is_present() {
            return Err(VmError::NotMapped);
        }

        let pte_at = VirtAddr::table_entry(dir_index, addr.table_index());
        let pte = Entry::from_bits(self.mmu.read_word(pte_at));
        if !pte.is_present() {
            return Err(VmError::NotMapped);
        }

        let frame = pte.frame();
        self.mmu.write_word(pte_at, Entry::deferred().bits());
        self.mmu.flush(addr.page_base());
        self.data_pool.release_frames(frame, 1);

        log::debug!("freed page {} (frame {})", addr.page_base(), frame);
        Ok(frame)
    }

    /// Write entry `index` of the structure held by `frame`, through the
    /// frame's identity address.
    ///
    /// Valid for structure-pool frames only: they live inside the shared
    /// region, which every address space identity-maps, so the write
    /// lands whether or not translation is enabled yet.
    fn write_structure(&mut self, frame: Frame, index: usize, entry: Entry) {
        let at = VirtAddr::new(frame.base().as_u32() + (index as u32) * 4);
        self.mmu.write_word(at, entry.bits());
    }

    /// Zero a freshly mapped page through its new mapping.
    fn wipe_page(&mut self, page: VirtAddr) {
        for word in 0..(PAGE_SIZE / 4) {
            self.mmu.write_word(page.add(word * 4), 0);
        }
    }
}
