//! Memory management for OcelotOS
//!
//! Provides:
//! - Address decomposition and the recursive-mapping window (`addr`)
//! - Directory/table entry encoding and the hardware seam (`paging`)
//! - Physical frame pools (`pool`)
//! - The demand-paging virtual memory manager (`vmm`)
//! - Per-address-space region bookkeeping (`region`)
//! - Kernel heap allocation (`allocator`)

pub mod addr;
pub mod paging;
pub mod pool;
pub mod region;
pub mod vmm;

#[cfg(not(test))]
pub mod allocator;

#[cfg(test)]
pub(crate) mod sim;

pub use addr::{Frame, PhysAddr, VirtAddr};
pub use paging::{Entry, EntryFlags, FaultCode, Mmu, VmError};
pub use pool::{ContiguousFramePool, FramePool};
pub use region::Region;
pub use vmm::{AddressSpace, FaultResolution, Vmm};
