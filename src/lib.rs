//! OcelotOS — Demand-Paged x86 Kernel Core
//!
//! The memory-management heart of a small IA-32 kernel: two-level
//! hardware page tables built and extended on demand, one page fault at
//! a time.
//!
//! # What lives here
//! - Typed paging structures: `PhysAddr`/`VirtAddr`/`Frame`, 32-bit
//!   entries with protection flags, the recursive-mapping window
//! - Two physical frame pools: one for paging structures, one for
//!   process pages
//! - The fault handler: classify, allocate directory backing, allocate
//!   data frame, or halt on a protection violation
//! - The bounded collaborators: cooperative scheduler, blocking disk,
//!   simple file system
//!
//! # Architecture
//! - Target: IA-32 (two-level paging, 1024-entry tables)
//! - Hardware access is confined to `arch` behind the `Mmu`, `DiskBus`
//!   and `Dispatcher` seams, so the policy code builds and tests on any
//!   host
//! - The integrating kernel binary supplies boot, trap dispatch wiring
//!   and the panic handler

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod arch;
pub mod drivers;
pub mod fs;
pub mod mm;
pub mod sched;
#[cfg(target_arch = "x86")]
pub mod trap;
