//! Kernel Heap Allocator
//!
//! Uses `linked_list_allocator` for heap management. The heap backs the
//! small dynamic structures of the core (region tables, the scheduler's
//! ready queue); page-sized memory never comes from here.
//!
//! The region is a static array rather than a linker symbol so the heap
//! works before any memory map has been parsed.

use core::alloc::Layout;
use linked_list_allocator::LockedHeap;

/// Global heap allocator instance
#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Heap size (64 KiB, conservative)
const HEAP_SIZE: usize = 64 * 1024;

/// Static heap memory region
static mut HEAP_MEMORY: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

/// Initialize the kernel heap.
///
/// Must be called exactly once during kernel initialization, before any
/// heap allocation is made.
pub fn init_heap() {
    // SAFETY:
    // - HEAP_MEMORY is a valid static array
    // - This function is only called once during boot
    // - No other code accesses HEAP_MEMORY directly
    unsafe {
        let heap_start = (&raw mut HEAP_MEMORY).cast::<u8>();
        ALLOCATOR.lock().init(heap_start, HEAP_SIZE);
    }
}

/// Get the size of the kernel heap.
pub fn heap_size() -> usize {
    HEAP_SIZE
}

/// Report an allocation failure.
///
/// Kept as a plain function the integrating kernel can call from its
/// allocation-error hook; the default stable hook panics on its own.
pub fn report_alloc_error(layout: Layout) -> ! {
    panic!(
        "heap allocation failed: size={}, align={}",
        layout.size(),
        layout.align()
    )
}
