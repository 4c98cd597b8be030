//! Page-Fault Trap Binding
//!
//! Wires the virtual memory manager to the hardware trap dispatcher.
//! The manager context lives here behind a one-shot install, so the
//! trap entry has a single well-defined place to retrieve it — no bare
//! mutable globals.
//!
//! The contract at this boundary is all-or-nothing: the handler either
//! fully resolves the fault (the hardware then re-executes the faulting
//! instruction) or the kernel halts with a diagnostic trace. The typed
//! errors underneath exist so a future swapping layer can intercept
//! data-pool exhaustion before it reaches the halt.

use spin::{Mutex, Once};

use crate::arch::{self, X86Mmu};
use crate::mm::addr::Frame;
use crate::mm::paging::{FaultCode, VmError};
use crate::mm::pool::ContiguousFramePool;
use crate::mm::vmm::{AddressSpace, Vmm};

/// The concrete manager the kernel runs.
pub type KernelVmm = Vmm<X86Mmu, ContiguousFramePool>;

/// Boot memory map: the low 4 MiB is the shared direct-mapped region.
pub const SHARED_SIZE: u32 = 4 * 1024 * 1024;
/// Paging structures come from 2–4 MiB, inside the shared region.
const STRUCTURE_POOL_BASE: u32 = 512;
const STRUCTURE_POOL_FRAMES: usize = 512;
/// Process frames start at 4 MiB, outside the shared region.
const DATA_POOL_BASE: u32 = 1024;

static VMM: Once<Mutex<KernelVmm>> = Once::new();
static KERNEL_SPACE: Once<Mutex<AddressSpace>> = Once::new();

/// Bring up demand paging for a machine with `total_frames` frames of
/// physical memory.
///
/// Builds the kernel address space, activates it, enables translation
/// and installs the manager for the trap entry. Call once, after the
/// heap and console are up.
pub fn init(total_frames: usize) -> Result<&'static Mutex<KernelVmm>, VmError> {
    let structure_pool =
        ContiguousFramePool::new(Frame::new(STRUCTURE_POOL_BASE), STRUCTURE_POOL_FRAMES);
    let data_pool = ContiguousFramePool::new(
        Frame::new(DATA_POOL_BASE),
        total_frames.saturating_sub(DATA_POOL_BASE as usize),
    );

    let mut vmm = Vmm::new(X86Mmu, structure_pool, data_pool, SHARED_SIZE);
    let kernel_space = vmm.create_space()?;
    vmm.activate(&kernel_space);
    vmm.enable_translation()?;

    KERNEL_SPACE.call_once(|| Mutex::new(kernel_space));
    Ok(VMM.call_once(|| Mutex::new(vmm)))
}

/// The installed manager, if [`init`] has run.
pub fn vmm() -> Option<&'static Mutex<KernelVmm>> {
    VMM.get()
}

/// The kernel's own address space, if [`init`] has run.
pub fn kernel_space() -> Option<&'static Mutex<AddressSpace>> {
    KERNEL_SPACE.get()
}

/// Trap entry invoked by the dispatcher on every page fault.
///
/// `error_code` is the word the hardware pushed; the faulting address
/// comes from the fault address register.
#[no_mangle]
pub extern "C" fn page_fault_trap(error_code: u32) {
    let addr = arch::read_fault_address();

    let Some(context) = VMM.get() else {
        log::error!("page fault at {} before the memory manager was installed", addr);
        arch::halt();
    };

    let code = FaultCode::from_bits_truncate(error_code);
    match context.lock().handle_fault(addr, code) {
        Ok(resolution) => {
            // Returning resumes the faulting instruction, which now
            // finds a present mapping.
            log::trace!("fault at {} resolved with frame {}", addr, resolution.page);
        }
        Err(err) => {
            log::error!("unrecoverable page fault at {} (code {:#x}): {}", addr, error_code, err);
            arch::halt();
        }
    }
}
