//! Device drivers for OcelotOS
//!
//! - Serial console (COM1) with the `log` sink
//! - Blocking disk over the ATA PIO contract

pub mod disk;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod serial;
