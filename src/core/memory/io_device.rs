// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut

//! I/O Device Trait
//!
//! This module defines the trait-based abstraction for memory-mapped I/O
//! devices. The surrounding monitor decodes guest physical addresses and
//! hands each device only an offset into its own register window; the
//! device never sees absolute addresses.
//!
//! # Access Model
//!
//! ```text
//!   guest access @ base + offset
//!            │
//!            ▼
//!   ┌──────────────────────────┐
//!   │ device.read(offset, size)│──► value (u64)
//!   │ device.write(offset,     │
//!   │              size, value)│
//!   └──────────────────────────┘
//! ```
//!
//! Guest mistakes (bad offset, read-only register) are not errors of the
//! monitor: a device logs them, reads back 0 and drops writes. That is why
//! `read`/`write` return plain values rather than `Result`.
//!
//! # Example
//!
//! ```
//! use bcm2835_timer::core::memory::IODevice;
//!
//! struct Scratch {
//!     registers: [u32; 4],
//! }
//!
//! impl IODevice for Scratch {
//!     fn size(&self) -> u64 {
//!         0x10
//!     }
//!
//!     fn read(&mut self, offset: u64, _size: u32) -> u64 {
//!         let index = (offset / 4) as usize;
//!         self.registers.get(index).copied().unwrap_or(0) as u64
//!     }
//!
//!     fn write(&mut self, offset: u64, _size: u32, value: u64) {
//!         if let Some(reg) = self.registers.get_mut((offset / 4) as usize) {
//!             *reg = value as u32;
//!         }
//!     }
//! }
//!
//! let mut dev = Scratch { registers: [0; 4] };
//! dev.write(0x08, 4, 0xABCD);
//! assert_eq!(dev.read(0x08, 4), 0xABCD);
//! ```

/// Trait for memory-mapped I/O devices
///
/// # Register Access
///
/// `size` is the guest access width in bytes (1, 2, 4 or 8). Devices with
/// fixed-width registers may accept it without reinterpreting the value.
///
/// # Thread Safety
///
/// Implementations do not need to be `Send` or `Sync`: all accesses are
/// serialized by the single-threaded simulation loop.
pub trait IODevice {
    /// Size of the register window in bytes
    fn size(&self) -> u64;

    /// Check if `offset` falls inside the register window
    fn contains(&self, offset: u64) -> bool {
        offset < self.size()
    }

    /// Read a register
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset from the device base address
    /// * `size` - Access width in bytes
    ///
    /// # Returns
    ///
    /// The register value, or 0 for offsets the device does not decode
    fn read(&mut self, offset: u64, size: u32) -> u64;

    /// Write a register
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset from the device base address
    /// * `size` - Access width in bytes
    /// * `value` - Value written by the guest
    fn write(&mut self, offset: u64, size: u32, value: u64);

    /// Device name for debugging
    fn name(&self) -> &str {
        "Unknown Device"
    }
}
