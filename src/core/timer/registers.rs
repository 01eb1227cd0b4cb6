// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut

//! System Timer register file
//!
//! ## Register Layout
//!
//! ```text
//! Offset | Name | Access | Description
//! -------|------|--------|------------------------------------------
//! 0x00   | CS   | R/W    | Control/status (match flags M0-M3)
//! 0x04   | CLO  | R      | Free-running counter, lower 32 bits
//! 0x08   | CHI  | R      | Free-running counter, upper 32 bits
//! 0x0C   | C0   | R/W    | Compare 0
//! 0x10   | C1   | R/W    | Compare 1
//! 0x14   | C2   | R/W    | Compare 2
//! 0x18   | C3   | R/W    | Compare 3
//! ```

use bitflags::bitflags;

/// Control/status register offset
pub const TIMER_CS: u64 = 0x00;
/// Counter lower 32 bits offset
pub const TIMER_CLO: u64 = 0x04;
/// Counter upper 32 bits offset
pub const TIMER_CHI: u64 = 0x08;
/// Compare 0 offset
pub const TIMER_C0: u64 = 0x0c;
/// Compare 1 offset
pub const TIMER_C1: u64 = 0x10;
/// Compare 2 offset
pub const TIMER_C2: u64 = 0x14;
/// Compare 3 offset
pub const TIMER_C3: u64 = 0x18;

/// Size of the register window in bytes
pub const REGISTER_WINDOW_SIZE: u64 = 0x20;

/// Number of compare channels
pub const NUM_COMPARATORS: usize = 4;

bitflags! {
    /// CS register match flags
    ///
    /// Hardware sets `Mn` when compare channel `n` matches. The emulated
    /// device stores CS verbatim and never sets or clears these bits itself.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlStatus: u32 {
        const M0 = 1 << 0;
        const M1 = 1 << 1;
        const M2 = 1 << 2;
        const M3 = 1 << 3;

        // Undefined bits written by the guest are kept
        const _ = !0;
    }
}

/// Decoded register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    ControlStatus,
    CounterLow,
    CounterHigh,
    /// Compare channel 0-3
    Compare(usize),
}

impl Register {
    /// Decode a window offset
    ///
    /// Returns `None` for offsets outside the eight defined registers,
    /// including unaligned offsets inside the window.
    pub fn decode(offset: u64) -> Option<Self> {
        match offset {
            TIMER_CS => Some(Register::ControlStatus),
            TIMER_CLO => Some(Register::CounterLow),
            TIMER_CHI => Some(Register::CounterHigh),
            TIMER_C0 => Some(Register::Compare(0)),
            TIMER_C1 => Some(Register::Compare(1)),
            TIMER_C2 => Some(Register::Compare(2)),
            TIMER_C3 => Some(Register::Compare(3)),
            _ => None,
        }
    }

    /// Window offset of this register
    pub fn offset(self) -> u64 {
        match self {
            Register::ControlStatus => TIMER_CS,
            Register::CounterLow => TIMER_CLO,
            Register::CounterHigh => TIMER_CHI,
            Register::Compare(n) => TIMER_C0 + 4 * n as u64,
        }
    }

    /// Guest-facing register name
    pub fn name(self) -> &'static str {
        match self {
            Register::ControlStatus => "CS",
            Register::CounterLow => "CLO",
            Register::CounterHigh => "CHI",
            Register::Compare(0) => "C0",
            Register::Compare(1) => "C1",
            Register::Compare(2) => "C2",
            Register::Compare(_) => "C3",
        }
    }

    /// Whether the guest may write this register
    pub fn is_writable(self) -> bool {
        !matches!(self, Register::CounterLow | Register::CounterHigh)
    }

    /// All registers in offset order
    pub fn all() -> [Register; 7] {
        [
            Register::ControlStatus,
            Register::CounterLow,
            Register::CounterHigh,
            Register::Compare(0),
            Register::Compare(1),
            Register::Compare(2),
            Register::Compare(3),
        ]
    }
}

/// Guest-visible register values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerRegisters {
    pub control: u32,
    pub counter_lo: u32,
    pub counter_hi: u32,
    pub compare: [u32; NUM_COMPARATORS],
}

impl TimerRegisters {
    /// Split a microsecond timestamp into the counter halves
    ///
    /// Idempotent: refreshing twice with the same timestamp leaves the same
    /// state.
    #[inline]
    pub fn refresh(&mut self, now_us: u64) {
        self.counter_lo = (now_us & 0xffff_ffff) as u32;
        self.counter_hi = (now_us >> 32) as u32;
    }

    /// 64-bit counter reconstructed from CHI:CLO
    #[inline]
    pub fn counter(&self) -> u64 {
        ((self.counter_hi as u64) << 32) | self.counter_lo as u64
    }

    /// Current value of `reg`
    pub fn get(&self, reg: Register) -> u32 {
        match reg {
            Register::ControlStatus => self.control,
            Register::CounterLow => self.counter_lo,
            Register::CounterHigh => self.counter_hi,
            Register::Compare(n) => self.compare[n],
        }
    }
}
