// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Interrupt sink
//!
//! Devices drive a single output line through the [`IrqLine`] trait. The
//! surrounding system owns the [`InterruptController`] that collects those
//! lines; a device only holds an [`InterruptLine`], which refers to the
//! controller weakly and so never keeps it alive.
//!
//! ## Controller Model
//!
//! The controller is level-sensitive with 32 input lines:
//!
//! - **status**: bit `n` is set while line `n` is raised
//! - **mask**: bit `n` enables line `n` to reach the CPU
//!
//! A line stays asserted until its source lowers it; there is no
//! acknowledge-by-write.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::core::error::{EmulatorError, Result};

/// Well-known line numbers
///
/// The BCM2835 routes the four System Timer match outputs to GPU interrupt
/// lines 0-3.
pub mod lines {
    /// System Timer match 0 (GPU IRQ 0)
    pub const SYSTIMER_M0: u32 = 0;

    /// System Timer match 1 (GPU IRQ 1)
    pub const SYSTIMER_M1: u32 = 1;

    /// System Timer match 2 (GPU IRQ 2)
    pub const SYSTIMER_M2: u32 = 2;

    /// System Timer match 3 (GPU IRQ 3)
    pub const SYSTIMER_M3: u32 = 3;
}

/// Number of input lines on the controller
pub const NUM_LINES: u32 = 32;

/// A single interrupt output driven by a device
pub trait IrqLine {
    /// Assert the line
    fn raise(&self);

    /// Deassert the line
    fn lower(&self);

    /// Current level of the line
    fn is_raised(&self) -> bool;

    /// Drive the line to `level`
    fn set_level(&self, level: bool) {
        if level {
            self.raise();
        } else {
            self.lower();
        }
    }
}

/// Level-sensitive interrupt controller
///
/// # Example
///
/// ```
/// use bcm2835_timer::core::interrupt::{lines, InterruptController};
///
/// let mut ic = InterruptController::new();
/// ic.raise(lines::SYSTIMER_M1);
/// assert!(!ic.is_pending());
///
/// ic.write_mask(1 << lines::SYSTIMER_M1);
/// assert!(ic.is_pending());
///
/// ic.lower(lines::SYSTIMER_M1);
/// assert!(!ic.is_pending());
/// ```
#[derive(Debug, Default)]
pub struct InterruptController {
    /// Level of each input line
    status: u32,

    /// Lines enabled to reach the CPU
    mask: u32,
}

impl InterruptController {
    /// Create a controller with all lines low and masked
    pub fn new() -> Self {
        Self { status: 0, mask: 0 }
    }

    /// Assert `line`; out-of-range lines are ignored
    pub fn raise(&mut self, line: u32) {
        if line >= NUM_LINES {
            log::warn!("IRQ raise on invalid line {}", line);
            return;
        }
        self.status |= 1 << line;
        log::trace!("IRQ {} raised, status=0x{:08X}", line, self.status);
    }

    /// Deassert `line`; out-of-range lines are ignored
    pub fn lower(&mut self, line: u32) {
        if line >= NUM_LINES {
            log::warn!("IRQ lower on invalid line {}", line);
            return;
        }
        self.status &= !(1 << line);
        log::trace!("IRQ {} lowered, status=0x{:08X}", line, self.status);
    }

    /// Level of `line`
    pub fn is_raised(&self, line: u32) -> bool {
        line < NUM_LINES && self.status & (1 << line) != 0
    }

    /// Whether any unmasked line is raised
    pub fn is_pending(&self) -> bool {
        (self.status & self.mask) != 0
    }

    /// Raw line levels
    pub fn read_status(&self) -> u32 {
        self.status
    }

    /// Current mask
    pub fn read_mask(&self) -> u32 {
        self.mask
    }

    /// Replace the mask
    pub fn write_mask(&mut self, value: u32) {
        self.mask = value;
        log::debug!("IRQ mask set: 0x{:08X}", self.mask);
    }
}

/// Device-side handle to one controller line
///
/// Holds the controller weakly: once the owning system drops the controller,
/// every operation on the line becomes a no-op and the line reads as low.
#[derive(Debug, Clone)]
pub struct InterruptLine {
    controller: Weak<RefCell<InterruptController>>,
    line: u32,
}

impl InterruptLine {
    /// Connect to `line` of `controller`
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::InvalidIrqLine`] if `line` is out of range.
    pub fn connect(controller: &Rc<RefCell<InterruptController>>, line: u32) -> Result<Self> {
        if line >= NUM_LINES {
            return Err(EmulatorError::InvalidIrqLine { line });
        }
        Ok(Self {
            controller: Rc::downgrade(controller),
            line,
        })
    }

    /// Controller line number
    pub fn line(&self) -> u32 {
        self.line
    }
}

impl IrqLine for InterruptLine {
    fn raise(&self) {
        if let Some(ic) = self.controller.upgrade() {
            ic.borrow_mut().raise(self.line);
        }
    }

    fn lower(&self) {
        if let Some(ic) = self.controller.upgrade() {
            ic.borrow_mut().lower(self.line);
        }
    }

    fn is_raised(&self) -> bool {
        self.controller
            .upgrade()
            .is_some_and(|ic| ic.borrow().is_raised(self.line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_initializes_to_zero() {
        let ic = InterruptController::new();
        assert_eq!(ic.read_status(), 0, "Status should be 0 on initialization");
        assert_eq!(ic.read_mask(), 0, "Mask should be 0 on initialization");
        assert!(!ic.is_pending(), "No interrupts should be pending");
    }

    #[test]
    fn test_raise_and_lower() {
        let mut ic = InterruptController::new();

        ic.raise(lines::SYSTIMER_M0);
        ic.raise(lines::SYSTIMER_M3);
        assert_eq!(ic.read_status(), 0b1001);

        ic.lower(lines::SYSTIMER_M0);
        assert_eq!(ic.read_status(), 0b1000);
        assert!(ic.is_raised(lines::SYSTIMER_M3));
        assert!(!ic.is_raised(lines::SYSTIMER_M0));
    }

    #[test]
    fn test_mask_gates_pending() {
        let mut ic = InterruptController::new();
        ic.raise(lines::SYSTIMER_M2);
        assert!(!ic.is_pending());

        ic.write_mask(1 << lines::SYSTIMER_M2);
        assert!(ic.is_pending());

        ic.write_mask(1 << lines::SYSTIMER_M1);
        assert!(!ic.is_pending());
    }

    #[test]
    fn test_invalid_line_ignored() {
        let mut ic = InterruptController::new();
        ic.raise(NUM_LINES);
        ic.lower(NUM_LINES + 5);
        assert_eq!(ic.read_status(), 0);
        assert!(!ic.is_raised(NUM_LINES));
    }

    #[test]
    fn test_interrupt_line_drives_controller() {
        let ic = Rc::new(RefCell::new(InterruptController::new()));
        let line = InterruptLine::connect(&ic, lines::SYSTIMER_M1).unwrap();

        line.raise();
        assert!(line.is_raised());
        assert_eq!(ic.borrow().read_status(), 1 << lines::SYSTIMER_M1);

        line.set_level(false);
        assert!(!line.is_raised());
        assert_eq!(ic.borrow().read_status(), 0);
    }

    #[test]
    fn test_interrupt_line_rejects_out_of_range() {
        let ic = Rc::new(RefCell::new(InterruptController::new()));
        let err = InterruptLine::connect(&ic, NUM_LINES).unwrap_err();
        assert!(matches!(err, EmulatorError::InvalidIrqLine { line } if line == NUM_LINES));
    }

    #[test]
    fn test_interrupt_line_does_not_keep_controller_alive() {
        let ic = Rc::new(RefCell::new(InterruptController::new()));
        let line = InterruptLine::connect(&ic, 7).unwrap();
        drop(ic);

        // No-ops once the controller is gone
        line.raise();
        assert!(!line.is_raised());
    }
}
