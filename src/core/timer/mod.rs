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

//! BCM2835 System Timer
//!
//! The System Timer is a 64-bit free-running microsecond counter with four
//! 32-bit compare channels. See [`registers`] for the register layout.
//!
//! ## Counter Model
//!
//! The counter is derived from the virtual clock rather than incremented:
//! every tick stores the clock reading (in microseconds) into CHI:CLO. The
//! device re-arms its tick event [`DEFAULT_TICK_INTERVAL_US`] after each
//! firing so the guest-visible counter never lags the clock by more than one
//! interval. Register reads return the value captured by the last tick; they
//! never refresh the counter themselves. A tick whose successor would fall
//! past `u64::MAX` leaves the timer quiescent.
//!
//! ```text
//!   register_events ──► tick ──► Armed ──(event fires)──► tick ──► Armed ...
//!                                  │
//!                              teardown
//!                                  ▼
//!                              Quiescent
//! ```
//!
//! ## Compare Channels
//!
//! Match detection is not emulated. The evaluator runs once per tick but
//! performs no comparison, raises no interrupt and leaves CS untouched; the
//! match width, edge/level behavior and acknowledge protocol are unspecified.
//!
//! ## References
//!
//! - BCM2835 ARM Peripherals, chapter 12 "System Timer"

pub mod registers;


use serde::{Deserialize, Serialize};

use crate::core::error::{Access, GuestError, Result};
use crate::core::interrupt::IrqLine;
use crate::core::memory::IODevice;
use crate::core::snapshot::{
    self, SnapshotSection, Snapshottable, StateDescription,
};
use crate::core::system::Device;
use crate::core::timing::{EventHandle, TimingEventManager};

pub use registers::{ControlStatus, Register, TimerRegisters};

/// Device type name used for registration and snapshots
pub const TYPE_BCM2835_TIMER: &str = "bcm2835-timer";

/// Interval between counter refreshes in microseconds
pub const DEFAULT_TICK_INTERVAL_US: u64 = 8;

static VMSTATE_BCM2835_TIMER: StateDescription = StateDescription {
    name: TYPE_BCM2835_TIMER,
    version_id: 1,
    minimum_version_id: 1,
    fields: &[
        "control",
        "counter_lo",
        "counter_hi",
        "cmp0",
        "cmp1",
        "cmp2",
        "cmp3",
    ],
};

/// Persisted register state, in snapshot field order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub control: u32,
    pub counter_lo: u32,
    pub counter_hi: u32,
    pub cmp0: u32,
    pub cmp1: u32,
    pub cmp2: u32,
    pub cmp3: u32,
}

/// Ticker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickerState {
    /// Nothing scheduled; the counter is frozen
    Quiescent,
    /// A refresh is scheduled on this event
    Armed(EventHandle),
}

/// Guest error counts by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuestErrorCounts {
    pub bad_offset: u64,
    pub read_only: u64,
}

/// BCM2835 System Timer device
///
/// # Example
///
/// ```
/// use bcm2835_timer::core::memory::IODevice;
/// use bcm2835_timer::core::timer::{registers, SystemTimer};
/// use bcm2835_timer::core::timing::TimingEventManager;
///
/// let mut timing = TimingEventManager::with_start_time(1000);
/// let mut timer = SystemTimer::new();
/// timer.register_events(&mut timing);
///
/// assert_eq!(timer.read(registers::TIMER_CLO, 4), 1000);
/// assert_eq!(timer.read(registers::TIMER_CHI, 4), 0);
/// assert!(timer.is_armed());
/// ```
pub struct SystemTimer {
    /// Guest-visible registers
    regs: TimerRegisters,

    /// Ticker state
    ticker: TickerState,

    /// Tick event, registered on first use and reused after teardown
    tick_event: Option<EventHandle>,

    /// Microseconds between refreshes
    tick_interval_us: u64,

    /// Interrupt output (not owned)
    irq: Option<Box<dyn IrqLine>>,

    /// Refresh cycles run since creation
    tick_count: u64,

    /// Most recent guest error
    last_guest_error: Option<GuestError>,

    /// Guest errors by kind
    guest_errors: GuestErrorCounts,
}

impl SystemTimer {
    /// Create a timer with all registers zeroed and nothing scheduled
    pub fn new() -> Self {
        Self::with_tick_interval(DEFAULT_TICK_INTERVAL_US)
    }

    /// Create a timer refreshing every `tick_interval_us` microseconds
    ///
    /// An interval of 0 is raised to 1 so the ticker always makes progress.
    pub fn with_tick_interval(tick_interval_us: u64) -> Self {
        Self {
            regs: TimerRegisters::default(),
            ticker: TickerState::Quiescent,
            tick_event: None,
            tick_interval_us: tick_interval_us.max(1),
            irq: None,
            tick_count: 0,
            last_guest_error: None,
            guest_errors: GuestErrorCounts::default(),
        }
    }

    /// Attach the interrupt output
    pub fn connect_irq(&mut self, irq: Box<dyn IrqLine>) {
        self.irq = Some(irq);
    }

    /// Register the tick event and run the first refresh
    ///
    /// Runs one refresh/evaluate cycle immediately and leaves exactly one tick
    /// scheduled. Calling this on an armed timer does nothing.
    ///
    /// # Arguments
    ///
    /// * `timing` - Timing event manager
    pub fn register_events(&mut self, timing: &mut TimingEventManager) {
        if let TickerState::Armed(_) = self.ticker {
            log::warn!("{}: already armed", TYPE_BCM2835_TIMER);
            return;
        }

        let handle = *self
            .tick_event
            .get_or_insert_with(|| timing.register_event("BCM2835 Timer Tick"));

        self.tick(handle, timing);

        if self.is_armed() {
            log::debug!(
                "{}: armed at t={}us (interval {}us)",
                TYPE_BCM2835_TIMER,
                timing.now_us(),
                self.tick_interval_us
            );
        }
    }

    /// Process timing events
    ///
    /// This should be called by System when timing events fire.
    ///
    /// # Arguments
    ///
    /// * `timing` - Timing event manager
    /// * `triggered_events` - List of event handles that have fired
    pub fn process_events(
        &mut self,
        timing: &mut TimingEventManager,
        triggered_events: &[EventHandle],
    ) {
        if let TickerState::Armed(handle) = self.ticker {
            if triggered_events.contains(&handle) {
                self.tick(handle, timing);
            }
        }
    }

    /// Cancel the pending tick
    ///
    /// The counter stops at its last value; no refresh happens until
    /// [`register_events`](Self::register_events) is called again.
    pub fn teardown(&mut self, timing: &mut TimingEventManager) {
        if let TickerState::Armed(handle) = self.ticker {
            timing.deactivate(handle);
            self.ticker = TickerState::Quiescent;
            log::debug!("{}: quiescent at t={}us", TYPE_BCM2835_TIMER, timing.now_us());
        }
    }

    /// Refresh the counter, evaluate comparators and re-arm
    ///
    /// Every firing schedules exactly one successor at `now + interval`.
    /// When that deadline is past the end of the clock the ticker goes
    /// quiescent instead and the counter keeps its final value.
    fn tick(&mut self, handle: EventHandle, timing: &mut TimingEventManager) {
        let now = timing.now_us();

        self.regs.refresh(now);
        self.evaluate_comparators();
        self.tick_count += 1;

        match now.checked_add(self.tick_interval_us) {
            Some(deadline) => {
                timing.schedule_at(handle, deadline);
                self.ticker = TickerState::Armed(handle);
            }
            None => {
                timing.deactivate(handle);
                self.ticker = TickerState::Quiescent;
                log::warn!(
                    "{}: clock exhausted at t={}us, counter stopped",
                    TYPE_BCM2835_TIMER,
                    now
                );
            }
        }
    }

    /// Compare/interrupt evaluation hook
    ///
    /// Runs once per tick after the counter refresh. Match semantics are not
    /// emulated: no comparison is made, the interrupt output is never driven
    /// and the CS match flags are never updated.
    fn evaluate_comparators(&mut self) {
        // TODO: raise `irq` on CLO == Cn once CS match/acknowledge behavior is pinned down
    }

    /// 64-bit counter as of the last tick
    pub fn counter(&self) -> u64 {
        self.regs.counter()
    }

    /// Raw CS register
    pub fn control(&self) -> u32 {
        self.regs.control
    }

    /// CS register decoded as match flags
    pub fn control_status(&self) -> ControlStatus {
        ControlStatus::from_bits_retain(self.regs.control)
    }

    /// Compare registers C0-C3
    pub fn comparators(&self) -> [u32; registers::NUM_COMPARATORS] {
        self.regs.compare
    }

    /// Guest-visible registers
    pub fn registers(&self) -> &TimerRegisters {
        &self.regs
    }

    /// Whether a tick is scheduled
    pub fn is_armed(&self) -> bool {
        matches!(self.ticker, TickerState::Armed(_))
    }

    /// Handle of the tick event, once registered
    pub fn tick_event(&self) -> Option<EventHandle> {
        self.tick_event
    }

    /// Microseconds between refreshes
    pub fn tick_interval_us(&self) -> u64 {
        self.tick_interval_us
    }

    /// Refresh cycles run so far
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Whether an interrupt output is attached
    pub fn has_irq(&self) -> bool {
        self.irq.is_some()
    }

    /// Most recent guest error
    pub fn last_guest_error(&self) -> Option<GuestError> {
        self.last_guest_error
    }

    /// Guest errors observed so far
    pub fn guest_error_counts(&self) -> GuestErrorCounts {
        self.guest_errors
    }

    fn read_register(&self, offset: u64) -> std::result::Result<u32, GuestError> {
        Register::decode(offset)
            .map(|reg| self.regs.get(reg))
            .ok_or(GuestError::BadOffset {
                offset,
                access: Access::Read,
            })
    }

    fn write_register(&mut self, offset: u64, value: u32) -> std::result::Result<(), GuestError> {
        match Register::decode(offset) {
            Some(Register::ControlStatus) => self.regs.control = value,
            Some(Register::Compare(n)) => self.regs.compare[n] = value,
            Some(Register::CounterLow | Register::CounterHigh) => {
                return Err(GuestError::ReadOnlyViolation { offset });
            }
            None => {
                return Err(GuestError::BadOffset {
                    offset,
                    access: Access::Write,
                });
            }
        }
        Ok(())
    }

    fn record_guest_error(&mut self, err: GuestError) {
        err.report(TYPE_BCM2835_TIMER);
        match err {
            GuestError::BadOffset { .. } => self.guest_errors.bad_offset += 1,
            GuestError::ReadOnlyViolation { .. } => self.guest_errors.read_only += 1,
        }
        self.last_guest_error = Some(err);
    }
}

impl Default for SystemTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl IODevice for SystemTimer {
    fn size(&self) -> u64 {
        registers::REGISTER_WINDOW_SIZE
    }

    fn read(&mut self, offset: u64, _size: u32) -> u64 {
        match self.read_register(offset) {
            Ok(value) => {
                log::trace!("{}: read 0x{:02x} -> 0x{:08x}", TYPE_BCM2835_TIMER, offset, value);
                value as u64
            }
            Err(err) => {
                self.record_guest_error(err);
                0
            }
        }
    }

    fn write(&mut self, offset: u64, _size: u32, value: u64) {
        let value = value as u32;
        log::trace!("{}: write 0x{:02x} <- 0x{:08x}", TYPE_BCM2835_TIMER, offset, value);

        if let Err(err) = self.write_register(offset, value) {
            self.record_guest_error(err);
        }
    }

    fn name(&self) -> &str {
        TYPE_BCM2835_TIMER
    }
}

impl Snapshottable for SystemTimer {
    type State = TimerState;

    fn description(&self) -> &'static StateDescription {
        &VMSTATE_BCM2835_TIMER
    }

    fn pre_save(&mut self) {
        // Nothing derived to flush; fields are saved as they are
    }

    fn capture(&self) -> TimerState {
        let [cmp0, cmp1, cmp2, cmp3] = self.regs.compare;
        TimerState {
            control: self.regs.control,
            counter_lo: self.regs.counter_lo,
            counter_hi: self.regs.counter_hi,
            cmp0,
            cmp1,
            cmp2,
            cmp3,
        }
    }

    fn restore(&mut self, state: TimerState) {
        self.regs = TimerRegisters {
            control: state.control,
            counter_lo: state.counter_lo,
            counter_hi: state.counter_hi,
            compare: [state.cmp0, state.cmp1, state.cmp2, state.cmp3],
        };
    }

    fn post_load(&mut self, _version_id: u32) -> Result<()> {
        // The restored counter is trusted until the next tick overwrites it
        Ok(())
    }
}

impl Device for SystemTimer {
    fn type_name(&self) -> &'static str {
        TYPE_BCM2835_TIMER
    }

    fn process_events(&mut self, timing: &mut TimingEventManager, triggered_events: &[EventHandle]) {
        SystemTimer::process_events(self, timing, triggered_events);
    }

    fn teardown(&mut self, timing: &mut TimingEventManager) {
        SystemTimer::teardown(self, timing);
    }

    fn save_state(&mut self) -> Result<SnapshotSection> {
        snapshot::save_section(self)
    }

    fn check_state(&self, section: &SnapshotSection) -> Result<()> {
        snapshot::decode_section(self, section).map(|_| ())
    }

    fn load_state(&mut self, section: &SnapshotSection) -> Result<()> {
        snapshot::load_section(self, section)
    }

    fn register_dump(&self) -> Vec<(&'static str, u32)> {
        Register::all()
            .into_iter()
            .map(|reg| (reg.name(), self.regs.get(reg)))
            .collect()
    }
}
