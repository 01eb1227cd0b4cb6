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

//! Event-driven timing
//!
//! The [`TimingEventManager`] is both the monotonic virtual clock (in
//! microseconds) and the scheduler of one-shot timeouts on that clock.
//!
//! Devices register named events once and receive an [`EventHandle`]. Arming
//! an event sets its deadline; re-arming an already armed event replaces the
//! deadline, so a handle is never pending twice. The simulation loop pulls due
//! events one at a time with [`TimingEventManager::next_due`], which advances
//! the clock to the event's deadline before handing it out. A callback that
//! re-arms its own event from inside the dispatch therefore sees the clock at
//! exactly its firing time.
//!
//! ```text
//!   register_event("tick") ──► handle (inactive)
//!   schedule(handle, 8)    ──► deadline = now + 8
//!   next_due(until)        ──► now = deadline, handle inactive, returned
//!   deactivate(handle)     ──► inactive, never returned
//! ```

/// Virtual time in microseconds
pub type TickCount = u64;

/// Handle to a registered timing event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(usize);

impl EventHandle {
    /// Registration index of this event
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Monotonic virtual clock
pub trait VirtualClock {
    /// Current virtual time in microseconds
    fn now_us(&self) -> TickCount;
}

#[derive(Debug)]
struct TimingEvent {
    name: String,
    deadline: Option<TickCount>,
}

/// Virtual clock and timeout scheduler
///
/// # Example
///
/// ```
/// use bcm2835_timer::core::timing::TimingEventManager;
///
/// let mut timing = TimingEventManager::with_start_time(1000);
/// let tick = timing.register_event("tick");
/// timing.schedule(tick, 8);
///
/// assert_eq!(timing.next_due(1004), None);
/// assert_eq!(timing.next_due(1010), Some(tick));
/// assert_eq!(timing.now_us(), 1008);
/// ```
#[derive(Debug, Default)]
pub struct TimingEventManager {
    events: Vec<TimingEvent>,
    now: TickCount,
}

impl TimingEventManager {
    /// Create a timing manager with the clock at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a timing manager with the clock at `start_us`
    pub fn with_start_time(start_us: TickCount) -> Self {
        Self {
            events: Vec::new(),
            now: start_us,
        }
    }

    /// Current virtual time in microseconds
    #[inline(always)]
    pub fn now_us(&self) -> TickCount {
        self.now
    }

    /// Register a new (inactive) event
    ///
    /// # Arguments
    ///
    /// * `name` - Human-readable name used in logs
    pub fn register_event(&mut self, name: &str) -> EventHandle {
        let handle = EventHandle(self.events.len());
        self.events.push(TimingEvent {
            name: name.to_string(),
            deadline: None,
        });
        log::debug!("Timing: Registered event '{}' ({:?})", name, handle);
        handle
    }

    /// Arm `handle` to fire `delay_us` microseconds from now
    pub fn schedule(&mut self, handle: EventHandle, delay_us: TickCount) {
        let deadline = self.now.saturating_add(delay_us);
        self.schedule_at(handle, deadline);
    }

    /// Arm `handle` to fire at the absolute time `deadline_us`
    ///
    /// Replaces any deadline the event already had. A deadline in the past
    /// fires on the next call to [`next_due`](Self::next_due) without moving
    /// the clock backwards.
    pub fn schedule_at(&mut self, handle: EventHandle, deadline_us: TickCount) {
        match self.events.get_mut(handle.0) {
            Some(event) => {
                event.deadline = Some(deadline_us);
                log::trace!("Timing: '{}' armed for t={}us", event.name, deadline_us);
            }
            None => log::warn!("Timing: schedule of unknown event {:?}", handle),
        }
    }

    /// Cancel a pending event; no-op if it is not armed
    pub fn deactivate(&mut self, handle: EventHandle) {
        if let Some(event) = self.events.get_mut(handle.0) {
            if event.deadline.take().is_some() {
                log::trace!("Timing: '{}' cancelled", event.name);
            }
        }
    }

    /// Whether `handle` is currently armed
    pub fn is_active(&self, handle: EventHandle) -> bool {
        self.deadline(handle).is_some()
    }

    /// Deadline of `handle`, if armed
    pub fn deadline(&self, handle: EventHandle) -> Option<TickCount> {
        self.events.get(handle.0).and_then(|event| event.deadline)
    }

    /// Name given to `handle` at registration
    pub fn event_name(&self, handle: EventHandle) -> Option<&str> {
        self.events.get(handle.0).map(|event| event.name.as_str())
    }

    /// Number of armed events
    pub fn pending_count(&self) -> usize {
        self.events.iter().filter(|e| e.deadline.is_some()).count()
    }

    /// Earliest deadline among armed events
    pub fn next_deadline(&self) -> Option<TickCount> {
        self.events.iter().filter_map(|e| e.deadline).min()
    }

    /// Pop the earliest armed event whose deadline is at or before `until_us`
    ///
    /// The clock advances to the event's deadline (never backwards) and the
    /// event is disarmed before it is returned. Events sharing a deadline are
    /// returned in registration order.
    pub fn next_due(&mut self, until_us: TickCount) -> Option<EventHandle> {
        let (index, deadline) = self
            .events
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.deadline.map(|d| (i, d)))
            .filter(|&(_, d)| d <= until_us)
            .min_by_key(|&(i, d)| (d, i))?;

        self.events[index].deadline = None;
        self.now = self.now.max(deadline);
        Some(EventHandle(index))
    }

    /// Move the clock forward to `time_us` without firing anything
    ///
    /// Callers drain [`next_due`](Self::next_due) first; moving past armed
    /// deadlines leaves them overdue.
    pub fn advance_to(&mut self, time_us: TickCount) {
        self.now = self.now.max(time_us);
    }
}

impl VirtualClock for TimingEventManager {
    fn now_us(&self) -> TickCount {
        self.now
    }
}
