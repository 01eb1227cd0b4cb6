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

//! Device trait
//!
//! Everything the [`System`](super::System) needs from a device beyond
//! register access: event dispatch, teardown and save states.

use crate::core::error::Result;
use crate::core::memory::IODevice;
use crate::core::snapshot::SnapshotSection;
use crate::core::timing::{EventHandle, TimingEventManager};

/// A device instantiated through the [`DeviceRegistry`](super::DeviceRegistry)
pub trait Device: IODevice {
    /// Registered type name
    fn type_name(&self) -> &'static str;

    /// Handle fired timing events
    ///
    /// Called once per fired event; devices ignore handles they do not own.
    fn process_events(&mut self, timing: &mut TimingEventManager, triggered_events: &[EventHandle]);

    /// Cancel everything the device has scheduled
    fn teardown(&mut self, timing: &mut TimingEventManager);

    /// Encode the persisted state
    fn save_state(&mut self) -> Result<SnapshotSection>;

    /// Check that `section` would load, without applying it
    fn check_state(&self, section: &SnapshotSection) -> Result<()>;

    /// Restore the persisted state
    fn load_state(&mut self, section: &SnapshotSection) -> Result<()>;

    /// Register names and values, for debugging
    fn register_dump(&self) -> Vec<(&'static str, u32)> {
        Vec::new()
    }
}
