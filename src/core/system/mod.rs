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

//! System integration module
//!
//! The [`System`] is the host simulation loop: it owns the virtual clock, the
//! interrupt controller and every device, and serializes all register
//! accesses and event dispatch. Nothing here runs concurrently, so devices
//! need no locking.
//!
//! ## Event Dispatch
//!
//! [`System::run_until`] pulls due events from the timing manager one at a
//! time. Each fired handle is offered to every device before the next one is
//! pulled, so an event re-armed during dispatch is seen again within the same
//! run if its new deadline is still inside the target window.

mod device;
mod registry;

pub use device::Device;
pub use registry::{
    global, install_global, DeviceContext, DeviceFactory, DeviceRegistry, DeviceRegistryBuilder,
};

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::Config;
use crate::core::error::{EmulatorError, Result};
use crate::core::interrupt::{InterruptController, InterruptLine};
use crate::core::snapshot::MachineSnapshot;
use crate::core::timing::{TickCount, TimingEventManager};

/// Index of a device within a [`System`]
pub type DeviceId = usize;

/// Simulated machine
///
/// # Example
///
/// ```
/// use bcm2835_timer::config::Config;
/// use bcm2835_timer::core::system::System;
/// use bcm2835_timer::core::timer::{registers, TYPE_BCM2835_TIMER};
///
/// let mut config = Config::default();
/// config.simulation.start_time_us = 1000;
///
/// let mut system = System::new(config);
/// let timer = system.create_device(TYPE_BCM2835_TIMER, None).unwrap();
/// assert_eq!(system.read(timer, registers::TIMER_CLO, 4).unwrap(), 1000);
///
/// system.run_for(8);
/// assert_eq!(system.read(timer, registers::TIMER_CLO, 4).unwrap(), 1008);
/// ```
pub struct System {
    /// Emulator configuration
    config: Config,
    /// Device factories
    registry: &'static DeviceRegistry,
    /// Virtual clock and scheduler
    timing: TimingEventManager,
    /// Interrupt controller (shared weakly with devices)
    interrupt_controller: Rc<RefCell<InterruptController>>,
    /// Devices by id; removed devices leave a hole so ids stay stable
    devices: Vec<Option<Box<dyn Device>>>,
}

impl System {
    /// Create a system using the process-wide registry
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, global())
    }

    /// Create a system using a specific registry
    pub fn with_registry(config: Config, registry: &'static DeviceRegistry) -> Self {
        let timing = TimingEventManager::with_start_time(config.simulation.start_time_us);

        log::info!(
            "System: clock starts at t={}us, device types: {:?}",
            timing.now_us(),
            registry.type_names()
        );

        Self {
            config,
            registry,
            timing,
            interrupt_controller: Rc::new(RefCell::new(InterruptController::new())),
            devices: Vec::new(),
        }
    }

    /// Instantiate a registered device type
    ///
    /// # Arguments
    ///
    /// * `type_name` - Registered device type name
    /// * `irq_line` - Controller line the device drives, if any
    ///
    /// # Errors
    ///
    /// Fails for unknown types, out-of-range lines, or factory errors.
    pub fn create_device(&mut self, type_name: &str, irq_line: Option<u32>) -> Result<DeviceId> {
        let irq = irq_line
            .map(|line| InterruptLine::connect(&self.interrupt_controller, line))
            .transpose()?;

        let mut ctx = DeviceContext {
            timing: &mut self.timing,
            irq,
            config: &self.config,
        };
        let device = self.registry.create(type_name, &mut ctx)?;

        let id = self.devices.len();
        self.devices.push(Some(device));
        log::info!("System: created '{}' as device {}", type_name, id);
        Ok(id)
    }

    /// Tear down and drop a device
    ///
    /// Its id is not reused.
    pub fn remove_device(&mut self, id: DeviceId) -> Result<()> {
        let mut device = self
            .devices
            .get_mut(id)
            .and_then(Option::take)
            .ok_or(EmulatorError::UnknownDevice(id))?;
        device.teardown(&mut self.timing);
        log::info!("System: removed device {} ('{}')", id, device.type_name());
        Ok(())
    }

    /// Shared view of a device
    pub fn device(&self, id: DeviceId) -> Result<&dyn Device> {
        self.devices
            .get(id)
            .and_then(|slot| slot.as_deref())
            .ok_or(EmulatorError::UnknownDevice(id))
    }

    fn device_mut(&mut self, id: DeviceId) -> Result<&mut (dyn Device + 'static)> {
        self.devices
            .get_mut(id)
            .and_then(|slot| slot.as_deref_mut())
            .ok_or(EmulatorError::UnknownDevice(id))
    }

    /// Guest read from a device register
    pub fn read(&mut self, id: DeviceId, offset: u64, size: u32) -> Result<u64> {
        Ok(self.device_mut(id)?.read(offset, size))
    }

    /// Guest write to a device register
    pub fn write(&mut self, id: DeviceId, offset: u64, size: u32, value: u64) -> Result<()> {
        self.device_mut(id)?.write(offset, size, value);
        Ok(())
    }

    /// Run the simulation until the clock reaches `target_us`
    ///
    /// Returns the number of events dispatched. The clock never moves
    /// backwards; a target in the past dispatches only overdue events.
    pub fn run_until(&mut self, target_us: TickCount) -> u64 {
        let mut dispatched = 0;

        while let Some(handle) = self.timing.next_due(target_us) {
            for device in self.devices.iter_mut().flatten() {
                device.process_events(&mut self.timing, &[handle]);
            }
            dispatched += 1;
        }

        self.timing.advance_to(target_us);
        log::trace!(
            "System: t={}us after {} events",
            self.timing.now_us(),
            dispatched
        );
        dispatched
    }

    /// Run the simulation for `duration_us` microseconds
    pub fn run_for(&mut self, duration_us: TickCount) -> u64 {
        let target = self.timing.now_us().saturating_add(duration_us);
        self.run_until(target)
    }

    /// Current virtual time in microseconds
    pub fn now_us(&self) -> TickCount {
        self.timing.now_us()
    }

    /// Timing event manager
    pub fn timing(&self) -> &TimingEventManager {
        &self.timing
    }

    /// Interrupt controller
    pub fn interrupt_controller(&self) -> &Rc<RefCell<InterruptController>> {
        &self.interrupt_controller
    }

    /// Emulator configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ids of live devices
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.devices
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|_| id))
            .collect()
    }

    /// Capture every live device
    pub fn save_snapshot(&mut self) -> Result<MachineSnapshot> {
        let mut snapshot = MachineSnapshot::new(self.timing.now_us());
        for slot in self.devices.iter_mut() {
            let section = match slot {
                Some(device) => Some(device.save_state()?),
                None => None,
            };
            snapshot.devices.push(section);
        }

        log::info!(
            "System: snapshot at t={}us ({} device slots)",
            snapshot.clock_us,
            snapshot.devices.len()
        );
        Ok(snapshot)
    }

    /// Restore device state from a snapshot
    ///
    /// The snapshot must have been taken on a system with the same device
    /// layout. Nothing is modified unless every section is accepted.
    /// Device registers are restored verbatim and scheduled ticks are kept;
    /// the clock moves forward to the snapshot time if it is behind, and
    /// never backwards.
    pub fn restore_snapshot(&mut self, snapshot: &MachineSnapshot) -> Result<()> {
        if snapshot.devices.len() != self.devices.len() {
            return Err(EmulatorError::SnapshotLayout(format!(
                "snapshot has {} device slots, system has {}",
                snapshot.devices.len(),
                self.devices.len()
            )));
        }

        for (id, (slot, section)) in self.devices.iter().zip(&snapshot.devices).enumerate() {
            if slot.is_some() != section.is_some() {
                return Err(EmulatorError::SnapshotLayout(format!(
                    "device slot {} presence differs",
                    id
                )));
            }
        }

        // Every section must decode before any device is overwritten
        for (id, (slot, section)) in self.devices.iter().zip(&snapshot.devices).enumerate() {
            if let (Some(device), Some(section)) = (slot, section) {
                device.check_state(section).map_err(|err| {
                    log::warn!("System: snapshot section for device {} rejected: {}", id, err);
                    err
                })?;
            }
        }

        for (slot, section) in self.devices.iter_mut().zip(&snapshot.devices) {
            if let (Some(device), Some(section)) = (slot, section) {
                device.load_state(section)?;
            }
        }

        self.timing.advance_to(snapshot.clock_us);
        log::info!(
            "System: restored snapshot from t={}us (saved {})",
            snapshot.clock_us,
            snapshot.saved_at
        );
        Ok(())
    }

    /// Register names and values of a device
    pub fn register_dump(&self, id: DeviceId) -> Result<Vec<(&'static str, u32)>> {
        Ok(self.device(id)?.register_dump())
    }
}

#[cfg(test)]
mod tests;
