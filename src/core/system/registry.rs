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

//! Device type registry
//!
//! Maps device type names to factories. A registry is assembled with
//! [`DeviceRegistryBuilder`] and is immutable once built.
//!
//! ## Lifecycle
//!
//! The process-wide registry is installed once with [`install_global`]
//! before any device is created and is read-only afterwards. If nothing was
//! installed, the first call to [`global`] installs
//! [`DeviceRegistry::with_builtin`]; a later `install_global` then fails.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::Device;
use crate::config::Config;
use crate::core::error::{EmulatorError, Result};
use crate::core::interrupt::InterruptLine;
use crate::core::timer::{SystemTimer, TYPE_BCM2835_TIMER};
use crate::core::timing::TimingEventManager;

/// Everything a factory may use to build a device
pub struct DeviceContext<'a> {
    /// Timing event manager the device schedules on
    pub timing: &'a mut TimingEventManager,

    /// Interrupt output, if the device is wired to one
    pub irq: Option<InterruptLine>,

    /// Emulator configuration
    pub config: &'a Config,
}

/// Builds and realizes a device
pub type DeviceFactory = fn(&mut DeviceContext<'_>) -> Result<Box<dyn Device>>;

/// Immutable map of device type name to factory
pub struct DeviceRegistry {
    factories: HashMap<&'static str, DeviceFactory>,
}

/// Builder for [`DeviceRegistry`]
#[derive(Default)]
pub struct DeviceRegistryBuilder {
    factories: HashMap<&'static str, DeviceFactory>,
}

impl DeviceRegistryBuilder {
    /// Start an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a factory under `type_name`
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::DuplicateDeviceType`] if the name is taken.
    pub fn register(mut self, type_name: &'static str, factory: DeviceFactory) -> Result<Self> {
        if self.factories.contains_key(type_name) {
            return Err(EmulatorError::DuplicateDeviceType(type_name.to_string()));
        }
        self.factories.insert(type_name, factory);
        Ok(self)
    }

    /// Freeze the registry
    pub fn build(self) -> DeviceRegistry {
        DeviceRegistry {
            factories: self.factories,
        }
    }
}

impl DeviceRegistry {
    /// Start building a registry
    pub fn builder() -> DeviceRegistryBuilder {
        DeviceRegistryBuilder::new()
    }

    /// Registry with every device type this crate provides
    pub fn with_builtin() -> Self {
        let mut factories: HashMap<&'static str, DeviceFactory> = HashMap::new();
        factories.insert(TYPE_BCM2835_TIMER, create_bcm2835_timer);
        Self { factories }
    }

    /// Whether `type_name` is registered
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Instantiate a device
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::UnknownDeviceType`] if nothing is registered
    /// under `type_name`, or whatever the factory returns.
    pub fn create(&self, type_name: &str, ctx: &mut DeviceContext<'_>) -> Result<Box<dyn Device>> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| EmulatorError::UnknownDeviceType(type_name.to_string()))?;
        factory(ctx)
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

static GLOBAL_REGISTRY: OnceLock<DeviceRegistry> = OnceLock::new();

/// Install the process-wide registry
///
/// # Errors
///
/// Returns [`EmulatorError::RegistryAlreadyInstalled`] if a registry was
/// already installed, explicitly or by [`global`].
pub fn install_global(registry: DeviceRegistry) -> Result<&'static DeviceRegistry> {
    GLOBAL_REGISTRY
        .set(registry)
        .map_err(|_| EmulatorError::RegistryAlreadyInstalled)?;
    log::info!("Device registry installed");
    Ok(global())
}

/// The process-wide registry
pub fn global() -> &'static DeviceRegistry {
    GLOBAL_REGISTRY.get_or_init(DeviceRegistry::with_builtin)
}

fn create_bcm2835_timer(ctx: &mut DeviceContext<'_>) -> Result<Box<dyn Device>> {
    let mut timer = SystemTimer::with_tick_interval(ctx.config.timer.tick_interval_us);
    if let Some(irq) = ctx.irq.take() {
        timer.connect_irq(Box::new(irq));
    }
    timer.register_events(ctx.timing);
    Ok(Box::new(timer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_factory(_ctx: &mut DeviceContext<'_>) -> Result<Box<dyn Device>> {
        Err(EmulatorError::Config("factory refused".to_string()))
    }

    #[test]
    fn test_builtin_contains_timer() {
        let registry = DeviceRegistry::with_builtin();
        assert!(registry.contains(TYPE_BCM2835_TIMER));
        assert_eq!(registry.type_names(), vec![TYPE_BCM2835_TIMER]);
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let err = DeviceRegistry::builder()
            .register("dup", failing_factory)
            .and_then(|b| b.register("dup", failing_factory))
            .err()
            .unwrap();
        assert!(matches!(err, EmulatorError::DuplicateDeviceType(name) if name == "dup"));
    }

    #[test]
    fn test_create_unknown_type() {
        let registry = DeviceRegistry::builder().build();
        let config = Config::default();
        let mut timing = TimingEventManager::new();
        let mut ctx = DeviceContext {
            timing: &mut timing,
            irq: None,
            config: &config,
        };
        let err = registry.create("missing", &mut ctx).err().unwrap();
        assert!(matches!(err, EmulatorError::UnknownDeviceType(name) if name == "missing"));
    }

    #[test]
    fn test_create_propagates_factory_error() {
        let registry = DeviceRegistry::builder()
            .register("broken", failing_factory)
            .unwrap()
            .build();
        let config = Config::default();
        let mut timing = TimingEventManager::new();
        let mut ctx = DeviceContext {
            timing: &mut timing,
            irq: None,
            config: &config,
        };
        assert!(matches!(
            registry.create("broken", &mut ctx),
            Err(EmulatorError::Config(_))
        ));
    }

    #[test]
    fn test_timer_factory_realizes_device() {
        let registry = DeviceRegistry::with_builtin();
        let config = Config::default();
        let mut timing = TimingEventManager::with_start_time(1000);
        let mut ctx = DeviceContext {
            timing: &mut timing,
            irq: None,
            config: &config,
        };
        let mut device = registry.create(TYPE_BCM2835_TIMER, &mut ctx).unwrap();

        assert_eq!(device.type_name(), TYPE_BCM2835_TIMER);
        assert_eq!(device.read(0x04, 4), 1000);
        assert_eq!(timing.pending_count(), 1);
        assert_eq!(timing.next_deadline(), Some(1008));
    }

    #[test]
    fn test_global_registry_installs_once() {
        // Whichever of these runs first wins; both see the builtin types
        let registry = global();
        assert!(registry.contains(TYPE_BCM2835_TIMER));
        assert!(matches!(
            install_global(DeviceRegistry::with_builtin()),
            Err(EmulatorError::RegistryAlreadyInstalled)
        ));
    }
}
