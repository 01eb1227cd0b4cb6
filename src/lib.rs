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

//! bcm2835-timer: BCM2835 System Timer emulation
//!
//! This crate emulates the BCM2835 System Timer peripheral as seen by guest
//! software inside a virtual machine monitor.
//!
//! # Architecture
//!
//! - [`core`]: Device model (timer, timing, interrupts, snapshots, system loop)
//! - [`config`]: TOML configuration
//!
//! # Example
//!
//! ```
//! use bcm2835_timer::config::Config;
//! use bcm2835_timer::core::system::System;
//! use bcm2835_timer::core::timer::{registers, TYPE_BCM2835_TIMER};
//!
//! let mut system = System::new(Config::default());
//! let timer = system.create_device(TYPE_BCM2835_TIMER, Some(1))?;
//!
//! system.write(timer, registers::TIMER_C1, 4, 0x2A)?;
//! system.run_for(1000);
//!
//! assert_eq!(system.read(timer, registers::TIMER_C1, 4)?, 0x2A);
//! assert_eq!(system.read(timer, registers::TIMER_CLO, 4)?, 1000);
//! # Ok::<(), bcm2835_timer::core::error::EmulatorError>(())
//! ```
//!
//! # Modules
//!
//! - [`core::timer`]: The System Timer device and its register file
//! - [`core::timing`]: Virtual clock and event scheduler
//! - [`core::interrupt`]: Interrupt controller and device-side lines
//! - [`core::snapshot`]: Save states
//! - [`core::system`]: Device registry and simulation loop
//!
//! # Error Handling
//!
//! All fallible operations return [`core::error::Result<T>`] which is an alias for
//! `Result<T, EmulatorError>`. Guest mistakes are not errors: they are logged
//! under the `guest_error` target and emulation continues.

pub mod config;
pub mod core;

// Re-export commonly used types
pub use core::error::{EmulatorError, Result};
