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

//! Emulator configuration
//!
//! Configuration is read from TOML. Every field has a default, so a partial
//! file (or none at all) is valid:
//!
//! ```toml
//! [timer]
//! tick_interval_us = 8
//!
//! [simulation]
//! start_time_us = 0
//! run_for_us = 1000
//! irq_line = 1
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{EmulatorError, Result};
use crate::core::interrupt::{self, lines};
use crate::core::timer::DEFAULT_TICK_INTERVAL_US;

/// System Timer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Microseconds between counter refreshes
    pub tick_interval_us: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_us: DEFAULT_TICK_INTERVAL_US,
        }
    }
}

/// Simulation loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Virtual clock reading at power-on
    pub start_time_us: u64,

    /// How long the command-line runner simulates
    pub run_for_us: u64,

    /// Interrupt controller line the timer drives
    pub irq_line: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_time_us: 0,
            run_for_us: 1000,
            irq_line: lines::SYSTIMER_M1,
        }
    }
}

/// Emulator configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub timer: TimerConfig,
    pub simulation: SimulationConfig,
}

impl Config {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| EmulatorError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| EmulatorError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.timer.tick_interval_us == 0 {
            return Err(EmulatorError::Config(
                "timer.tick_interval_us must be greater than 0".to_string(),
            ));
        }
        if self.simulation.irq_line >= interrupt::NUM_LINES {
            return Err(EmulatorError::Config(format!(
                "simulation.irq_line must be below {}",
                interrupt::NUM_LINES
            )));
        }
        Ok(())
    }
}
