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

//! Error types
//!
//! Two families of errors exist in this crate:
//!
//! - [`EmulatorError`]: failures of the emulator itself (unknown device type,
//!   corrupt snapshot, unreadable config). These are returned as `Err`.
//! - [`GuestError`]: protocol violations committed by guest software (bad
//!   register offset, write to a read-only register). These are *never*
//!   returned as `Err`; devices report them through the `guest_error` log
//!   target and keep emulating.

use thiserror::Error;

/// Emulator error type
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// No factory registered under the requested device type name
    #[error("unknown device type: {0}")]
    UnknownDeviceType(String),

    /// A factory was registered twice under the same name
    #[error("device type registered twice: {0}")]
    DuplicateDeviceType(String),

    /// The process-wide device registry can only be installed once
    #[error("device registry already installed")]
    RegistryAlreadyInstalled,

    /// No device exists (or it was removed) for the given id
    #[error("unknown device id: {0}")]
    UnknownDevice(usize),

    /// Interrupt line number outside the controller's range
    #[error("invalid interrupt line: {line}")]
    InvalidIrqLine { line: u32 },

    /// Snapshot section belongs to another device type
    #[error("snapshot section mismatch: expected {expected}, found {found}")]
    SnapshotMismatch { expected: String, found: String },

    /// Snapshot section version is not supported by this device
    #[error("unsupported snapshot version {version} for {name} (supported {min}..={max})")]
    UnsupportedSnapshotVersion {
        name: String,
        version: u32,
        min: u32,
        max: u32,
    },

    /// Machine snapshot does not match the device layout of this system
    #[error("snapshot layout mismatch: {0}")]
    SnapshotLayout(String),

    /// Binary encoding of a snapshot failed
    #[error("snapshot encode error: {0}")]
    SnapshotEncode(#[from] bincode::error::EncodeError),

    /// Binary decoding of a snapshot failed
    #[error("snapshot decode error: {0}")]
    SnapshotDecode(#[from] bincode::error::DecodeError),

    /// Configuration file could not be parsed or is invalid
    #[error("config error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Kind of register access that triggered a guest error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write"),
        }
    }
}

/// Non-fatal protocol violation committed by guest software
///
/// Guest errors are logged and recorded by the device that observed them.
/// They never abort emulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GuestError {
    /// Access to an offset outside the device's defined registers
    #[error("{access}: bad offset 0x{offset:x}")]
    BadOffset { offset: u64, access: Access },

    /// Write to a read-only register
    #[error("write to read-only register at offset 0x{offset:x}")]
    ReadOnlyViolation { offset: u64 },
}

impl GuestError {
    /// Report this error through the `guest_error` log target
    ///
    /// `device` is the device type name, used as the message prefix.
    pub fn report(&self, device: &str) {
        log::warn!(target: "guest_error", "{}: {}", device, self);
    }
}
