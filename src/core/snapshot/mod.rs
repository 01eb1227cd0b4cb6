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

//! Save states
//!
//! Each device describes its persisted state with a [`StateDescription`]
//! (name, version, ordered field list) and a serde-serializable state struct.
//! [`save_section`] and [`load_section`] drive the device's pre-save and
//! post-load hooks around the encode/decode step and enforce the name and
//! version checks, so device code only maps fields.
//!
//! ## Encoding
//!
//! Sections are encoded with `bincode` using fixed-width little-endian
//! integers: a state made of seven `u32` fields is exactly 28 bytes, in
//! declaration order.
//!
//! A [`MachineSnapshot`] bundles the sections of every device with the
//! virtual clock reading and a wall-clock timestamp.

use std::path::Path;

use bincode::config::{Configuration, Fixint, LittleEndian};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::error::{EmulatorError, Result};

/// Version of the [`MachineSnapshot`] container format
pub const MACHINE_SNAPSHOT_VERSION: u32 = 1;

/// Static description of a device's persisted state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateDescription {
    /// Section name; must match on load
    pub name: &'static str,

    /// Version written by this build
    pub version_id: u32,

    /// Oldest version this build can load
    pub minimum_version_id: u32,

    /// Persisted field names, in encoding order
    pub fields: &'static [&'static str],
}

/// Device with a persisted state
pub trait Snapshottable {
    /// Serializable view of the persisted fields
    type State: Serialize + DeserializeOwned;

    /// Schema of [`Self::State`]
    fn description(&self) -> &'static StateDescription;

    /// Called before the state is captured
    fn pre_save(&mut self) {}

    /// Copy the persisted fields out of the device
    fn capture(&self) -> Self::State;

    /// Overwrite the persisted fields
    fn restore(&mut self, state: Self::State);

    /// Called after a successful [`restore`](Self::restore)
    ///
    /// # Arguments
    ///
    /// * `version_id` - Version of the section that was loaded
    fn post_load(&mut self, _version_id: u32) -> Result<()> {
        Ok(())
    }
}

/// One device's encoded state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSection {
    /// Section name from the device's [`StateDescription`]
    pub name: String,

    /// Version the payload was written with
    pub version_id: u32,

    /// Encoded state
    pub data: Vec<u8>,
}

/// Encoding shared by every section and the machine container
pub fn bincode_config() -> Configuration<LittleEndian, Fixint> {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
}

/// Run the pre-save hook, capture and encode the device state
pub fn save_section<T: Snapshottable>(device: &mut T) -> Result<SnapshotSection> {
    device.pre_save();

    let desc = device.description();
    let data = bincode::serde::encode_to_vec(device.capture(), bincode_config())?;

    log::debug!(
        "Snapshot: saved '{}' v{} ({} bytes)",
        desc.name,
        desc.version_id,
        data.len()
    );

    Ok(SnapshotSection {
        name: desc.name.to_string(),
        version_id: desc.version_id,
        data,
    })
}

/// Validate and decode a section without touching the device
///
/// Rejects sections with another name, a version outside
/// `minimum_version_id..=version_id`, or a payload that does not decode.
pub fn decode_section<T: Snapshottable>(device: &T, section: &SnapshotSection) -> Result<T::State> {
    let desc = device.description();

    if section.name != desc.name {
        return Err(EmulatorError::SnapshotMismatch {
            expected: desc.name.to_string(),
            found: section.name.clone(),
        });
    }

    if section.version_id < desc.minimum_version_id || section.version_id > desc.version_id {
        return Err(EmulatorError::UnsupportedSnapshotVersion {
            name: desc.name.to_string(),
            version: section.version_id,
            min: desc.minimum_version_id,
            max: desc.version_id,
        });
    }

    let (state, _) = bincode::serde::decode_from_slice::<T::State, _>(&section.data, bincode_config())?;
    Ok(state)
}

/// Validate, decode and restore a section, then run the post-load hook
///
/// The device is left untouched if the name, version or payload is rejected.
pub fn load_section<T: Snapshottable>(device: &mut T, section: &SnapshotSection) -> Result<()> {
    let state = decode_section(device, section)?;
    device.restore(state);
    device.post_load(section.version_id)?;

    log::debug!(
        "Snapshot: loaded '{}' v{}",
        device.description().name,
        section.version_id
    );
    Ok(())
}

/// Save state of a whole simulated machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    /// Container format version
    pub format_version: u32,

    /// Host wall-clock time the snapshot was taken
    pub saved_at: DateTime<Utc>,

    /// Virtual clock reading in microseconds
    pub clock_us: u64,

    /// One section per live device, in device-id order
    pub devices: Vec<Option<SnapshotSection>>,
}

impl MachineSnapshot {
    /// Create an empty snapshot at virtual time `clock_us`
    pub fn new(clock_us: u64) -> Self {
        Self {
            format_version: MACHINE_SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            clock_us,
            devices: Vec::new(),
        }
    }

    /// Encode to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(self, bincode_config())?)
    }

    /// Decode from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (snapshot, _): (Self, usize) =
            bincode::serde::decode_from_slice(bytes, bincode_config())?;

        if snapshot.format_version != MACHINE_SNAPSHOT_VERSION {
            return Err(EmulatorError::UnsupportedSnapshotVersion {
                name: "machine".to_string(),
                version: snapshot.format_version,
                min: MACHINE_SNAPSHOT_VERSION,
                max: MACHINE_SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }

    /// Write to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Read from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}
