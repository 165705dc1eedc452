/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Tape Catalog Model
//!
//! One [`TapeCatalog`] entry describes one physical cartridge. Entries live in
//! the queue store so that reserving a cartridge for a drive is the same
//! atomic `READY → RUNNING` receive used for orders: a `RUNNING` entry is
//! owned by the drive that received it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::queue_message::QueueState;

/// Content state of a cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TapeState {
    /// No archive written yet
    #[default]
    Empty,
    /// Has data and accepts more
    Open,
    /// End of tape reached
    Full,
    /// Content does not match the catalog; excluded from writes
    Conflict,
}

impl TapeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TapeState::Empty => "EMPTY",
            TapeState::Open => "OPEN",
            TapeState::Full => "FULL",
            TapeState::Conflict => "CONFLICT",
        }
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, TapeState::Empty | TapeState::Open)
    }
}

impl fmt::Display for TapeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TapeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMPTY" => Ok(TapeState::Empty),
            "OPEN" => Ok(TapeState::Open),
            "FULL" => Ok(TapeState::Full),
            "CONFLICT" => Ok(TapeState::Conflict),
            other => Err(format!("unknown tape state '{}'", other)),
        }
    }
}

/// Kind of place a cartridge can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TapeLocationType {
    Drive,
    Slot,
    #[serde(rename = "IMPORTEXPORT")]
    ImportExport,
    Outside,
}

/// Position of a cartridge in the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TapeLocation {
    pub index: u32,
    pub location_type: TapeLocationType,
}

impl TapeLocation {
    pub fn drive(index: u32) -> Self {
        Self {
            index,
            location_type: TapeLocationType::Drive,
        }
    }

    pub fn slot(index: u32) -> Self {
        Self {
            index,
            location_type: TapeLocationType::Slot,
        }
    }

    pub fn import_export(index: u32) -> Self {
        Self {
            index,
            location_type: TapeLocationType::ImportExport,
        }
    }

    /// Whether a cartridge can be unloaded to this location.
    pub fn is_storage_element(&self) -> bool {
        matches!(
            self.location_type,
            TapeLocationType::Slot | TapeLocationType::ImportExport
        )
    }
}

/// Catalog entry for one physical cartridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapeCatalog {
    pub id: Uuid,
    /// Reservation state; `RUNNING` while a drive owns the cartridge
    pub state: QueueState,
    pub created: i64,
    pub last_update: i64,

    /// Barcode (volume tag) reported by the changer
    pub code: String,
    pub alternative_code: Option<String>,
    /// Identifier of the library holding the cartridge
    pub library: String,
    /// Bucket the cartridge is dedicated to, once written
    pub bucket: Option<String>,
    pub tape_state: TapeState,
    pub current_location: Option<TapeLocation>,
    /// Storage element the cartridge returns to when unloaded
    pub previous_location: Option<TapeLocation>,

    /// Identity written as file 0; unset until the first write
    pub label: Option<TapeLabel>,
    pub current_position: i32,
    pub file_count: i32,
    pub written_bytes: u64,
    pub capacity: Option<u64>,
}

impl TapeCatalog {
    /// A new, empty cartridge with no known location.
    pub fn new(code: impl Into<String>, library: impl Into<String>) -> Self {
        let now = super::now_millis();
        Self {
            id: Uuid::new_v4(),
            state: QueueState::Ready,
            created: now,
            last_update: now,
            code: code.into(),
            alternative_code: None,
            library: library.into(),
            bucket: None,
            tape_state: TapeState::Empty,
            current_location: None,
            previous_location: None,
            label: None,
            current_position: 0,
            file_count: 0,
            written_bytes: 0,
            capacity: None,
        }
    }

    /// Index of the drive holding the cartridge, if mounted.
    pub fn drive_index(&self) -> Option<u32> {
        self.current_location
            .filter(|location| location.location_type == TapeLocationType::Drive)
            .map(|location| location.index)
    }

    pub fn is_mounted(&self) -> bool {
        self.drive_index().is_some()
    }
}

/// Identity record stored as the first file of a written cartridge.
///
/// It ties the physical medium to its catalog entry: a cartridge whose label
/// does not carry the entry's id has been swapped or relabelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapeLabel {
    pub id: Uuid,
    pub code: String,
    pub alternative_code: Option<String>,
    pub bucket: Option<String>,
}

impl TapeLabel {
    pub fn for_tape(tape: &TapeCatalog) -> Self {
        Self {
            id: tape.id,
            code: tape.code.clone(),
            alternative_code: tape.alternative_code.clone(),
            bucket: tape.bucket.clone(),
        }
    }

    /// Whether a label read back from tape identifies the same cartridge.
    pub fn matches(&self, other: &TapeLabel) -> bool {
        self.id == other.id && self.code == other.code
    }
}

/// Partial update of a catalog entry; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TapeCatalogUpdate {
    pub state: Option<QueueState>,
    pub tape_state: Option<TapeState>,
    pub bucket: Option<String>,
    pub current_location: Option<TapeLocation>,
    pub previous_location: Option<TapeLocation>,
    pub label: Option<TapeLabel>,
    pub current_position: Option<i32>,
    pub file_count: Option<i32>,
    pub written_bytes: Option<u64>,
}

impl TapeCatalogUpdate {
    /// Merges the set fields into `tape`.
    pub fn apply(&self, tape: &mut TapeCatalog) {
        if let Some(state) = self.state {
            tape.state = state;
        }
        if let Some(tape_state) = self.tape_state {
            tape.tape_state = tape_state;
        }
        if let Some(bucket) = &self.bucket {
            tape.bucket = Some(bucket.clone());
        }
        if let Some(location) = self.current_location {
            tape.current_location = Some(location);
        }
        if let Some(location) = self.previous_location {
            tape.previous_location = Some(location);
        }
        if let Some(label) = &self.label {
            tape.label = Some(label.clone());
        }
        if let Some(position) = self.current_position {
            tape.current_position = position;
        }
        if let Some(file_count) = self.file_count {
            tape.file_count = file_count;
        }
        if let Some(written_bytes) = self.written_bytes {
            tape.written_bytes = written_bytes;
        }
    }
}
