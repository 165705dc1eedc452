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

//! Physical library state and hardware command responses.

use serde::{Deserialize, Serialize};

/// Severity of a hardware command outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusCode {
    Ok,
    /// Transient, recoverable problem (controller exit code `-1`)
    Warning,
    Ko,
    /// Unrecoverable for the drive; the worker stops serving it
    Fatal,
}

impl StatusCode {
    /// Maps a controller exit code: `0 → OK`, `-1 → WARNING`, anything else `KO`.
    pub fn from_exit_code(exit_code: i32) -> Self {
        match exit_code {
            0 => StatusCode::Ok,
            -1 => StatusCode::Warning,
            _ => StatusCode::Ko,
        }
    }
}

/// Outcome of a hardware command, with the parsed entity on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapeResponse<T = ()> {
    pub status: StatusCode,
    pub entity: Option<T>,
    /// Diagnostic output (stderr, or the parse error) when not OK
    pub message: Option<String>,
}

impl<T> TapeResponse<T> {
    pub fn ok(entity: T) -> Self {
        Self {
            status: StatusCode::Ok,
            entity: Some(entity),
            message: None,
        }
    }

    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            entity: None,
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::Ok
    }
}

/// A cartridge as seen by the changer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapeCartridge {
    pub volume_tag: Option<String>,
    pub alternate_volume_tag: Option<String>,
    /// Storage element the cartridge was loaded from (drives only)
    pub slot_index: Option<u32>,
}

/// A data transfer element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapeDrive {
    pub index: u32,
    pub tape: Option<TapeCartridge>,
}

impl TapeDrive {
    pub fn has_tape(&self) -> bool {
        self.tape.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SlotType {
    Slot,
    #[serde(rename = "IMPORTEXPORT")]
    ImportExport,
}

/// A storage element (regular slot or mail slot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapeSlot {
    pub index: u32,
    pub slot_type: SlotType,
    pub tape: Option<TapeCartridge>,
}

/// Library state reported by the changer's `status` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapeLibraryState {
    pub device: String,
    pub drive_count: u32,
    pub slot_count: u32,
    pub mailbox_count: u32,
    pub drives: Vec<TapeDrive>,
    pub slots: Vec<TapeSlot>,
}

impl TapeLibraryState {
    pub fn drive(&self, index: u32) -> Option<&TapeDrive> {
        self.drives.iter().find(|drive| drive.index == index)
    }

    /// Drives currently holding a cartridge.
    pub fn loaded_drives(&self) -> impl Iterator<Item = &TapeDrive> {
        self.drives.iter().filter(|drive| drive.has_tape())
    }
}
