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

//! Byte-level access to one tape drive.
//!
//! The positioning and streaming commands (`mt`, `dd` and friends) are not
//! part of this crate; deployments plug them in through [`TapeDriveService`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{ReadWritePriority, TapeResponse};

/// Static description of one drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapeDriveConf {
    /// Data transfer element index, as reported by the changer
    pub index: u32,
    /// Non-rewinding tape device, e.g. `/dev/nst0`
    pub device: String,
    #[serde(default)]
    pub read_write_priority: ReadWritePriority,
}

/// Drive status as reported by the drive itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapeDriveStatus {
    pub has_tape: bool,
    /// The head is past the last writable block
    pub end_of_tape: bool,
    /// Current file number, when known
    pub file_number: Option<i32>,
}

/// Positioning and transfer commands of one drive.
///
/// Positions are file numbers counted from the beginning of the tape.
#[async_trait]
pub trait TapeDriveService: Send + Sync {
    fn conf(&self) -> &TapeDriveConf;

    async fn status(&self) -> TapeResponse<TapeDriveStatus>;

    async fn rewind(&self) -> TapeResponse;

    /// Positions the head at the start of file `position`.
    async fn go_to_position(&self, position: i32) -> TapeResponse;

    /// Appends `source` as one tape file at the current position.
    async fn write_file(&self, source: &Path) -> TapeResponse;

    /// Copies the tape file at the current position to `destination`.
    async fn read_file(&self, destination: &Path) -> TapeResponse;

    /// Rewinds and takes the drive offline so the changer can unload it.
    async fn eject(&self) -> TapeResponse;
}
