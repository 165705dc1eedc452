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

//! Parser for `mtx status` output.
//!
//! ```text
//!   Storage Changer /dev/sg1:2 Drives, 6 Slots ( 1 Import/Export )
//! Data Transfer Element 0:Full (Storage Element 2 Loaded):VolumeTag = TAPE02L6
//! Data Transfer Element 1:Empty
//!       Storage Element 1:Full :VolumeTag=TAPE01L6
//!       Storage Element 2:Empty
//!       Storage Element 6 IMPORT/EXPORT:Full :VolumeTag=TAPE06L6
//! ```
//!
//! Drives are numbered from 0 and storage elements from 1, as `mtx` reports them.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::models::{SlotType, TapeCartridge, TapeDrive, TapeLibraryState, TapeSlot};

static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^Storage Changer\s+(\S+):(\d+)\s+Drives,\s*(\d+)\s+Slots\s*\(\s*(\d+)\s+Import/Export\s*\)",
    )
    .expect("valid header pattern")
});

static DRIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Data Transfer Element\s+(\d+):(Full|Empty)(.*)$").expect("valid drive pattern")
});

static SLOT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Storage Element\s+(\d+)(\s+IMPORT/EXPORT)?:(Full|Empty)(.*)$")
        .expect("valid slot pattern")
});

static LOADED_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(Storage Element\s+(\d+)\s+Loaded\)").expect("valid source pattern")
});

static VOLUME_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":VolumeTag\s*=\s*([^:\s]+)").expect("valid tag pattern"));

static ALTERNATE_VOLUME_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r":AlternateVolumeTag\s*=\s*([^:\s]+)").expect("valid alternate tag pattern")
});

/// `mtx status` output that could not be understood.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusParseError {
    #[error("missing 'Storage Changer' header line")]
    MissingHeader,

    #[error("unrecognized status line: '{0}'")]
    InvalidLine(String),

    #[error("invalid number in status line: '{0}'")]
    InvalidNumber(String),
}

fn number(value: &str, line: &str) -> Result<u32, StatusParseError> {
    value
        .parse()
        .map_err(|_| StatusParseError::InvalidNumber(line.to_string()))
}

fn cartridge(details: &str, slot_index: Option<u32>) -> TapeCartridge {
    TapeCartridge {
        volume_tag: VOLUME_TAG
            .captures(details)
            .map(|caps| caps[1].to_string()),
        alternate_volume_tag: ALTERNATE_VOLUME_TAG
            .captures(details)
            .map(|caps| caps[1].to_string()),
        slot_index,
    }
}

/// Parses the standard output of `mtx -f <device> status`.
pub fn parse_status(output: &str) -> Result<TapeLibraryState, StatusParseError> {
    let mut state: Option<TapeLibraryState> = None;

    for raw in output.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = HEADER.captures(line) {
            state = Some(TapeLibraryState {
                device: caps[1].to_string(),
                drive_count: number(&caps[2], line)?,
                slot_count: number(&caps[3], line)?,
                mailbox_count: number(&caps[4], line)?,
                drives: Vec::new(),
                slots: Vec::new(),
            });
            continue;
        }

        let library = state.as_mut().ok_or(StatusParseError::MissingHeader)?;

        if let Some(caps) = DRIVE.captures(line) {
            let index = number(&caps[1], line)?;
            let tape = if &caps[2] == "Full" {
                let source = LOADED_FROM
                    .captures(&caps[3])
                    .map(|source| number(&source[1], line))
                    .transpose()?;
                Some(cartridge(&caps[3], source))
            } else {
                None
            };
            library.drives.push(TapeDrive { index, tape });
        } else if let Some(caps) = SLOT.captures(line) {
            let index = number(&caps[1], line)?;
            let slot_type = if caps.get(2).is_some() {
                SlotType::ImportExport
            } else {
                SlotType::Slot
            };
            let tape = (&caps[3] == "Full").then(|| cartridge(&caps[4], None));
            library.slots.push(TapeSlot {
                index,
                slot_type,
                tape,
            });
        } else {
            return Err(StatusParseError::InvalidLine(line.to_string()));
        }
    }

    state.ok_or(StatusParseError::MissingHeader)
}
