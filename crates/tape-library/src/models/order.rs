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

//! Orders dispatched to drive workers.

use serde::{Deserialize, Serialize};

/// Reads one archive file back from a cartridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOrder {
    /// Volume tag of the cartridge holding the file
    pub tape_code: String,
    /// File number on the cartridge (0-based, as counted by the drive)
    pub file_position: i32,
    pub archive_id: String,
    pub bucket: String,
    pub file_bucket_id: String,
    pub size: u64,
}

/// Writes one archive file from local disk to a cartridge of the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOrder {
    pub bucket: String,
    pub file_bucket_id: String,
    pub archive_id: String,
    /// Path of the file to write
    pub file_path: String,
    pub size: u64,
    pub digest: String,
}

/// A unit of work for a drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Order {
    Read(ReadOrder),
    Write(WriteOrder),
}

impl Order {
    pub fn is_write(&self) -> bool {
        matches!(self, Order::Write(_))
    }

    pub fn archive_id(&self) -> &str {
        match self {
            Order::Read(order) => &order.archive_id,
            Order::Write(order) => &order.archive_id,
        }
    }

    pub fn bucket(&self) -> &str {
        match self {
            Order::Read(order) => &order.bucket,
            Order::Write(order) => &order.bucket,
        }
    }
}

/// Which queue a drive serves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReadWritePriority {
    Read,
    #[default]
    Write,
}
