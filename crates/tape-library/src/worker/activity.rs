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

//! What each drive of a library is busy with.
//!
//! Workers publish the cartridge in their drive and the order they run. The
//! order consumer keeps the other drives away from those cartridges and from
//! the buckets being written, so one bucket is not spread over two cartridges
//! at once and a read for a mounted cartridge waits for the drive holding it.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::models::{Order, TapeCatalog};
use crate::queue::QueueFilter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Held {
    tape_codes: Vec<String>,
    buckets: Vec<String>,
}

/// Cartridges and buckets held by each drive, shared by the workers of one library.
#[derive(Debug, Default)]
pub struct DriveActivity {
    drives: RwLock<HashMap<u32, Held>>,
}

impl DriveActivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces what drive `drive_index` holds.
    ///
    /// A mounted cartridge holds its code, and its bucket while it is still
    /// writable. A running order holds its cartridge or its bucket.
    pub fn record(&self, drive_index: u32, current_tape: Option<&TapeCatalog>, order: Option<&Order>) {
        let mut held = Held::default();
        if let Some(tape) = current_tape {
            held.tape_codes.push(tape.code.clone());
            if let Some(bucket) = tape.bucket.as_ref().filter(|_| tape.tape_state.is_writable()) {
                held.buckets.push(bucket.clone());
            }
        }
        match order {
            Some(Order::Read(read)) => held.tape_codes.push(read.tape_code.clone()),
            Some(Order::Write(write)) => held.buckets.push(write.bucket.clone()),
            None => {}
        }
        self.drives.write().insert(drive_index, held);
    }

    /// Releases the buckets of a drive that no longer writes.
    ///
    /// Its cartridge stays held: it is still physically in the drive.
    pub fn release_buckets(&self, drive_index: u32) {
        if let Some(held) = self.drives.write().get_mut(&drive_index) {
            held.buckets.clear();
        }
    }

    /// Filter leaving out everything held by drives other than `drive_index`.
    pub fn exclusions(&self, drive_index: u32) -> QueueFilter {
        let mut tape_codes = Vec::new();
        let mut buckets = Vec::new();
        for (_, held) in self
            .drives
            .read()
            .iter()
            .filter(|(index, _)| **index != drive_index)
        {
            tape_codes.extend(held.tape_codes.iter().cloned());
            buckets.extend(held.buckets.iter().cloned());
        }
        tape_codes.sort();
        tape_codes.dedup();
        buckets.sort();
        buckets.dedup();

        QueueFilter::new()
            .exclude_tape_codes(tape_codes)
            .exclude_buckets(buckets)
    }
}
