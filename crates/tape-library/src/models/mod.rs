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

//! Domain types shared by the queue, the catalog, the robot and the workers.

pub mod library;
pub mod order;
pub mod queue_message;
pub mod tape_catalog;

pub use library::{
    SlotType, StatusCode, TapeCartridge, TapeDrive, TapeLibraryState, TapeResponse, TapeSlot,
};
pub use order::{Order, ReadOrder, ReadWritePriority, WriteOrder};
pub use queue_message::{QueueMessage, QueueMessageType, QueuePayload, QueueState};
pub use tape_catalog::{
    TapeCatalog, TapeCatalogUpdate, TapeLabel, TapeLocation, TapeLocationType, TapeState,
};

/// Current time as epoch milliseconds, the resolution of queue timestamps.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
