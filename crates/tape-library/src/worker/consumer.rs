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

//! Order selection for one drive.
//!
//! A drive serves its preferred queue first and falls back to the other one
//! when the preferred queue is empty, so neither queue starves. Within each
//! queue, orders that can run on the cartridge already in the drive come
//! first, which saves a robot exchange. The fallback receives leave out the
//! cartridges and buckets other drives hold (see [`DriveActivity`]).

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::activity::DriveActivity;
use crate::error::QueueError;
use crate::models::{Order, QueueMessage, QueueMessageType, ReadWritePriority, TapeCatalog};
use crate::queue::{BucketFilter, QueueFilter, QueueRepository, QueueRepositoryExt};

/// Receives the next order for a drive.
#[derive(Clone)]
pub struct TapeDriveOrderConsumer {
    queue: Arc<dyn QueueRepository>,
    activity: Arc<DriveActivity>,
}

impl TapeDriveOrderConsumer {
    pub fn new(queue: Arc<dyn QueueRepository>, activity: Arc<DriveActivity>) -> Self {
        Self { queue, activity }
    }

    /// Receives an order, trying in turn:
    ///
    /// 1. the preferred queue, restricted to the mounted cartridge
    /// 2. the preferred queue, minus what other drives hold
    /// 3. the other queue, restricted to the mounted cartridge
    /// 4. the other queue, minus what other drives hold
    ///
    /// The received order is recorded as held by `drive_index`. Returns the
    /// id of the received message with its order.
    pub async fn consume(
        &self,
        drive_index: u32,
        priority: ReadWritePriority,
        current_tape: Option<&TapeCatalog>,
    ) -> Result<Option<(Uuid, Order)>, QueueError> {
        let queues = match priority {
            ReadWritePriority::Write => [QueueMessageType::WriteOrder, QueueMessageType::ReadOrder],
            ReadWritePriority::Read => [QueueMessageType::ReadOrder, QueueMessageType::WriteOrder],
        };
        let exclusions = self.activity.exclusions(drive_index);

        for message_type in queues {
            if let Some(filter) = current_tape.and_then(|tape| tape_filter(message_type, tape)) {
                let received = self.queue.receive_filtered(filter, message_type).await?;
                if let Some((id, order)) = into_order(received)? {
                    debug!(drive_index, %message_type, "Received order for mounted cartridge");
                    self.activity.record(drive_index, current_tape, Some(&order));
                    return Ok(Some((id, order)));
                }
            }

            let received = self
                .queue
                .receive_filtered(exclusions.clone(), message_type)
                .await?;
            if let Some((id, order)) = into_order(received)? {
                debug!(drive_index, %message_type, "Received order");
                self.activity.record(drive_index, current_tape, Some(&order));
                return Ok(Some((id, order)));
            }
        }

        Ok(None)
    }
}

fn into_order(message: Option<QueueMessage>) -> Result<Option<(Uuid, Order)>, QueueError> {
    let Some(message) = message else {
        return Ok(None);
    };

    let id = message.id;
    match message.payload.into_order() {
        Some(order) => Ok(Some((id, order))),
        None => Err(QueueError::InvalidRecord {
            id: id.to_string(),
            reason: "received message is not an order".to_string(),
        }),
    }
}

/// Restriction of `message_type` to orders runnable on `tape` without an exchange.
fn tape_filter(message_type: QueueMessageType, tape: &TapeCatalog) -> Option<QueueFilter> {
    match message_type {
        QueueMessageType::ReadOrder => Some(QueueFilter::new().tape_code(tape.code.clone())),
        QueueMessageType::WriteOrder => match &tape.bucket {
            Some(bucket) if tape.tape_state.is_writable() => {
                Some(QueueFilter::new().bucket(BucketFilter::Is(bucket.clone())))
            }
            _ => None,
        },
        QueueMessageType::TapeCatalog => None,
    }
}
