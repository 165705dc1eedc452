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

//! Tape catalog.
//!
//! The catalog is a queue of [`TapeCatalog`] messages: reserving a cartridge
//! for a drive is a `receive` on the catalog, and giving it back is a
//! `mark_ready`. On top of the queue contract it offers registry operations
//! and [`init`](TapeCatalogService::init), which reconciles the records with
//! what the robot reports at startup.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::dal::DAL;
use crate::error::{QueueError, TapeCatalogError};
use crate::models::{
    QueueMessage, QueueMessageType, QueuePayload, QueueState, StatusCode, TapeCatalog,
    TapeCatalogUpdate, TapeLibraryState,
};
use crate::queue::{PersistentQueueRepository, QueueFilter, QueueRepository, ReceiveRequest};
use crate::robot::TapeRobotPool;

mod reconcile;

/// Registry of physical cartridges, layered on the queue contract.
#[async_trait]
pub trait TapeCatalogService: QueueRepository {
    /// Registers a cartridge.
    ///
    /// # Errors
    ///
    /// [`TapeCatalogError::AlreadyExists`] if the code is already registered.
    async fn create(&self, tape: TapeCatalog) -> Result<TapeCatalog, TapeCatalogError>;

    /// Overwrites the whole entry with the same id. The last writer wins.
    async fn replace(&self, tape: TapeCatalog) -> Result<(), TapeCatalogError>;

    /// Merges the set fields of `update` into the entry.
    ///
    /// Returns `false` if the id is unknown.
    async fn update(&self, id: Uuid, update: TapeCatalogUpdate) -> Result<bool, TapeCatalogError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TapeCatalog>, TapeCatalogError>;

    /// Entries matching `query`, oldest first.
    async fn find(&self, query: QueueFilter) -> Result<Vec<TapeCatalog>, TapeCatalogError>;

    /// Reconciles the catalog with the physical state reported by the robot.
    ///
    /// Returns the cartridge mounted in each drive, keyed by drive index.
    async fn init(
        &self,
        library_identifier: &str,
        library_state: &TapeLibraryState,
    ) -> Result<HashMap<u32, TapeCatalog>, TapeCatalogError>;

    /// Asks a robot of `robot_pool` for the library state, then runs [`init`](Self::init).
    async fn bootstrap(
        &self,
        robot_pool: &TapeRobotPool,
    ) -> Result<HashMap<u32, TapeCatalog>, TapeCatalogError> {
        let response = {
            let robot = robot_pool
                .checkout()
                .await
                .map_err(|e| TapeCatalogError::Robot {
                    status: StatusCode::Ko,
                    message: e.to_string(),
                })?;
            robot.status().await
        };

        let status = response.status;
        match response.entity {
            Some(state) if status == StatusCode::Ok => {
                self.init(robot_pool.library_identifier(), &state).await
            }
            _ => Err(TapeCatalogError::Robot {
                status,
                message: response
                    .message
                    .unwrap_or_else(|| "robot status returned no library state".to_string()),
            }),
        }
    }
}

fn into_tape(message: QueueMessage) -> Result<TapeCatalog, TapeCatalogError> {
    match message.payload {
        QueuePayload::TapeCatalog(tape) => Ok(tape),
        _ => Err(TapeCatalogError::NotACatalogEntry(message.id)),
    }
}

/// Tape catalog stored in the queue table.
#[derive(Clone, Debug)]
pub struct PersistentTapeCatalogService {
    dal: DAL,
    queue: PersistentQueueRepository,
}

impl PersistentTapeCatalogService {
    pub fn new(dal: DAL) -> Self {
        Self {
            queue: PersistentQueueRepository::new(dal.clone()),
            dal,
        }
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<TapeCatalog>, TapeCatalogError> {
        let mut found = self.find(QueueFilter::new().tape_code(code)).await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }
}

#[async_trait]
impl QueueRepository for PersistentTapeCatalogService {
    async fn add(&self, message: QueueMessage) -> Result<(), QueueError> {
        self.queue.add(message).await
    }

    async fn add_if_absent(
        &self,
        criteria: QueueFilter,
        message: QueueMessage,
    ) -> Result<bool, QueueError> {
        self.queue.add_if_absent(criteria, message).await
    }

    async fn remove(&self, id: Uuid) -> Result<usize, QueueError> {
        self.queue.remove(id).await
    }

    async fn complete(&self, id: Uuid) -> Result<usize, QueueError> {
        self.queue.complete(id).await
    }

    async fn mark_error(&self, id: Uuid) -> Result<usize, QueueError> {
        self.queue.mark_error(id).await
    }

    async fn mark_ready(&self, id: Uuid) -> Result<usize, QueueError> {
        self.queue.mark_ready(id).await
    }

    async fn receive(&self, request: ReceiveRequest) -> Result<Option<QueueMessage>, QueueError> {
        self.queue.receive(request).await
    }

    /// Releases reservations of cartridges that are not in a drive.
    ///
    /// Mounted cartridges stay reserved by their drive.
    async fn initialize_on_bootstrap(&self) -> Result<usize, QueueError> {
        let reset = self
            .dal
            .queue_message()
            .reset_running(vec![QueueMessageType::TapeCatalog], true)
            .await?;
        if reset > 0 {
            info!("Released {} stale cartridge reservation(s)", reset);
        }
        Ok(reset)
    }

    async fn find_message(&self, id: Uuid) -> Result<Option<QueueMessage>, QueueError> {
        self.queue.find_message(id).await
    }

    async fn list(
        &self,
        message_type: QueueMessageType,
        filter: QueueFilter,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        self.queue.list(message_type, filter).await
    }

    async fn count(
        &self,
        message_type: QueueMessageType,
        state: QueueState,
    ) -> Result<i64, QueueError> {
        self.queue.count(message_type, state).await
    }
}

#[async_trait]
impl TapeCatalogService for PersistentTapeCatalogService {
    async fn create(&self, tape: TapeCatalog) -> Result<TapeCatalog, TapeCatalogError> {
        let code = tape.code.clone();
        let inserted = self
            .dal
            .queue_message()
            .insert_if_absent(
                QueueFilter::new().tape_code(code.clone()),
                &QueueMessage::from(tape.clone()),
            )
            .await?;

        if !inserted {
            return Err(TapeCatalogError::AlreadyExists(code));
        }
        info!(tape_code = %code, library = %tape.library, "Cartridge registered in catalog");
        Ok(tape)
    }

    async fn replace(&self, tape: TapeCatalog) -> Result<(), TapeCatalogError> {
        let id = tape.id;
        let replaced = self
            .dal
            .queue_message()
            .replace(&QueueMessage::from(tape))
            .await?;
        if replaced == 0 {
            return Err(TapeCatalogError::NotFound(id));
        }
        Ok(())
    }

    async fn update(&self, id: Uuid, update: TapeCatalogUpdate) -> Result<bool, TapeCatalogError> {
        let modified = self
            .dal
            .queue_message()
            .modify(id, move |message| {
                if let Some(state) = update.state {
                    message.state = state;
                }
                match &mut message.payload {
                    QueuePayload::TapeCatalog(tape) => {
                        update.apply(tape);
                        Ok(())
                    }
                    _ => Err(QueueError::InvalidRecord {
                        id: message.id.to_string(),
                        reason: "not a tape catalog entry".to_string(),
                    }),
                }
            })
            .await?;

        Ok(modified.is_some())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TapeCatalog>, TapeCatalogError> {
        match self.queue.find_message(id).await? {
            Some(message) => into_tape(message).map(Some),
            None => Ok(None),
        }
    }

    async fn find(&self, query: QueueFilter) -> Result<Vec<TapeCatalog>, TapeCatalogError> {
        self.queue
            .list(QueueMessageType::TapeCatalog, query)
            .await?
            .into_iter()
            .map(into_tape)
            .collect()
    }

    async fn init(
        &self,
        library_identifier: &str,
        library_state: &TapeLibraryState,
    ) -> Result<HashMap<u32, TapeCatalog>, TapeCatalogError> {
        self.reconcile(library_identifier, library_state).await
    }
}
