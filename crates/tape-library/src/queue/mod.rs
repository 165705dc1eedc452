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

//! Durable job queue.
//!
//! [`QueueRepository`] is the contract drive workers and producers depend on.
//! Its only mutual-exclusion mechanism is the store's atomic conditional
//! update inside [`receive`](QueueRepository::receive): two workers can never
//! receive the same job, without any application-level lock.
//!
//! # State machine
//!
//! ```text
//! READY --receive--> RUNNING --complete--> COMPLETED
//!   ^                   |
//!   |                   +--mark_error--> ERROR
//!   +------------mark_ready--------------+
//! ```
//!
//! A `RUNNING` job whose worker died stays `RUNNING` until
//! [`initialize_on_bootstrap`](QueueRepository::initialize_on_bootstrap) or an
//! operator requeues it.

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dal::DAL;
use crate::error::QueueError;
use crate::models::{QueueMessage, QueueMessageType, QueueState};

mod request;

pub use request::{BucketFilter, QueueFilter, QueueUpdate, ReceiveRequest};

/// Contract of the durable queue.
///
/// State-changing operations return the number of messages modified (0 or 1)
/// so callers can detect races and already-removed jobs; an unknown id is
/// never an error.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Inserts a message in the state the caller set (normally `READY`).
    async fn add(&self, message: QueueMessage) -> Result<(), QueueError>;

    /// Inserts `message` unless a message of the same type matches `criteria`.
    ///
    /// Returns `true` if inserted.
    async fn add_if_absent(
        &self,
        criteria: QueueFilter,
        message: QueueMessage,
    ) -> Result<bool, QueueError>;

    async fn remove(&self, id: Uuid) -> Result<usize, QueueError>;

    /// `RUNNING → COMPLETED`.
    async fn complete(&self, id: Uuid) -> Result<usize, QueueError>;

    /// `RUNNING → ERROR`.
    async fn mark_error(&self, id: Uuid) -> Result<usize, QueueError>;

    /// Back to `READY`, e.g. to retry an `ERROR` job.
    async fn mark_ready(&self, id: Uuid) -> Result<usize, QueueError>;

    /// Atomically takes the first `READY` message matching `request`,
    /// flipping it to `RUNNING`.
    async fn receive(&self, request: ReceiveRequest) -> Result<Option<QueueMessage>, QueueError>;

    /// Recovery hook run once at startup; returns the number of messages reset.
    async fn initialize_on_bootstrap(&self) -> Result<usize, QueueError>;

    async fn find_message(&self, id: Uuid) -> Result<Option<QueueMessage>, QueueError>;

    async fn list(
        &self,
        message_type: QueueMessageType,
        filter: QueueFilter,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    async fn count(
        &self,
        message_type: QueueMessageType,
        state: QueueState,
    ) -> Result<i64, QueueError>;
}

/// Convenience forms of `receive`.
#[async_trait]
pub trait QueueRepositoryExt: QueueRepository {
    /// Receives by `(priority, created)`.
    async fn receive_type(
        &self,
        message_type: QueueMessageType,
    ) -> Result<Option<QueueMessage>, QueueError> {
        self.receive(ReceiveRequest::new(message_type)).await
    }

    async fn receive_with_priority(
        &self,
        message_type: QueueMessageType,
        use_priority: bool,
    ) -> Result<Option<QueueMessage>, QueueError> {
        self.receive(ReceiveRequest::new(message_type).use_priority(use_priority))
            .await
    }

    async fn receive_filtered(
        &self,
        filter: QueueFilter,
        message_type: QueueMessageType,
    ) -> Result<Option<QueueMessage>, QueueError> {
        self.receive(ReceiveRequest::new(message_type).filter(filter))
            .await
    }
}

impl<T: QueueRepository + ?Sized> QueueRepositoryExt for T {}

/// Queue of read and write orders backed by the SQLite store.
#[derive(Clone, Debug)]
pub struct PersistentQueueRepository {
    dal: DAL,
}

impl PersistentQueueRepository {
    pub fn new(dal: DAL) -> Self {
        Self { dal }
    }
}

#[async_trait]
impl QueueRepository for PersistentQueueRepository {
    async fn add(&self, message: QueueMessage) -> Result<(), QueueError> {
        self.dal.queue_message().insert(&message).await?;
        debug!(
            message_id = %message.id,
            message_type = %message.message_type(),
            priority = message.priority,
            "Queue message added"
        );
        Ok(())
    }

    async fn add_if_absent(
        &self,
        criteria: QueueFilter,
        message: QueueMessage,
    ) -> Result<bool, QueueError> {
        let inserted = self
            .dal
            .queue_message()
            .insert_if_absent(criteria, &message)
            .await?;
        if !inserted {
            debug!(message_id = %message.id, "Matching queue message already present, skipped");
        }
        Ok(inserted)
    }

    async fn remove(&self, id: Uuid) -> Result<usize, QueueError> {
        self.dal.queue_message().delete(id).await
    }

    async fn complete(&self, id: Uuid) -> Result<usize, QueueError> {
        self.dal
            .queue_message()
            .update_state(id, QueueState::Completed)
            .await
    }

    async fn mark_error(&self, id: Uuid) -> Result<usize, QueueError> {
        self.dal
            .queue_message()
            .update_state(id, QueueState::Error)
            .await
    }

    async fn mark_ready(&self, id: Uuid) -> Result<usize, QueueError> {
        self.dal
            .queue_message()
            .update_state(id, QueueState::Ready)
            .await
    }

    async fn receive(&self, request: ReceiveRequest) -> Result<Option<QueueMessage>, QueueError> {
        self.dal.queue_message().receive(request).await
    }

    /// Orders left `RUNNING` by a previous process go back to `READY`.
    async fn initialize_on_bootstrap(&self) -> Result<usize, QueueError> {
        let reset = self
            .dal
            .queue_message()
            .reset_running(QueueMessageType::orders().to_vec(), false)
            .await?;
        if reset > 0 {
            info!("Requeued {} orphaned running order(s)", reset);
        }
        Ok(reset)
    }

    async fn find_message(&self, id: Uuid) -> Result<Option<QueueMessage>, QueueError> {
        self.dal.queue_message().find_by_id(id).await
    }

    async fn list(
        &self,
        message_type: QueueMessageType,
        filter: QueueFilter,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        self.dal.queue_message().list(message_type, filter).await
    }

    async fn count(
        &self,
        message_type: QueueMessageType,
        state: QueueState,
    ) -> Result<i64, QueueError> {
        self.dal.queue_message().count(message_type, state).await
    }
}
