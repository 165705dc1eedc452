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

//! Typed filters and updates for queue operations.
//!
//! Filters only reach the projection columns the store extracts from each
//! payload (`tape_code`, `bucket`, `library`, `drive_index`, `tape_state`,
//! `reference`), which keeps every query indexable and type-checked.

use crate::models::{QueueMessage, QueueMessageType, QueuePayload, QueueState, TapeState};

/// How the `bucket` projection must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketFilter {
    /// Exactly this bucket
    Is(String),
    /// This bucket, or no bucket assigned yet
    IsOrUnassigned(String),
    /// No bucket assigned
    Unassigned,
}

/// Extra criteria for receive, find and conditional insert.
///
/// Every set field must match; unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueFilter {
    pub tape_code: Option<String>,
    pub bucket: Option<BucketFilter>,
    pub library: Option<String>,
    pub tape_states: Vec<TapeState>,
    /// `Some(true)` for cartridges in a drive, `Some(false)` for the rest
    pub mounted: Option<bool>,
    pub drive_index: Option<u32>,
    pub reference: Option<String>,
    pub states: Vec<QueueState>,
    /// Tape codes to leave out; messages without a tape code still match
    pub excluded_tape_codes: Vec<String>,
    /// Buckets to leave out; messages without a bucket still match
    pub excluded_buckets: Vec<String>,
}

impl QueueFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tape_code(mut self, value: impl Into<String>) -> Self {
        self.tape_code = Some(value.into());
        self
    }

    pub fn bucket(mut self, value: BucketFilter) -> Self {
        self.bucket = Some(value);
        self
    }

    pub fn library(mut self, value: impl Into<String>) -> Self {
        self.library = Some(value.into());
        self
    }

    pub fn tape_state(mut self, value: TapeState) -> Self {
        self.tape_states.push(value);
        self
    }

    pub fn mounted(mut self, value: bool) -> Self {
        self.mounted = Some(value);
        self
    }

    pub fn drive_index(mut self, value: u32) -> Self {
        self.drive_index = Some(value);
        self
    }

    pub fn reference(mut self, value: impl Into<String>) -> Self {
        self.reference = Some(value.into());
        self
    }

    pub fn state(mut self, value: QueueState) -> Self {
        self.states.push(value);
        self
    }

    pub fn exclude_tape_codes<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_tape_codes
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn exclude_buckets<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_buckets.extend(values.into_iter().map(Into::into));
        self
    }
}

/// Extra fields set on the message that `receive` hands out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueUpdate {
    pub priority: Option<i32>,
    /// Assigns a bucket to a received catalog entry; ignored for orders
    pub bucket: Option<String>,
}

impl QueueUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, value: i32) -> Self {
        self.priority = Some(value);
        self
    }

    pub fn bucket(mut self, value: impl Into<String>) -> Self {
        self.bucket = Some(value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.priority.is_none() && self.bucket.is_none()
    }

    pub(crate) fn apply(&self, message: &mut QueueMessage) {
        if let Some(priority) = self.priority {
            message.priority = priority;
        }
        if let (Some(bucket), QueuePayload::TapeCatalog(tape)) = (&self.bucket, &mut message.payload)
        {
            tape.bucket = Some(bucket.clone());
        }
    }
}

/// Parameters of a receive call.
///
/// ```rust,ignore
/// let request = ReceiveRequest::new(QueueMessageType::TapeCatalog)
///     .filter(QueueFilter::new().tape_state(TapeState::Empty))
///     .update(QueueUpdate::new().bucket("objects"))
///     .use_priority(false);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub message_type: QueueMessageType,
    pub filter: QueueFilter,
    pub update: QueueUpdate,
    pub use_priority: bool,
}

impl ReceiveRequest {
    /// Receive the oldest message of `message_type` by priority.
    pub fn new(message_type: QueueMessageType) -> Self {
        Self {
            message_type,
            filter: QueueFilter::default(),
            update: QueueUpdate::default(),
            use_priority: true,
        }
    }

    pub fn filter(mut self, filter: QueueFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn update(mut self, update: QueueUpdate) -> Self {
        self.update = update;
        self
    }

    pub fn use_priority(mut self, use_priority: bool) -> Self {
        self.use_priority = use_priority;
        self
    }
}

impl From<QueueMessageType> for ReceiveRequest {
    fn from(message_type: QueueMessageType) -> Self {
        ReceiveRequest::new(message_type)
    }
}
