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

//! Diesel row models for the queue store.
//!
//! Rows are converted to and from [`QueueMessage`] at the DAL boundary. The
//! payload is stored as JSON; the filterable fields are copied into
//! projection columns on every write so they never drift from the payload.

use diesel::prelude::*;
use uuid::Uuid;

use crate::database::schema::queue_messages;
use crate::error::QueueError;
use crate::models::{QueueMessage, QueuePayload};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = queue_messages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QueueMessageRow {
    pub seq: i64,
    pub id: String,
    pub message_type: String,
    pub state: String,
    pub priority: i32,
    pub created: i64,
    pub last_update: i64,
    pub tape_code: Option<String>,
    pub bucket: Option<String>,
    pub library: Option<String>,
    pub drive_index: Option<i32>,
    pub tape_state: Option<String>,
    pub reference: Option<String>,
    pub payload: String,
}

/// Full column set of a message, used for inserts and whole-row overwrites.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = queue_messages)]
#[diesel(treat_none_as_null = true)]
pub struct NewQueueMessageRow {
    pub id: String,
    pub message_type: String,
    pub state: String,
    pub priority: i32,
    pub created: i64,
    pub last_update: i64,
    pub tape_code: Option<String>,
    pub bucket: Option<String>,
    pub library: Option<String>,
    pub drive_index: Option<i32>,
    pub tape_state: Option<String>,
    pub reference: Option<String>,
    pub payload: String,
}

impl NewQueueMessageRow {
    pub fn from_message(message: &QueueMessage) -> Result<Self, QueueError> {
        let mut row = Self {
            id: message.id.to_string(),
            message_type: message.message_type().as_str().to_string(),
            state: message.state.as_str().to_string(),
            priority: message.priority,
            created: message.created,
            last_update: message.last_update,
            tape_code: None,
            bucket: None,
            library: None,
            drive_index: None,
            tape_state: None,
            reference: None,
            payload: String::new(),
        };

        match &message.payload {
            QueuePayload::ReadOrder(order) => {
                row.tape_code = Some(order.tape_code.clone());
                row.bucket = Some(order.bucket.clone());
                row.reference = Some(order.archive_id.clone());
                row.payload = serde_json::to_string(&message.payload)?;
            }
            QueuePayload::WriteOrder(order) => {
                row.bucket = Some(order.bucket.clone());
                row.reference = Some(order.archive_id.clone());
                row.payload = serde_json::to_string(&message.payload)?;
            }
            QueuePayload::TapeCatalog(tape) => {
                // Queue metadata lives in columns; keep the embedded copy in step
                let mut tape = tape.clone();
                tape.id = message.id;
                tape.state = message.state;
                tape.created = message.created;
                tape.last_update = message.last_update;

                row.tape_code = Some(tape.code.clone());
                row.bucket = tape.bucket.clone();
                row.library = Some(tape.library.clone());
                row.drive_index = tape.drive_index().map(|index| index as i32);
                row.tape_state = Some(tape.tape_state.as_str().to_string());
                row.payload = serde_json::to_string(&QueuePayload::TapeCatalog(tape))?;
            }
        }

        Ok(row)
    }
}

impl QueueMessageRow {
    pub fn into_message(self) -> Result<QueueMessage, QueueError> {
        let invalid = |reason: String| QueueError::InvalidRecord {
            id: self.id.clone(),
            reason,
        };

        let id = Uuid::parse_str(&self.id).map_err(|e| invalid(e.to_string()))?;
        let state = self.state.parse().map_err(invalid)?;
        let mut payload: QueuePayload = serde_json::from_str(&self.payload)?;

        if payload.message_type().as_str() != self.message_type {
            return Err(invalid(format!(
                "payload type {} does not match message type {}",
                payload.message_type(),
                self.message_type
            )));
        }

        if let QueuePayload::TapeCatalog(tape) = &mut payload {
            tape.id = id;
            tape.state = state;
            tape.created = self.created;
            tape.last_update = self.last_update;
        }

        Ok(QueueMessage {
            id,
            state,
            priority: self.priority,
            created: self.created,
            last_update: self.last_update,
            payload,
        })
    }
}
