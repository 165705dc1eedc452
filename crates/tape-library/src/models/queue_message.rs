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

//! Queue Message Model
//!
//! A queue message is the durable record of one job (or, for the catalog,
//! one cartridge). The repository persists the metadata in columns and the
//! payload as a JSON-serialized tagged union; the payload variant decides the
//! message type, so there is no separate type registry to keep in sync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::order::{Order, ReadOrder, WriteOrder};
use super::tape_catalog::TapeCatalog;

/// Lifecycle state of a queue message.
///
/// `READY → RUNNING → COMPLETED | ERROR`, and `ERROR → READY` to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueState {
    #[default]
    Ready,
    Running,
    Completed,
    Error,
}

impl QueueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Ready => "READY",
            QueueState::Running => "RUNNING",
            QueueState::Completed => "COMPLETED",
            QueueState::Error => "ERROR",
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READY" => Ok(QueueState::Ready),
            "RUNNING" => Ok(QueueState::Running),
            "COMPLETED" => Ok(QueueState::Completed),
            "ERROR" => Ok(QueueState::Error),
            other => Err(format!("unknown queue state '{}'", other)),
        }
    }
}

/// Discriminator of the payload carried by a queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueMessageType {
    ReadOrder,
    WriteOrder,
    TapeCatalog,
}

impl QueueMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueMessageType::ReadOrder => "ReadOrder",
            QueueMessageType::WriteOrder => "WriteOrder",
            QueueMessageType::TapeCatalog => "TapeCatalog",
        }
    }

    /// Message types that represent work for a drive.
    pub fn orders() -> [QueueMessageType; 2] {
        [QueueMessageType::ReadOrder, QueueMessageType::WriteOrder]
    }
}

impl fmt::Display for QueueMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueMessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ReadOrder" => Ok(QueueMessageType::ReadOrder),
            "WriteOrder" => Ok(QueueMessageType::WriteOrder),
            "TapeCatalog" => Ok(QueueMessageType::TapeCatalog),
            other => Err(format!("unknown message type '{}'", other)),
        }
    }
}

/// Type-specific content of a queue message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueuePayload {
    ReadOrder(ReadOrder),
    WriteOrder(WriteOrder),
    TapeCatalog(TapeCatalog),
}

impl QueuePayload {
    pub fn message_type(&self) -> QueueMessageType {
        match self {
            QueuePayload::ReadOrder(_) => QueueMessageType::ReadOrder,
            QueuePayload::WriteOrder(_) => QueueMessageType::WriteOrder,
            QueuePayload::TapeCatalog(_) => QueueMessageType::TapeCatalog,
        }
    }

    /// Returns the order carried by this payload, if it is one.
    pub fn into_order(self) -> Option<Order> {
        match self {
            QueuePayload::ReadOrder(order) => Some(Order::Read(order)),
            QueuePayload::WriteOrder(order) => Some(Order::Write(order)),
            QueuePayload::TapeCatalog(_) => None,
        }
    }
}

impl From<ReadOrder> for QueuePayload {
    fn from(order: ReadOrder) -> Self {
        QueuePayload::ReadOrder(order)
    }
}

impl From<WriteOrder> for QueuePayload {
    fn from(order: WriteOrder) -> Self {
        QueuePayload::WriteOrder(order)
    }
}

impl From<Order> for QueuePayload {
    fn from(order: Order) -> Self {
        match order {
            Order::Read(order) => QueuePayload::ReadOrder(order),
            Order::Write(order) => QueuePayload::WriteOrder(order),
        }
    }
}

/// A persisted queue message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Unique identifier
    pub id: Uuid,
    /// Current lifecycle state
    pub state: QueueState,
    /// Scheduling priority; lower values are received first
    pub priority: i32,
    /// Insertion time (epoch millis)
    pub created: i64,
    /// Time of the last state transition (epoch millis)
    pub last_update: i64,
    /// Type-specific content
    pub payload: QueuePayload,
}

impl QueueMessage {
    /// Creates a `READY` message with priority 0.
    pub fn new(payload: impl Into<QueuePayload>) -> Self {
        let now = super::now_millis();
        Self {
            id: Uuid::new_v4(),
            state: QueueState::Ready,
            priority: 0,
            created: now,
            last_update: now,
            payload: payload.into(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn message_type(&self) -> QueueMessageType {
        self.payload.message_type()
    }
}

impl From<TapeCatalog> for QueueMessage {
    fn from(tape: TapeCatalog) -> Self {
        Self {
            id: tape.id,
            state: tape.state,
            priority: 0,
            created: tape.created,
            last_update: tape.last_update,
            payload: QueuePayload::TapeCatalog(tape),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_tagged_by_type() {
        let message = QueueMessage::new(ReadOrder {
            tape_code: "TAPE01L6".to_string(),
            file_position: 3,
            archive_id: "archive-1.tar".to_string(),
            bucket: "objects".to_string(),
            file_bucket_id: "objects-0".to_string(),
            size: 1024,
        });

        let json = serde_json::to_value(&message.payload).unwrap();
        assert_eq!(json["type"], "ReadOrder");
        assert_eq!(json["tape_code"], "TAPE01L6");
        assert_eq!(message.message_type(), QueueMessageType::ReadOrder);
        assert_eq!(message.state, QueueState::Ready);
    }

    #[test]
    fn test_state_strings_match_storage_format() {
        for state in [
            QueueState::Ready,
            QueueState::Running,
            QueueState::Completed,
            QueueState::Error,
        ] {
            assert_eq!(state.as_str().parse::<QueueState>().unwrap(), state);
        }
        assert!("DONE".parse::<QueueState>().is_err());
    }

    #[test]
    fn test_catalog_payload_is_not_an_order() {
        let tape = TapeCatalog::new("TAPE02L6", "lib-1");
        let message = QueueMessage::from(tape.clone());
        assert_eq!(message.id, tape.id);
        assert_eq!(message.message_type(), QueueMessageType::TapeCatalog);
        assert!(message.payload.into_order().is_none());
    }
}
