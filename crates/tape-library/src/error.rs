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

//! Error types for the tape library.
//!
//! Persistence failures are always errors. Changer command failures are not:
//! they come back as a [`StatusCode`](crate::models::StatusCode) on the
//! response so orchestration code can branch on them.

use thiserror::Error;
use uuid::Uuid;

use crate::models::StatusCode;

/// Errors raised while building the connection pool or migrating the schema.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The connection pool could not be built.
    #[error("Failed to create connection pool: {0}")]
    Pool(String),

    /// A connection could not be obtained or the blocking call failed.
    #[error("Connection pool error: {0}")]
    Connection(String),

    /// Pending migrations could not be applied.
    #[error("Failed to run migrations: {0}")]
    Migration(String),
}

/// Failure of a queue operation (add, remove, state transition, receive).
///
/// Always propagated to the caller; the repository never retries on its own.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be mapped back to a queue message.
    #[error("Invalid queue record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },
}

/// Catalog-specific persistence or robot-communication failure.
#[derive(Debug, Error)]
pub enum TapeCatalogError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Tape catalog entry not found: {0}")]
    NotFound(Uuid),

    #[error("A tape catalog entry already exists for code '{0}'")]
    AlreadyExists(String),

    /// The stored message is not a catalog entry.
    #[error("Queue message {0} does not hold a tape catalog entry")]
    NotACatalogEntry(Uuid),

    /// The robot could not report the library state.
    #[error("Robot status returned {status:?}: {message}")]
    Robot { status: StatusCode, message: String },
}

/// Precondition violations on changer commands.
///
/// These are rejected before the controller process is spawned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RobotError {
    #[error("Invalid slot index {0}: storage elements are numbered from 1")]
    InvalidSlotIndex(u32),

    #[error("Drive index {0} is not managed by this library")]
    UnknownDrive(u32),

    /// The robot pool was closed while waiting for a robot.
    #[error("Robot pool is closed")]
    PoolClosed,
}

/// Failure classes of a read/write task.
///
/// Each code decides how the order and the cartridge are left behind; see
/// [`ReadWriteError::order_outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadWriteErrorCode {
    FileNotFound,
    TapeNotFoundInCatalog,
    TapeReservedElsewhere,
    TapeLocationConflict,
    NoEmptySlotFound,
    KoOnLoadTape,
    KoOnUnloadTape,
    KoOnRewindTape,
    KoOnGotoPosition,
    KoOnWriteToTape,
    KoOnReadFromTape,
    KoOnReadLabel,
    /// The label on the medium does not identify the catalog entry
    KoLabelDiscording,
    KoOnEndOfTape,
    KoOnEject,
    KoOnStatus,
    KoDbPersist,
    InternalError,
}

/// Error raised inside a read/write task.
#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct ReadWriteError {
    pub code: ReadWriteErrorCode,
    pub message: String,
}

impl ReadWriteError {
    pub fn new(code: ReadWriteErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Status and order state reported for this failure.
    ///
    /// Hardware and persistence failures leave the order `READY` so another
    /// attempt can pick it up, but report `FATAL` so the drive stops serving.
    /// A missing input file can never succeed and fails the order.
    pub fn order_outcome(&self) -> (StatusCode, crate::models::QueueState) {
        use crate::models::QueueState;
        match self.code {
            ReadWriteErrorCode::TapeReservedElsewhere | ReadWriteErrorCode::TapeNotFoundInCatalog => {
                (StatusCode::Warning, QueueState::Ready)
            }
            ReadWriteErrorCode::FileNotFound | ReadWriteErrorCode::InternalError => {
                (StatusCode::Fatal, QueueState::Error)
            }
            _ => (StatusCode::Fatal, QueueState::Ready),
        }
    }
}

impl From<QueueError> for ReadWriteError {
    fn from(e: QueueError) -> Self {
        ReadWriteError::new(ReadWriteErrorCode::KoDbPersist, e.to_string())
    }
}

impl From<TapeCatalogError> for ReadWriteError {
    fn from(e: TapeCatalogError) -> Self {
        ReadWriteError::new(ReadWriteErrorCode::KoDbPersist, e.to_string())
    }
}

/// Errors that stop a drive worker or prevent the manager from starting.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The task reported a fatal status; the drive is no longer served.
    #[error("Drive {drive_index} stopped after a fatal task result: {message}")]
    Fatal { drive_index: u32, message: String },

    #[error("Failed to spawn worker thread for drive {drive_index}: {source}")]
    Spawn {
        drive_index: u32,
        #[source]
        source: std::io::Error,
    },

    /// Workers drive their loop on the runtime that created the manager.
    #[error("The worker manager must be created inside a tokio runtime")]
    NoRuntime,
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}
