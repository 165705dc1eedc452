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

//! # Tape Library
//!
//! Storage backend for a robotic tape library: a durable order queue, a
//! catalog of physical cartridges, mediation of the media changer, and one
//! worker thread per tape drive.
//!
//! ## Components
//!
//! - [`queue`]: durable queue with atomic `READY → RUNNING` receive
//! - [`catalog`]: cartridge registry layered on the queue, reconciled with the robot at startup
//! - [`robot`]: changer control (`mtx`) with serialized access
//! - [`library`]: the pool of drives and robots that makes up one library
//! - [`worker`]: per-drive workers, their read/write tasks and the manager that owns them
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use tape_library::{Database, DAL};
//! use tape_library::queue::{PersistentQueueRepository, QueueRepository};
//!
//! let database = Database::new("sqlite:///var/lib/tape/queue.db")?;
//! database.run_migrations().await?;
//! let queue = PersistentQueueRepository::new(DAL::new(database));
//! queue.initialize_on_bootstrap().await?;
//! ```

use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub mod catalog;
pub mod config;
pub mod dal;
pub mod database;
pub mod drive;
pub mod error;
pub mod library;
pub mod models;
pub mod queue;
pub mod robot;
pub mod worker;

pub use catalog::{PersistentTapeCatalogService, TapeCatalogService};
pub use config::TapeLibraryConfig;
pub use dal::DAL;
pub use database::Database;
pub use error::{
    ConfigError, DatabaseError, QueueError, ReadWriteError, RobotError, TapeCatalogError,
    WorkerError,
};
pub use library::TapeLibraryPool;
pub use models::{
    Order, QueueMessage, QueueMessageType, QueuePayload, QueueState, ReadOrder,
    ReadWritePriority, StatusCode, TapeCatalog, TapeLibraryState, WriteOrder,
};
pub use queue::{PersistentQueueRepository, QueueFilter, QueueRepository, QueueUpdate, ReceiveRequest};
pub use robot::{TapeRobotPool, TapeRobotService};
pub use worker::{TapeDriveWorker, TapeDriveWorkerManager, TapeDriveWorkerManagerConfig};

static LOGGING: Once = Once::new();

/// Installs a global `tracing` subscriber.
///
/// `level` is used as the filter directive when given; otherwise `RUST_LOG`
/// is honored, falling back to `info`. Only the first call has any effect,
/// and a subscriber installed elsewhere is left in place.
pub fn init_logging(level: Option<&str>) {
    LOGGING.call_once(|| {
        let filter = match level {
            Some(directive) => EnvFilter::new(directive),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };

        let _ = tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init();
    });
}
