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

//! Test fixtures for the tape library integration tests.
//!
//! Every test gets its own SQLite file in a temporary directory, so tests can
//! run in parallel without sharing queue state. Hardware is replaced by a
//! scripted changer and in-memory drives.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tempfile::TempDir;
use tracing::info;

use tape_library::config::RobotConfig;
use tape_library::drive::{TapeDriveConf, TapeDriveService, TapeDriveStatus};
use tape_library::models::{
    Order, QueueMessage, QueueState, ReadOrder, ReadWritePriority, StatusCode, TapeCatalog,
    TapeResponse, WriteOrder,
};
use tape_library::robot::{ProcessExecutor, ProcessOutput};
use tape_library::worker::{ReadWriteResult, ReadWriteTask, ReadWriteTaskFactory};
use tape_library::{
    Database, PersistentQueueRepository, PersistentTapeCatalogService, TapeLibraryPool,
    TapeRobotPool, TapeRobotService, DAL,
};

static INIT: Once = Once::new();

pub const LIBRARY: &str = "lib-1";

/// Changer status with two drives, drive 0 holding the cartridge of slot 2.
pub const STATUS: &str = "  Storage Changer /dev/sg1:2 Drives, 4 Slots ( 1 Import/Export )
Data Transfer Element 0:Full (Storage Element 2 Loaded):VolumeTag = TAPE02L6
Data Transfer Element 1:Empty
      Storage Element 1:Full :VolumeTag=TAPE01L6
      Storage Element 2:Empty
      Storage Element 3:Full :VolumeTag=TAPE03L6
      Storage Element 4 IMPORT/EXPORT:Full :VolumeTag=TAPE04L6
";

/// A freshly migrated queue database.
pub struct TestFixture {
    _dir: TempDir,
    database: Database,
}

impl TestFixture {
    pub async fn new() -> Self {
        INIT.call_once(|| {
            tape_library::init_logging(None);
        });

        let dir = tempfile::tempdir().expect("Failed to create temporary directory");
        let path = dir.path().join("queue.db");
        let database = Database::new(path.to_str().expect("utf-8 temp path"))
            .expect("Failed to create database");
        database
            .run_migrations()
            .await
            .expect("Failed to run migrations");

        info!("Test fixture created at {}", path.display());

        Self {
            _dir: dir,
            database,
        }
    }

    pub fn get_dal(&self) -> DAL {
        DAL::new(self.database.clone())
    }

    pub fn queue(&self) -> Arc<PersistentQueueRepository> {
        Arc::new(PersistentQueueRepository::new(self.get_dal()))
    }

    pub fn catalog(&self) -> Arc<PersistentTapeCatalogService> {
        Arc::new(PersistentTapeCatalogService::new(self.get_dal()))
    }
}

pub fn read_order(tape_code: &str, file_position: i32) -> QueueMessage {
    QueueMessage::new(ReadOrder {
        tape_code: tape_code.to_string(),
        file_position,
        archive_id: format!("{}-{}.tar", tape_code, file_position),
        bucket: "objects".to_string(),
        file_bucket_id: format!("objects-{}", file_position),
        size: 1024,
    })
}

pub fn write_order(bucket: &str, archive_id: &str) -> QueueMessage {
    QueueMessage::new(WriteOrder {
        bucket: bucket.to_string(),
        file_bucket_id: format!("{}-{}", bucket, archive_id),
        archive_id: archive_id.to_string(),
        file_path: format!("/var/lib/tape/input/{}", archive_id),
        size: 1024,
        digest: "sha256:0".to_string(),
    })
}

pub fn tape(code: &str) -> TapeCatalog {
    TapeCatalog::new(code, LIBRARY)
}

/// Changer controller answering every command with the same exit code.
pub struct FakeChanger {
    pub exit_code: i32,
    pub stdout: String,
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl FakeChanger {
    pub fn new(exit_code: i32, stdout: &str) -> Arc<Self> {
        Arc::new(Self {
            exit_code,
            stdout: stdout.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ProcessExecutor for FakeChanger {
    async fn execute(
        &self,
        _command_path: &str,
        _use_sudo: bool,
        _timeout: Duration,
        args: &[String],
    ) -> ProcessOutput {
        self.calls.lock().push(args.to_vec());
        ProcessOutput {
            exit_code: self.exit_code,
            stdout: self.stdout.clone(),
            stderr: if self.exit_code == 0 {
                String::new()
            } else {
                "scripted failure".to_string()
            },
        }
    }
}

pub fn robot_pool(changer: Arc<FakeChanger>) -> TapeRobotPool {
    let config = RobotConfig {
        device: "/dev/sg1".to_string(),
        ..RobotConfig::default()
    };
    TapeRobotPool::new(LIBRARY, vec![TapeRobotService::new(config, changer)])
}

/// Drive that accepts every command without touching any device.
pub struct FakeDrive {
    conf: TapeDriveConf,
    has_tape: AtomicBool,
}

impl FakeDrive {
    pub fn new(index: u32, read_write_priority: ReadWritePriority) -> Arc<Self> {
        Arc::new(Self {
            conf: TapeDriveConf {
                index,
                device: format!("/dev/nst{}", index),
                read_write_priority,
            },
            has_tape: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl TapeDriveService for FakeDrive {
    fn conf(&self) -> &TapeDriveConf {
        &self.conf
    }

    async fn status(&self) -> TapeResponse<TapeDriveStatus> {
        TapeResponse::ok(TapeDriveStatus {
            has_tape: self.has_tape.load(Ordering::SeqCst),
            end_of_tape: false,
            file_number: Some(0),
        })
    }

    async fn rewind(&self) -> TapeResponse {
        TapeResponse::ok(())
    }

    async fn go_to_position(&self, _position: i32) -> TapeResponse {
        TapeResponse::ok(())
    }

    async fn write_file(&self, _source: &Path) -> TapeResponse {
        TapeResponse::ok(())
    }

    async fn read_file(&self, _destination: &Path) -> TapeResponse {
        TapeResponse::ok(())
    }

    async fn eject(&self) -> TapeResponse {
        self.has_tape.store(false, Ordering::SeqCst);
        TapeResponse::ok(())
    }
}

/// A library of fake drives sharing one scripted changer.
pub fn library(drives: &[(u32, ReadWritePriority)]) -> TapeLibraryPool {
    let drives = drives
        .iter()
        .map(|(index, priority)| FakeDrive::new(*index, *priority) as Arc<dyn TapeDriveService>)
        .collect();
    TapeLibraryPool::new(robot_pool(FakeChanger::new(0, STATUS)), drives)
}

/// Task factory whose tasks sleep, then report a fixed outcome.
///
/// Every order handed to the factory is recorded with the drive it ran on.
pub struct RecordingTaskFactory {
    pub status: StatusCode,
    pub order_state: QueueState,
    pub delay: Duration,
    pub created: AtomicUsize,
    pub orders: Mutex<Vec<(u32, Order)>>,
}

impl RecordingTaskFactory {
    pub fn new(status: StatusCode, order_state: QueueState, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            status,
            order_state,
            delay,
            created: AtomicUsize::new(0),
            orders: Mutex::new(Vec::new()),
        })
    }

    pub fn completing() -> Arc<Self> {
        Self::new(StatusCode::Ok, QueueState::Completed, Duration::ZERO)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::new(StatusCode::Ok, QueueState::Completed, delay)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

struct RecordedTask {
    result: ReadWriteResult,
    delay: Duration,
}

#[async_trait]
impl ReadWriteTask for RecordedTask {
    async fn run(self: Box<Self>) -> ReadWriteResult {
        tokio::time::sleep(self.delay).await;
        self.result
    }
}

impl ReadWriteTaskFactory for RecordingTaskFactory {
    fn create(
        &self,
        order: Order,
        current_tape: Option<TapeCatalog>,
        _robot_pool: TapeRobotPool,
        drive: Arc<dyn TapeDriveService>,
    ) -> Box<dyn ReadWriteTask> {
        self.orders.lock().push((drive.conf().index, order));
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(RecordedTask {
            result: ReadWriteResult {
                status: self.status,
                order_state: self.order_state,
                current_tape,
                error_code: None,
                message: None,
            },
            delay: self.delay,
        })
    }
}

/// Polls `condition` every 10 ms until it holds or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
