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

//! Per-drive workers and the manager that owns them.

mod activity;
mod config;
mod consumer;
mod distributor;
mod drive_worker;
mod manager;
mod task;
pub mod tasks;

pub use activity::DriveActivity;
pub use config::{TapeDriveWorkerManagerConfig, TapeDriveWorkerManagerConfigBuilder};
pub use consumer::TapeDriveOrderConsumer;
pub use distributor::{WorkDistributor, WorkListener};
pub use drive_worker::TapeDriveWorker;
pub use manager::TapeDriveWorkerManager;
pub use task::{ReadWriteResult, ReadWriteTask, ReadWriteTaskFactory};
pub use tasks::DefaultReadWriteTaskFactory;
