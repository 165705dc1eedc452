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

//! Read/write task contract.
//!
//! A task receives an order together with the cartridge currently in the
//! drive, moves cartridges through the robot pool as needed, transfers the
//! data and reports what happened. The worker persists the reported order
//! state and keeps the reported cartridge as its current tape.

use async_trait::async_trait;
use std::sync::Arc;

use crate::drive::TapeDriveService;
use crate::error::{ReadWriteError, ReadWriteErrorCode};
use crate::models::{Order, QueueState, StatusCode, TapeCatalog};
use crate::robot::TapeRobotPool;

/// Outcome of one read/write task.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadWriteResult {
    /// `FATAL` stops the worker once the order state is saved
    pub status: StatusCode,
    /// State the order is moved to
    pub order_state: QueueState,
    /// Cartridge left in the drive
    pub current_tape: Option<TapeCatalog>,
    pub error_code: Option<ReadWriteErrorCode>,
    pub message: Option<String>,
}

impl ReadWriteResult {
    pub fn completed(current_tape: Option<TapeCatalog>) -> Self {
        Self {
            status: StatusCode::Ok,
            order_state: QueueState::Completed,
            current_tape,
            error_code: None,
            message: None,
        }
    }

    /// Result for a failed task, classified by the error code.
    pub fn failed(error: &ReadWriteError, current_tape: Option<TapeCatalog>) -> Self {
        let (status, order_state) = error.order_outcome();
        Self {
            status,
            order_state,
            current_tape,
            error_code: Some(error.code),
            message: Some(error.message.clone()),
        }
    }
}

/// One unit of tape work, run once by the worker that received the order.
#[async_trait]
pub trait ReadWriteTask: Send {
    async fn run(self: Box<Self>) -> ReadWriteResult;
}

/// Builds the task executing an order on a drive.
pub trait ReadWriteTaskFactory: Send + Sync {
    fn create(
        &self,
        order: Order,
        current_tape: Option<TapeCatalog>,
        robot_pool: TapeRobotPool,
        drive: Arc<dyn TapeDriveService>,
    ) -> Box<dyn ReadWriteTask>;

    /// Check run once by a worker before it takes orders.
    ///
    /// `current_tape` is the cartridge the catalog places in the drive. A
    /// `FATAL` result keeps the worker from starting. No check by default.
    fn bootstrap(
        &self,
        _current_tape: Option<TapeCatalog>,
        _robot_pool: TapeRobotPool,
        _drive: Arc<dyn TapeDriveService>,
    ) -> Option<Box<dyn ReadWriteTask>> {
        None
    }
}
