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

//! Shared access to the robots of one library.
//!
//! `RobotToken` wraps a semaphore permit together with the checked-out robot.
//! While a drive holds the token no other drive can use that robot; dropping
//! the token puts the robot back and releases the permit.
//!
//! # Lifecycle
//!
//! 1. A drive calls [`TapeRobotPool::checkout`], waiting while every robot is in use
//! 2. The token derefs to the [`TapeRobotService`] for status, load and unload
//! 3. Dropping the token returns the robot to the pool

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::service::TapeRobotService;
use crate::error::RobotError;

type Robots = Arc<Mutex<VecDeque<Arc<TapeRobotService>>>>;

/// Pool of changer robots of one library, cheap to clone.
#[derive(Clone, Debug)]
pub struct TapeRobotPool {
    library_identifier: String,
    semaphore: Arc<Semaphore>,
    robots: Robots,
}

impl TapeRobotPool {
    pub fn new(library_identifier: impl Into<String>, robots: Vec<TapeRobotService>) -> Self {
        let robots: VecDeque<_> = robots.into_iter().map(Arc::new).collect();
        Self {
            library_identifier: library_identifier.into(),
            semaphore: Arc::new(Semaphore::new(robots.len())),
            robots: Arc::new(Mutex::new(robots)),
        }
    }

    pub fn library_identifier(&self) -> &str {
        &self.library_identifier
    }

    /// Number of robots not checked out.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free robot and takes it.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::PoolClosed`] once [`close`](Self::close) was called.
    pub async fn checkout(&self) -> Result<RobotToken, RobotError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RobotError::PoolClosed)?;

        // One permit per queued robot
        let robot = self
            .robots
            .lock()
            .pop_front()
            .ok_or(RobotError::PoolClosed)?;

        Ok(RobotToken {
            robot: Some(robot),
            robots: self.robots.clone(),
            _permit: permit,
        })
    }

    /// Fails pending and future checkouts; tokens already held stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// Exclusive use of one robot, returned to the pool on drop.
pub struct RobotToken {
    robot: Option<Arc<TapeRobotService>>,
    robots: Robots,
    _permit: OwnedSemaphorePermit,
}

impl Deref for RobotToken {
    type Target = TapeRobotService;

    fn deref(&self) -> &Self::Target {
        match &self.robot {
            Some(robot) => robot,
            None => unreachable!("robot is only taken on drop"),
        }
    }
}

impl Drop for RobotToken {
    fn drop(&mut self) {
        // Put the robot back before the permit is released
        if let Some(robot) = self.robot.take() {
            self.robots.lock().push_back(robot);
        }
    }
}
