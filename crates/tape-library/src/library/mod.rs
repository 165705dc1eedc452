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

//! The hardware of one library: its robots and its drives.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::TapeLibraryConfig;
use crate::drive::TapeDriveService;
use crate::error::RobotError;
use crate::robot::{ProcessExecutor, TapeRobotPool, TapeRobotService};

/// Robots and drives of one library.
///
/// Each drive is served by exactly one worker; the robot pool is shared by
/// all of them.
#[derive(Clone)]
pub struct TapeLibraryPool {
    robot_pool: TapeRobotPool,
    drives: BTreeMap<u32, Arc<dyn TapeDriveService>>,
}

impl std::fmt::Debug for TapeLibraryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapeLibraryPool")
            .field("library_identifier", &self.library_identifier())
            .field("drives", &self.drives.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TapeLibraryPool {
    /// Drives are keyed by their configured index; a later drive with the
    /// same index replaces an earlier one.
    pub fn new(robot_pool: TapeRobotPool, drives: Vec<Arc<dyn TapeDriveService>>) -> Self {
        let drives = drives
            .into_iter()
            .map(|drive| (drive.conf().index, drive))
            .collect();
        Self { robot_pool, drives }
    }

    pub fn library_identifier(&self) -> &str {
        self.robot_pool.library_identifier()
    }

    pub fn robot_pool(&self) -> &TapeRobotPool {
        &self.robot_pool
    }

    pub fn drive(&self, index: u32) -> Result<Arc<dyn TapeDriveService>, RobotError> {
        self.drives
            .get(&index)
            .cloned()
            .ok_or(RobotError::UnknownDrive(index))
    }

    /// Drives in index order.
    pub fn drives(&self) -> impl Iterator<Item = &Arc<dyn TapeDriveService>> {
        self.drives.values()
    }

    pub fn drive_count(&self) -> usize {
        self.drives.len()
    }
}

/// Builds the robot pool of the configured library.
pub fn robot_pool_from_config(
    config: &TapeLibraryConfig,
    executor: Arc<dyn ProcessExecutor>,
) -> TapeRobotPool {
    TapeRobotPool::new(
        config.library_identifier.clone(),
        vec![TapeRobotService::new(config.robot.clone(), executor)],
    )
}
