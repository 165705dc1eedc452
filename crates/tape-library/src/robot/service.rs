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

//! Media changer control.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::parser::parse_status;
use super::process::{ProcessExecutor, ProcessOutput};
use crate::config::RobotConfig;
use crate::error::RobotError;
use crate::models::{StatusCode, TapeLibraryState, TapeResponse};

/// Wrapper around the changer controller (`mtx`).
///
/// The changer is one mechanical arm, so every command holds an internal
/// mutex for the whole lifetime of the controller process: a load issued by
/// one drive waits for an unload in progress on another.
pub struct TapeRobotService {
    config: RobotConfig,
    executor: Arc<dyn ProcessExecutor>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for TapeRobotService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapeRobotService")
            .field("device", &self.config.device)
            .field("controller_path", &self.config.controller_path)
            .finish()
    }
}

impl TapeRobotService {
    pub fn new(config: RobotConfig, executor: Arc<dyn ProcessExecutor>) -> Self {
        Self {
            config,
            executor,
            lock: Mutex::new(()),
        }
    }

    pub fn device(&self) -> &str {
        &self.config.device
    }

    /// Reports the drives and storage elements of the library.
    ///
    /// Output that cannot be parsed turns an exit code of 0 into `KO`.
    pub async fn status(&self) -> TapeResponse<TapeLibraryState> {
        let output = self.run("status", &[]).await;

        match StatusCode::from_exit_code(output.exit_code) {
            StatusCode::Ok => match parse_status(&output.stdout) {
                Ok(state) => TapeResponse::ok(state),
                Err(e) => {
                    error!(device = %self.config.device, error = %e, "Unparsable changer status");
                    TapeResponse::failure(StatusCode::Ko, e.to_string())
                }
            },
            status => self.failure(status, "status", output),
        }
    }

    /// Moves the cartridge of storage element `slot_index` into drive `drive_index`.
    pub async fn load_tape(
        &self,
        slot_index: u32,
        drive_index: u32,
    ) -> Result<TapeResponse, RobotError> {
        self.move_tape("load", slot_index, drive_index).await
    }

    /// Moves the cartridge of drive `drive_index` back to storage element `slot_index`.
    pub async fn unload_tape(
        &self,
        slot_index: u32,
        drive_index: u32,
    ) -> Result<TapeResponse, RobotError> {
        self.move_tape("unload", slot_index, drive_index).await
    }

    async fn move_tape(
        &self,
        command: &str,
        slot_index: u32,
        drive_index: u32,
    ) -> Result<TapeResponse, RobotError> {
        // Storage elements are numbered from 1
        if slot_index == 0 {
            return Err(RobotError::InvalidSlotIndex(slot_index));
        }

        let output = self
            .run(command, &[slot_index.to_string(), drive_index.to_string()])
            .await;

        Ok(match StatusCode::from_exit_code(output.exit_code) {
            StatusCode::Ok => {
                info!(
                    device = %self.config.device,
                    slot_index,
                    drive_index,
                    "Changer {} done",
                    command
                );
                TapeResponse::ok(())
            }
            status => self.failure(status, command, output),
        })
    }

    async fn run(&self, command: &str, args: &[String]) -> ProcessOutput {
        let mut full_args = vec![
            "-f".to_string(),
            self.config.device.clone(),
            command.to_string(),
        ];
        full_args.extend_from_slice(args);

        let _guard = self.lock.lock().await;
        self.executor
            .execute(
                &self.config.controller_path,
                self.config.use_sudo,
                self.config.timeout(),
                &full_args,
            )
            .await
    }

    fn failure<T>(&self, status: StatusCode, command: &str, output: ProcessOutput) -> TapeResponse<T> {
        let message = if output.stderr.trim().is_empty() {
            output.stdout.trim().to_string()
        } else {
            output.stderr.trim().to_string()
        };

        if status == StatusCode::Warning {
            warn!(
                device = %self.config.device,
                exit_code = output.exit_code,
                "Changer {} interrupted: {}",
                command,
                message
            );
        } else {
            error!(
                device = %self.config.device,
                exit_code = output.exit_code,
                "Changer {} failed: {}",
                command,
                message
            );
        }

        TapeResponse::failure(status, message)
    }
}
