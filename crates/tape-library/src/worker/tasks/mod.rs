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

//! Default read and write tasks.
//!
//! Both tasks share [`CartridgeHandler`], which moves reserved cartridges
//! between their storage element and the drive and keeps the catalog in
//! step with every move.
//!
//! A written cartridge carries its [`TapeLabel`] as file 0. The label is
//! written before the first archive and checked every time the cartridge is
//! loaded, and again when a worker starts with the cartridge in its drive.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::task::{ReadWriteTask, ReadWriteTaskFactory};
use crate::catalog::TapeCatalogService;
use crate::drive::TapeDriveService;
use crate::error::{ReadWriteError, ReadWriteErrorCode};
use crate::models::{
    now_millis, Order, QueueState, StatusCode, TapeCatalog, TapeLabel, TapeLocation,
    TapeResponse, TapeState,
};
use crate::robot::TapeRobotPool;

mod bootstrap;
mod read;
mod write;

pub use bootstrap::DriveCheckTask;
pub use read::ReadTask;
pub use write::WriteTask;

/// Builds [`WriteTask`]s and [`ReadTask`]s over one catalog.
pub struct DefaultReadWriteTaskFactory {
    catalog: Arc<dyn TapeCatalogService>,
    output_directory: PathBuf,
}

impl DefaultReadWriteTaskFactory {
    /// Files read back from tape land under `output_directory`, which also
    /// holds the short-lived label files.
    pub fn new(catalog: Arc<dyn TapeCatalogService>, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            output_directory: output_directory.into(),
        }
    }
}

impl std::fmt::Debug for DefaultReadWriteTaskFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultReadWriteTaskFactory")
            .field("output_directory", &self.output_directory)
            .finish()
    }
}

impl ReadWriteTaskFactory for DefaultReadWriteTaskFactory {
    fn create(
        &self,
        order: Order,
        current_tape: Option<TapeCatalog>,
        robot_pool: TapeRobotPool,
        drive: Arc<dyn TapeDriveService>,
    ) -> Box<dyn ReadWriteTask> {
        let handler = self.handler(robot_pool, drive);
        match order {
            Order::Write(order) => Box::new(WriteTask::new(order, current_tape, handler)),
            Order::Read(order) => Box::new(ReadTask::new(
                order,
                current_tape,
                handler,
                self.output_directory.clone(),
            )),
        }
    }

    fn bootstrap(
        &self,
        current_tape: Option<TapeCatalog>,
        robot_pool: TapeRobotPool,
        drive: Arc<dyn TapeDriveService>,
    ) -> Option<Box<dyn ReadWriteTask>> {
        Some(Box::new(DriveCheckTask::new(
            current_tape,
            self.handler(robot_pool, drive),
        )))
    }
}

impl DefaultReadWriteTaskFactory {
    fn handler(&self, robot_pool: TapeRobotPool, drive: Arc<dyn TapeDriveService>) -> CartridgeHandler {
        CartridgeHandler {
            catalog: self.catalog.clone(),
            robot_pool,
            drive,
            scratch_directory: self.output_directory.clone(),
        }
    }
}

fn describe<T>(response: &TapeResponse<T>) -> String {
    match &response.message {
        Some(message) => format!("{:?}: {}", response.status, message),
        None => format!("{:?}", response.status),
    }
}

/// Cartridge moves and catalog bookkeeping of one drive.
pub(crate) struct CartridgeHandler {
    catalog: Arc<dyn TapeCatalogService>,
    robot_pool: TapeRobotPool,
    drive: Arc<dyn TapeDriveService>,
    scratch_directory: PathBuf,
}

impl CartridgeHandler {
    pub(crate) fn drive_index(&self) -> u32 {
        self.drive.conf().index
    }

    pub(crate) fn drive(&self) -> &dyn TapeDriveService {
        self.drive.as_ref()
    }

    pub(crate) fn catalog(&self) -> &dyn TapeCatalogService {
        self.catalog.as_ref()
    }

    pub(crate) fn library_identifier(&self) -> &str {
        self.robot_pool.library_identifier()
    }

    /// Whether the drive reports a cartridge.
    pub(crate) async fn drive_has_tape(&self) -> Result<bool, ReadWriteError> {
        let response = self.drive.status().await;
        match &response.entity {
            Some(status) if response.status == StatusCode::Ok => Ok(status.has_tape),
            _ => Err(ReadWriteError::new(
                ReadWriteErrorCode::KoOnStatus,
                format!("drive {} status: {}", self.drive_index(), describe(&response)),
            )),
        }
    }

    /// Writes the whole entry back to the catalog.
    pub(crate) async fn persist(&self, tape: &mut TapeCatalog) -> Result<(), ReadWriteError> {
        tape.last_update = now_millis();
        self.catalog.replace(tape.clone()).await?;
        Ok(())
    }

    /// Moves a reserved cartridge from its storage element into the drive.
    ///
    /// A load that does not report OK is retried once, unless the drive
    /// already holds the cartridge.
    pub(crate) async fn load(&self, tape: &mut TapeCatalog) -> Result<(), ReadWriteError> {
        let drive_index = self.drive_index();
        let source = match tape.current_location {
            Some(location) if location.is_storage_element() => location,
            other => {
                return Err(ReadWriteError::new(
                    ReadWriteErrorCode::TapeLocationConflict,
                    format!("cartridge {} is not in a storage element: {:?}", tape.code, other),
                ))
            }
        };

        {
            let load_error = |message: String| {
                ReadWriteError::new(ReadWriteErrorCode::KoOnLoadTape, message)
            };
            let robot = self
                .robot_pool
                .checkout()
                .await
                .map_err(|e| load_error(e.to_string()))?;

            let response = robot
                .load_tape(source.index, drive_index)
                .await
                .map_err(|e| load_error(e.to_string()))?;

            if !response.is_ok() {
                warn!(
                    drive_index,
                    tape_code = %tape.code,
                    slot = source.index,
                    "Load did not succeed: {}",
                    describe(&response)
                );
                if !self.drive_has_tape().await? {
                    let retry = robot
                        .load_tape(source.index, drive_index)
                        .await
                        .map_err(|e| load_error(e.to_string()))?;
                    if !retry.is_ok() {
                        return Err(load_error(format!(
                            "load of {} from slot {} failed: {}",
                            tape.code,
                            source.index,
                            describe(&retry)
                        )));
                    }
                }
            }
        }

        tape.previous_location = Some(source);
        tape.current_location = Some(TapeLocation::drive(drive_index));
        tape.current_position = 0;
        tape.state = QueueState::Running;
        self.persist(tape).await?;

        info!(drive_index, tape_code = %tape.code, slot = source.index, "Cartridge loaded");
        Ok(())
    }

    /// Ejects the cartridge and puts it back to its previous storage element.
    ///
    /// The catalog entry is released (`READY`) once the cartridge is back.
    pub(crate) async fn unload(&self, tape: &mut TapeCatalog) -> Result<(), ReadWriteError> {
        let drive_index = self.drive_index();

        let eject = self.drive.eject().await;
        if !eject.is_ok() {
            return Err(ReadWriteError::new(
                ReadWriteErrorCode::KoOnEject,
                format!("eject of {} failed: {}", tape.code, describe(&eject)),
            ));
        }

        let target = match tape.previous_location {
            Some(location) if location.is_storage_element() => location,
            Some(location) => {
                return Err(ReadWriteError::new(
                    ReadWriteErrorCode::TapeLocationConflict,
                    format!("cartridge {} cannot be unloaded to {:?}", tape.code, location),
                ))
            }
            None => {
                return Err(ReadWriteError::new(
                    ReadWriteErrorCode::NoEmptySlotFound,
                    format!("no storage element known for cartridge {}", tape.code),
                ))
            }
        };

        {
            let unload_error = |message: String| {
                ReadWriteError::new(ReadWriteErrorCode::KoOnUnloadTape, message)
            };
            let robot = self
                .robot_pool
                .checkout()
                .await
                .map_err(|e| unload_error(e.to_string()))?;

            let response = robot
                .unload_tape(target.index, drive_index)
                .await
                .map_err(|e| unload_error(e.to_string()))?;

            if !response.is_ok() {
                warn!(
                    drive_index,
                    tape_code = %tape.code,
                    slot = target.index,
                    "Unload did not succeed: {}",
                    describe(&response)
                );
                if self.drive_has_tape().await? {
                    let retry = robot
                        .unload_tape(target.index, drive_index)
                        .await
                        .map_err(|e| unload_error(e.to_string()))?;
                    if !retry.is_ok() {
                        return Err(unload_error(format!(
                            "unload of {} to slot {} failed: {}",
                            tape.code,
                            target.index,
                            describe(&retry)
                        )));
                    }
                }
            }
        }

        tape.current_location = Some(target);
        tape.current_position = 0;
        tape.state = QueueState::Ready;
        self.persist(tape).await?;

        info!(drive_index, tape_code = %tape.code, slot = target.index, "Cartridge unloaded");
        Ok(())
    }

    pub(crate) async fn rewind(&self, tape: &mut TapeCatalog) -> Result<(), ReadWriteError> {
        let response = self.drive.rewind().await;
        if !response.is_ok() {
            return Err(ReadWriteError::new(
                ReadWriteErrorCode::KoOnRewindTape,
                format!("rewind of {} failed: {}", tape.code, describe(&response)),
            ));
        }
        tape.current_position = 0;
        Ok(())
    }

    /// Positions the head at file `position`, skipping the move if already there.
    pub(crate) async fn seek(
        &self,
        tape: &mut TapeCatalog,
        position: i32,
    ) -> Result<(), ReadWriteError> {
        if tape.current_position == position {
            return Ok(());
        }
        let response = self.drive.go_to_position(position).await;
        if !response.is_ok() {
            return Err(ReadWriteError::new(
                ReadWriteErrorCode::KoOnGotoPosition,
                format!(
                    "positioning {} at file {} failed: {}",
                    tape.code,
                    position,
                    describe(&response)
                ),
            ));
        }
        tape.current_position = position;
        Ok(())
    }

    /// Appends `source` as one tape file at the current position.
    ///
    /// A failed write at the end of the medium marks the cartridge `FULL`.
    pub(crate) async fn append(
        &self,
        tape: &mut TapeCatalog,
        source: &Path,
    ) -> Result<(), ReadWriteError> {
        let response = self.drive.write_file(source).await;
        if response.is_ok() {
            return Ok(());
        }
        if self.at_end_of_tape().await? {
            tape.tape_state = TapeState::Full;
            self.persist(tape).await?;
            return Err(ReadWriteError::new(
                ReadWriteErrorCode::KoOnEndOfTape,
                format!("end of tape reached on {}", tape.code),
            ));
        }
        Err(ReadWriteError::new(
            ReadWriteErrorCode::KoOnWriteToTape,
            format!(
                "write of {} to {} failed: {}",
                source.display(),
                tape.code,
                describe(&response)
            ),
        ))
    }

    /// Temporary file for a label on its way to or from the tape.
    async fn label_file(&self) -> Result<PathBuf, ReadWriteError> {
        tokio::fs::create_dir_all(&self.scratch_directory)
            .await
            .map_err(|e| {
                ReadWriteError::new(
                    ReadWriteErrorCode::InternalError,
                    format!("cannot create {}: {}", self.scratch_directory.display(), e),
                )
            })?;
        Ok(self
            .scratch_directory
            .join(format!(".tape-label-{}", Uuid::new_v4())))
    }

    /// Writes the label of a blank cartridge as file 0.
    ///
    /// The head must be at the beginning of the tape.
    pub(crate) async fn write_label(&self, tape: &mut TapeCatalog) -> Result<(), ReadWriteError> {
        let label = TapeLabel::for_tape(tape);
        let bytes = serde_json::to_vec(&label).map_err(|e| {
            ReadWriteError::new(ReadWriteErrorCode::InternalError, e.to_string())
        })?;

        let path = self.label_file().await?;
        tokio::fs::write(&path, &bytes).await.map_err(|e| {
            ReadWriteError::new(
                ReadWriteErrorCode::KoOnWriteToTape,
                format!("cannot stage label of {}: {}", tape.code, e),
            )
        })?;
        let written = self.append(tape, &path).await;
        let _ = tokio::fs::remove_file(&path).await;
        written?;

        tape.label = Some(label);
        tape.file_count = 1;
        tape.current_position = 1;
        tape.written_bytes += bytes.len() as u64;
        tape.tape_state = TapeState::Open;
        self.persist(tape).await?;

        info!(drive_index = self.drive_index(), tape_code = %tape.code, "Label written");
        Ok(())
    }

    /// Checks that the medium carries the label recorded in the catalog.
    ///
    /// The head must be at the beginning of the tape; it is left after the
    /// label. Entries without a label have nothing to check. A label that
    /// does not identify the entry flags the cartridge `CONFLICT`.
    pub(crate) async fn verify_label(&self, tape: &mut TapeCatalog) -> Result<(), ReadWriteError> {
        let Some(expected) = tape.label.clone() else {
            return Ok(());
        };

        let path = self.label_file().await?;
        let response = self.drive.read_file(&path).await;
        let content = tokio::fs::read(&path).await;
        let _ = tokio::fs::remove_file(&path).await;
        if !response.is_ok() {
            return Err(ReadWriteError::new(
                ReadWriteErrorCode::KoOnReadLabel,
                format!("label of {} could not be read: {}", tape.code, describe(&response)),
            ));
        }
        tape.current_position = 1;

        let found = content
            .ok()
            .and_then(|bytes| serde_json::from_slice::<TapeLabel>(&bytes).ok());
        if found.as_ref().is_some_and(|label| expected.matches(label)) {
            return Ok(());
        }

        tape.tape_state = TapeState::Conflict;
        self.persist(tape).await?;
        error!(
            drive_index = self.drive_index(),
            tape_code = %tape.code,
            expected = %expected.id,
            found = ?found.as_ref().map(|label| label.id),
            "Cartridge label does not match the catalog"
        );
        Err(ReadWriteError::new(
            ReadWriteErrorCode::KoLabelDiscording,
            format!("cartridge {} does not carry its catalog label", tape.code),
        ))
    }

    /// Whether the drive reports the end of the medium.
    pub(crate) async fn at_end_of_tape(&self) -> Result<bool, ReadWriteError> {
        let response = self.drive.status().await;
        match &response.entity {
            Some(status) if response.status == StatusCode::Ok => Ok(status.end_of_tape),
            _ => Err(ReadWriteError::new(
                ReadWriteErrorCode::KoOnStatus,
                format!("drive {} status: {}", self.drive_index(), describe(&response)),
            )),
        }
    }
}
