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

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::CartridgeHandler;
use crate::error::{ReadWriteError, ReadWriteErrorCode};
use crate::models::TapeCatalog;
use crate::worker::task::{ReadWriteResult, ReadWriteTask};

/// Startup check of one drive.
///
/// Confirms the drive holds the cartridge the catalog places in it, rewinds
/// it and checks its label, so a worker never starts writing to a cartridge
/// swapped while the service was down.
pub struct DriveCheckTask {
    current_tape: Option<TapeCatalog>,
    handler: CartridgeHandler,
}

impl DriveCheckTask {
    pub(crate) fn new(current_tape: Option<TapeCatalog>, handler: CartridgeHandler) -> Self {
        Self {
            current_tape,
            handler,
        }
    }

    async fn execute(&mut self) -> Result<(), ReadWriteError> {
        let drive_index = self.handler.drive_index();
        let has_tape = self.handler.drive_has_tape().await?;

        let Some(tape) = self.current_tape.as_mut() else {
            if has_tape {
                warn!(drive_index, "Drive holds a cartridge the catalog does not know");
            }
            return Ok(());
        };

        if !has_tape {
            return Err(ReadWriteError::new(
                ReadWriteErrorCode::TapeLocationConflict,
                format!(
                    "catalog places {} in drive {} but the drive is empty",
                    tape.code, drive_index
                ),
            ));
        }

        self.handler.rewind(tape).await?;
        self.handler.verify_label(tape).await?;
        self.handler.persist(tape).await?;

        info!(drive_index, tape_code = %tape.code, "Mounted cartridge checked");
        Ok(())
    }
}

#[async_trait]
impl ReadWriteTask for DriveCheckTask {
    async fn run(self: Box<Self>) -> ReadWriteResult {
        let mut task = *self;
        match task.execute().await {
            Ok(()) => ReadWriteResult::completed(task.current_tape),
            Err(e) => {
                error!(
                    drive_index = task.handler.drive_index(),
                    error = %e,
                    "Drive check failed"
                );
                ReadWriteResult::failed(&e, task.current_tape)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{catalog, robot_pool, MemoryDrive, ScriptedChanger};
    use super::super::DefaultReadWriteTaskFactory;
    use crate::catalog::TapeCatalogService;
    use crate::error::ReadWriteErrorCode;
    use crate::models::{QueueState, StatusCode, TapeCatalog, TapeLabel, TapeLocation, TapeState};
    use crate::worker::task::ReadWriteTaskFactory;
    use std::sync::Arc;

    fn mounted(code: &str) -> TapeCatalog {
        let mut tape = TapeCatalog::new(code, "lib-1");
        tape.current_location = Some(TapeLocation::drive(0));
        tape.previous_location = Some(TapeLocation::slot(2));
        tape.state = QueueState::Running;
        tape.bucket = Some("objects".to_string());
        tape.tape_state = TapeState::Open;
        tape.file_count = 3;
        tape.current_position = 3;
        tape.label = Some(TapeLabel::for_tape(&tape));
        tape
    }

    #[tokio::test]
    async fn test_empty_drive_only_checks_status() {
        let (dir, catalog) = catalog().await;
        let drive = Arc::new(MemoryDrive::new(0));
        let factory = DefaultReadWriteTaskFactory::new(catalog.clone(), dir.path());

        let result = factory
            .bootstrap(None, robot_pool(Arc::new(ScriptedChanger::default())), drive.clone())
            .expect("default factory checks drives")
            .run()
            .await;

        assert_eq!(result.status, StatusCode::Ok);
        assert!(result.current_tape.is_none());
        assert!(drive.commands.lock().is_empty());
    }

    #[tokio::test]
    async fn test_mounted_cartridge_is_rewound_and_label_checked() {
        let (dir, catalog) = catalog().await;
        let tape = catalog.create(mounted("TAPE02L6")).await.unwrap();
        let drive = Arc::new(MemoryDrive::new(0));
        *drive.has_tape.lock() = true;
        drive
            .files
            .lock()
            .push(serde_json::to_vec(tape.label.as_ref().unwrap()).unwrap());
        let factory = DefaultReadWriteTaskFactory::new(catalog.clone(), dir.path());

        let result = factory
            .bootstrap(
                Some(tape.clone()),
                robot_pool(Arc::new(ScriptedChanger::default())),
                drive.clone(),
            )
            .unwrap()
            .run()
            .await;

        assert_eq!(result.status, StatusCode::Ok);
        assert_eq!(result.current_tape.unwrap().current_position, 1);
        assert_eq!(drive.commands.lock().as_slice(), &["rewind", "read"]);
        assert_eq!(
            catalog.find_by_id(tape.id).await.unwrap().unwrap().current_position,
            1
        );
    }

    #[tokio::test]
    async fn test_invalid_label_fails_the_check() {
        let (dir, catalog) = catalog().await;
        let tape = catalog.create(mounted("TAPE02L6")).await.unwrap();
        let drive = Arc::new(MemoryDrive::new(0));
        *drive.has_tape.lock() = true;
        drive.files.lock().push(b"not a label".to_vec());
        let factory = DefaultReadWriteTaskFactory::new(catalog.clone(), dir.path());

        let result = factory
            .bootstrap(
                Some(tape.clone()),
                robot_pool(Arc::new(ScriptedChanger::default())),
                drive,
            )
            .unwrap()
            .run()
            .await;

        assert_eq!(result.status, StatusCode::Fatal);
        assert_eq!(result.error_code, Some(ReadWriteErrorCode::KoLabelDiscording));
        assert_eq!(
            catalog.find_by_id(tape.id).await.unwrap().unwrap().tape_state,
            TapeState::Conflict
        );
    }

    #[tokio::test]
    async fn test_ejected_cartridge_fails_the_check() {
        let (dir, catalog) = catalog().await;
        let tape = catalog.create(mounted("TAPE02L6")).await.unwrap();
        let drive = Arc::new(MemoryDrive::new(0));
        let factory = DefaultReadWriteTaskFactory::new(catalog.clone(), dir.path());

        let result = factory
            .bootstrap(
                Some(tape),
                robot_pool(Arc::new(ScriptedChanger::default())),
                drive.clone(),
            )
            .unwrap()
            .run()
            .await;

        assert_eq!(result.status, StatusCode::Fatal);
        assert_eq!(
            result.error_code,
            Some(ReadWriteErrorCode::TapeLocationConflict)
        );
        assert!(drive.commands.lock().is_empty());
    }
}
