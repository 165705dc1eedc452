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
use std::path::PathBuf;
use tracing::{error, info};

use super::CartridgeHandler;
use crate::error::{ReadWriteError, ReadWriteErrorCode};
use crate::models::{QueueMessageType, QueuePayload, ReadOrder, TapeCatalog};
use crate::queue::{QueueFilter, ReceiveRequest};
use crate::worker::task::{ReadWriteResult, ReadWriteTask};

/// Copies one file of a [`ReadOrder`] from its cartridge to the output directory.
pub struct ReadTask {
    order: ReadOrder,
    current_tape: Option<TapeCatalog>,
    handler: CartridgeHandler,
    output_directory: PathBuf,
}

impl ReadTask {
    pub(crate) fn new(
        order: ReadOrder,
        current_tape: Option<TapeCatalog>,
        handler: CartridgeHandler,
        output_directory: PathBuf,
    ) -> Self {
        Self {
            order,
            current_tape,
            handler,
            output_directory,
        }
    }

    /// `<output_directory>/<file_bucket_id>/<archive_id>`
    fn destination(&self) -> PathBuf {
        self.output_directory
            .join(&self.order.file_bucket_id)
            .join(&self.order.archive_id)
    }

    async fn execute(&mut self) -> Result<(), ReadWriteError> {
        let mounted = self.current_tape.as_ref().map(|tape| tape.code == self.order.tape_code);
        if mounted == Some(false) {
            if let Some(tape) = self.current_tape.as_mut() {
                self.handler.unload(tape).await?;
            }
            self.current_tape = None;
        }

        if self.current_tape.is_none() {
            let reserved = self.reserve().await?;
            let tape = self.current_tape.insert(reserved);
            self.handler.load(tape).await?;
            self.handler.rewind(tape).await?;
            self.handler.verify_label(tape).await?;
        }

        let destination = self.destination();
        let Some(tape) = self.current_tape.as_mut() else {
            return Err(ReadWriteError::new(
                ReadWriteErrorCode::InternalError,
                "no cartridge in drive after load",
            ));
        };

        self.handler.seek(tape, self.order.file_position).await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ReadWriteError::new(
                    ReadWriteErrorCode::KoOnReadFromTape,
                    format!("cannot create {}: {}", parent.display(), e),
                )
            })?;
        }

        let response = self.handler.drive().read_file(&destination).await;
        if !response.is_ok() {
            return Err(ReadWriteError::new(
                ReadWriteErrorCode::KoOnReadFromTape,
                format!(
                    "read of file {} from {} failed: {}",
                    self.order.file_position,
                    tape.code,
                    response.message.unwrap_or_default()
                ),
            ));
        }

        tape.current_position = self.order.file_position + 1;
        self.handler.persist(tape).await?;

        info!(
            drive_index = self.handler.drive_index(),
            tape_code = %tape.code,
            archive_id = %self.order.archive_id,
            destination = %destination.display(),
            "Archive read from tape"
        );
        Ok(())
    }

    /// Reserves the cartridge named by the order.
    async fn reserve(&self) -> Result<TapeCatalog, ReadWriteError> {
        let code = &self.order.tape_code;
        let catalog = self.handler.catalog();

        let request = ReceiveRequest::new(QueueMessageType::TapeCatalog)
            .filter(
                QueueFilter::new()
                    .library(self.handler.library_identifier())
                    .tape_code(code.clone()),
            )
            .use_priority(false);

        match catalog.receive(request).await?.map(|message| message.payload) {
            Some(QueuePayload::TapeCatalog(tape)) => Ok(tape),
            Some(_) => Err(ReadWriteError::new(
                ReadWriteErrorCode::InternalError,
                "catalog returned a message that is not a cartridge",
            )),
            None => {
                let known = catalog.find(QueueFilter::new().tape_code(code.clone())).await?;
                if known.is_empty() {
                    Err(ReadWriteError::new(
                        ReadWriteErrorCode::TapeNotFoundInCatalog,
                        format!("cartridge {} is not in the catalog", code),
                    ))
                } else {
                    Err(ReadWriteError::new(
                        ReadWriteErrorCode::TapeReservedElsewhere,
                        format!("cartridge {} is reserved by another drive", code),
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl ReadWriteTask for ReadTask {
    async fn run(self: Box<Self>) -> ReadWriteResult {
        let mut task = *self;
        match task.execute().await {
            Ok(()) => ReadWriteResult::completed(task.current_tape),
            Err(e) => {
                error!(
                    drive_index = task.handler.drive_index(),
                    archive_id = %task.order.archive_id,
                    destination = %task.destination().display(),
                    error = %e,
                    "Read task failed"
                );
                ReadWriteResult::failed(&e, task.current_tape)
            }
        }
    }
}
