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
use tracing::{error, info, warn};

use super::CartridgeHandler;
use crate::error::{ReadWriteError, ReadWriteErrorCode};
use crate::models::{QueueMessageType, QueuePayload, TapeCatalog, TapeState, WriteOrder};
use crate::queue::{BucketFilter, QueueFilter, QueueUpdate, ReceiveRequest};
use crate::worker::task::{ReadWriteResult, ReadWriteTask};

/// Cartridges tried after an end of tape before the order is given back.
const END_OF_TAPE_RETRIES: u32 = 1;

/// Appends the file of a [`WriteOrder`] to a cartridge of its bucket.
pub struct WriteTask {
    order: WriteOrder,
    current_tape: Option<TapeCatalog>,
    handler: CartridgeHandler,
}

impl WriteTask {
    pub(crate) fn new(
        order: WriteOrder,
        current_tape: Option<TapeCatalog>,
        handler: CartridgeHandler,
    ) -> Self {
        Self {
            order,
            current_tape,
            handler,
        }
    }

    /// Whether the order can be appended to `tape`.
    fn accepts(&self, tape: &TapeCatalog) -> bool {
        let same_bucket = match &tape.bucket {
            Some(bucket) => *bucket == self.order.bucket,
            None => true,
        };
        tape.tape_state.is_writable() && same_bucket
    }

    async fn execute(&mut self) -> Result<(), ReadWriteError> {
        let source = PathBuf::from(&self.order.file_path);
        let size = match tokio::fs::metadata(&source).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => {
                return Err(ReadWriteError::new(
                    ReadWriteErrorCode::FileNotFound,
                    format!("file to write not found: {}", source.display()),
                ))
            }
        };

        let reusable = self.current_tape.as_ref().map(|tape| self.accepts(tape));
        if reusable == Some(false) {
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

        let Some(tape) = self.current_tape.as_mut() else {
            return Err(ReadWriteError::new(
                ReadWriteErrorCode::InternalError,
                "no cartridge in drive after load",
            ));
        };

        let file_count = tape.file_count;
        self.handler.seek(tape, file_count).await?;

        // Blank cartridge: its label goes first
        if tape.label.is_none() && tape.file_count == 0 {
            tape.bucket = Some(self.order.bucket.clone());
            self.handler.write_label(tape).await?;
        }

        let file_count = tape.file_count;
        self.handler.append(tape, &source).await?;

        tape.file_count += 1;
        tape.current_position = tape.file_count;
        tape.written_bytes += size;
        tape.tape_state = TapeState::Open;
        tape.bucket = Some(self.order.bucket.clone());
        self.handler.persist(tape).await?;

        info!(
            drive_index = self.handler.drive_index(),
            tape_code = %tape.code,
            archive_id = %self.order.archive_id,
            file_position = file_count,
            "Archive written to tape"
        );
        Ok(())
    }

    /// Reserves a cartridge of the library for the order's bucket.
    ///
    /// Cartridges already holding the bucket are preferred over empty ones.
    async fn reserve(&self) -> Result<TapeCatalog, ReadWriteError> {
        let library = self.handler.library_identifier().to_string();
        let bucket = self.order.bucket.clone();
        let catalog = self.handler.catalog();

        let open = ReceiveRequest::new(QueueMessageType::TapeCatalog)
            .filter(
                QueueFilter::new()
                    .library(library.clone())
                    .tape_state(TapeState::Open)
                    .bucket(BucketFilter::Is(bucket.clone())),
            )
            .use_priority(false);

        let received = match catalog.receive(open).await? {
            Some(message) => Some(message),
            None => {
                let empty = ReceiveRequest::new(QueueMessageType::TapeCatalog)
                    .filter(
                        QueueFilter::new()
                            .library(library)
                            .tape_state(TapeState::Empty)
                            .bucket(BucketFilter::IsOrUnassigned(bucket.clone())),
                    )
                    .update(QueueUpdate::new().bucket(bucket.clone()))
                    .use_priority(false);
                catalog.receive(empty).await?
            }
        };

        match received.map(|message| message.payload) {
            Some(QueuePayload::TapeCatalog(tape)) => Ok(tape),
            Some(_) => Err(ReadWriteError::new(
                ReadWriteErrorCode::InternalError,
                "catalog returned a message that is not a cartridge",
            )),
            None => Err(ReadWriteError::new(
                ReadWriteErrorCode::TapeNotFoundInCatalog,
                format!("no writable cartridge available for bucket {}", bucket),
            )),
        }
    }
}

#[async_trait]
impl ReadWriteTask for WriteTask {
    async fn run(self: Box<Self>) -> ReadWriteResult {
        let mut task = *self;
        let mut retries = END_OF_TAPE_RETRIES;

        loop {
            match task.execute().await {
                Ok(()) => return ReadWriteResult::completed(task.current_tape),
                Err(e) if e.code == ReadWriteErrorCode::KoOnEndOfTape && retries > 0 => {
                    retries -= 1;
                    warn!(
                        drive_index = task.handler.drive_index(),
                        archive_id = %task.order.archive_id,
                        "{}; retrying on another cartridge",
                        e.message
                    );
                }
                Err(e) => {
                    error!(
                        drive_index = task.handler.drive_index(),
                        archive_id = %task.order.archive_id,
                        error = %e,
                        "Write task failed"
                    );
                    return ReadWriteResult::failed(&e, task.current_tape);
                }
            }
        }
    }
}
