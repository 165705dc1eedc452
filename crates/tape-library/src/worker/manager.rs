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

//! Drive Worker Manager
//!
//! Owns the workers of one library: it starts one worker thread per drive,
//! routes new orders to the queue and wakes idle workers, watches for worker
//! deaths and stops everything on shutdown.
//!
//! ```rust,ignore
//! let drive_tapes = catalog.bootstrap(library.robot_pool()).await?;
//! let manager = TapeDriveWorkerManager::new(
//!     queue,
//!     &library,
//!     drive_tapes,
//!     task_factory,
//!     TapeDriveWorkerManagerConfig::default(),
//! )?;
//!
//! manager.enqueue(QueueMessage::new(write_order)).await?;
//! // ...
//! manager.shutdown().await;
//! ```

use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::activity::DriveActivity;
use super::config::TapeDriveWorkerManagerConfig;
use super::distributor::WorkDistributor;
use super::drive_worker::TapeDriveWorker;
use super::task::ReadWriteTaskFactory;
use crate::error::{QueueError, WorkerError};
use crate::library::TapeLibraryPool;
use crate::models::{QueueMessage, TapeCatalog};
use crate::queue::{QueueFilter, QueueRepository};

/// Starts, feeds and stops the drive workers of one library.
pub struct TapeDriveWorkerManager {
    library_identifier: String,
    queue: Arc<dyn QueueRepository>,
    distributor: Arc<WorkDistributor>,
    workers: Vec<Arc<TapeDriveWorker>>,
    threads: Mutex<Vec<std::thread::JoinHandle<()>>>,
    monitors: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for TapeDriveWorkerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapeDriveWorkerManager")
            .field("library_identifier", &self.library_identifier)
            .field("workers", &self.workers)
            .finish()
    }
}

impl TapeDriveWorkerManager {
    /// Starts one worker per drive of `library`.
    ///
    /// `drive_tapes` gives the cartridge already mounted in each drive, as
    /// returned by the catalog initialization.
    ///
    /// # Errors
    ///
    /// [`WorkerError::NoRuntime`] outside a tokio runtime, or
    /// [`WorkerError::Spawn`] if a worker thread cannot be started. Workers
    /// started before the failure are asked to stop.
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        library: &TapeLibraryPool,
        mut drive_tapes: HashMap<u32, TapeCatalog>,
        task_factory: Arc<dyn ReadWriteTaskFactory>,
        config: TapeDriveWorkerManagerConfig,
    ) -> Result<Self, WorkerError> {
        let handle = Handle::try_current().map_err(|_| WorkerError::NoRuntime)?;
        let distributor = Arc::new(WorkDistributor::with_poll_interval(config.poll_interval()));
        let activity = Arc::new(DriveActivity::new());
        for (index, tape) in &drive_tapes {
            activity.record(*index, Some(tape), None);
        }

        let mut workers: Vec<Arc<TapeDriveWorker>> = Vec::with_capacity(library.drive_count());
        let mut threads = Vec::with_capacity(library.drive_count());
        let mut monitors = Vec::with_capacity(library.drive_count());

        for drive in library.drives() {
            let index = drive.conf().index;
            let worker = Arc::new(TapeDriveWorker::new(
                drive.clone(),
                library.robot_pool().clone(),
                queue.clone(),
                task_factory.clone(),
                distributor.clone(),
                activity.clone(),
                drive_tapes.remove(&index),
            ));

            let thread_name = format!("{}-{}", config.thread_name_prefix(), index);
            match worker.spawn(thread_name, handle.clone()) {
                Ok(thread) => threads.push(thread),
                Err(e) => {
                    for started in &workers {
                        started.request_stop();
                    }
                    distributor.shutdown();
                    monitors.iter().for_each(JoinHandle::abort);
                    return Err(e);
                }
            }

            monitors.push(handle.spawn(watch_worker(worker.clone())));
            workers.push(worker);
        }

        info!(
            library = library.library_identifier(),
            drives = workers.len(),
            poll_interval = ?config.poll_interval(),
            "Drive workers started"
        );

        Ok(Self {
            library_identifier: library.library_identifier().to_string(),
            queue,
            distributor,
            workers,
            threads: Mutex::new(threads),
            monitors,
        })
    }

    /// Adds an order to the queue and wakes idle workers.
    pub async fn enqueue(&self, message: QueueMessage) -> Result<(), QueueError> {
        self.queue.add(message).await?;
        self.distributor.notify_work();
        Ok(())
    }

    /// Adds an order unless one matching `criteria` is already queued.
    ///
    /// Returns `true` if the order was added.
    pub async fn enqueue_if_absent(
        &self,
        criteria: QueueFilter,
        message: QueueMessage,
    ) -> Result<bool, QueueError> {
        let inserted = self.queue.add_if_absent(criteria, message).await?;
        if inserted {
            self.distributor.notify_work();
        }
        Ok(inserted)
    }

    /// Stops every worker and waits for all of them, then joins their threads.
    ///
    /// Workers busy in a task finish it first, so this can take as long as
    /// the longest transfer in flight.
    pub async fn shutdown(&self) {
        info!(library = %self.library_identifier, "Stopping drive workers");
        self.request_stop();
        join_all(self.workers.iter().map(|worker| worker.stop())).await;

        let threads = std::mem::take(&mut *self.threads.lock());
        let joined = tokio::task::spawn_blocking(move || {
            for thread in threads {
                if thread.join().is_err() {
                    error!("Drive worker thread panicked");
                }
            }
        })
        .await;
        if let Err(e) = joined {
            error!(error = %e, "Failed to join drive worker threads");
        }

        info!(library = %self.library_identifier, "Drive workers stopped");
    }

    /// Stops every worker, waiting at most `timeout` for each.
    ///
    /// Returns whether all workers stopped in time. Threads are not joined;
    /// late workers end on their own once their task is over.
    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        info!(library = %self.library_identifier, ?timeout, "Stopping drive workers");
        self.request_stop();
        let stopped = join_all(
            self.workers
                .iter()
                .map(|worker| worker.stop_timeout(timeout)),
        )
        .await;
        stopped.into_iter().all(|stopped| stopped)
    }

    fn request_stop(&self) {
        for worker in &self.workers {
            worker.request_stop();
        }
        self.distributor.shutdown();
    }

    /// Death signal of every worker, by drive index.
    pub fn worker_deaths(&self) -> Vec<(u32, watch::Receiver<bool>)> {
        self.workers
            .iter()
            .map(|worker| (worker.index(), worker.subscribe_died()))
            .collect()
    }

    /// Drives whose worker is no longer running.
    pub fn dead_workers(&self) -> Vec<u32> {
        self.workers
            .iter()
            .filter(|worker| worker.has_died())
            .map(|worker| worker.index())
            .collect()
    }

    pub fn workers(&self) -> &[Arc<TapeDriveWorker>] {
        &self.workers
    }

    pub fn worker(&self, drive_index: u32) -> Option<&Arc<TapeDriveWorker>> {
        self.workers
            .iter()
            .find(|worker| worker.index() == drive_index)
    }
}

impl Drop for TapeDriveWorkerManager {
    fn drop(&mut self) {
        self.request_stop();
        for monitor in &self.monitors {
            monitor.abort();
        }
    }
}

/// Logs the death of a worker that was not asked to stop.
async fn watch_worker(worker: Arc<TapeDriveWorker>) {
    let mut died = worker.subscribe_died();
    let signalled = died.wait_for(|died| *died).await.is_ok();
    if signalled && !worker.is_stop_requested() {
        error!(
            drive_index = worker.index(),
            result = ?worker.read_write_result().map(|result| result.status),
            "Drive worker died; the drive is no longer served"
        );
    }
}
