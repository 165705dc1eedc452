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

//! Drive Worker
//!
//! One worker owns one drive. It runs on its own OS thread, driving an async
//! loop on the runtime handle it was spawned with:
//!
//! 1. stop if asked to
//! 2. receive the next order for the drive
//! 3. run the read/write task and persist the order state it reports
//! 4. with no order, wait for an enqueue notification or the poll interval
//!
//! An order given back to the queue wakes the other drives, and this drive
//! backs off for one poll interval so an order nobody can run does not bounce
//! between drives.
//!
//! Before the loop, the factory's startup check validates the cartridge the
//! catalog places in the drive. Any error escaping the loop or the check,
//! including a task reporting `FATAL`, ends the worker. It then flags itself
//! as died and is not restarted.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::activity::DriveActivity;
use super::consumer::TapeDriveOrderConsumer;
use super::distributor::WorkDistributor;
use super::task::{ReadWriteResult, ReadWriteTaskFactory};
use crate::drive::TapeDriveService;
use crate::error::WorkerError;
use crate::models::{Order, QueueState, ReadWritePriority, StatusCode, TapeCatalog};
use crate::queue::QueueRepository;
use crate::robot::TapeRobotPool;

/// Worker serving the orders of one drive.
pub struct TapeDriveWorker {
    index: u32,
    priority: ReadWritePriority,
    queue: Arc<dyn QueueRepository>,
    consumer: TapeDriveOrderConsumer,
    robot_pool: TapeRobotPool,
    drive: Arc<dyn TapeDriveService>,
    task_factory: Arc<dyn ReadWriteTaskFactory>,
    distributor: Arc<WorkDistributor>,
    activity: Arc<DriveActivity>,
    current_tape: Mutex<Option<TapeCatalog>>,
    last_result: Mutex<Option<ReadWriteResult>>,
    stop_requested: AtomicBool,
    stop_notify: Notify,
    running: AtomicBool,
    died: watch::Sender<bool>,
}

impl std::fmt::Debug for TapeDriveWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapeDriveWorker")
            .field("index", &self.index)
            .field("priority", &self.priority)
            .field("running", &self.is_running())
            .field("died", &self.has_died())
            .finish()
    }
}

/// Flags the worker as died when the loop ends, whether by return or panic.
struct DiedGuard<'a> {
    worker: &'a TapeDriveWorker,
}

impl Drop for DiedGuard<'_> {
    fn drop(&mut self) {
        self.worker.running.store(false, Ordering::SeqCst);
        self.worker.activity.release_buckets(self.worker.index);
        if std::thread::panicking() {
            error!(drive_index = self.worker.index, "Drive worker panicked");
        }
        self.worker.died.send_replace(true);
    }
}

impl TapeDriveWorker {
    /// `current_tape` is the cartridge found in the drive at startup, if any.
    pub fn new(
        drive: Arc<dyn TapeDriveService>,
        robot_pool: TapeRobotPool,
        queue: Arc<dyn QueueRepository>,
        task_factory: Arc<dyn ReadWriteTaskFactory>,
        distributor: Arc<WorkDistributor>,
        activity: Arc<DriveActivity>,
        current_tape: Option<TapeCatalog>,
    ) -> Self {
        let conf = drive.conf();
        let (died, _) = watch::channel(false);
        activity.record(conf.index, current_tape.as_ref(), None);
        Self {
            index: conf.index,
            priority: conf.read_write_priority,
            consumer: TapeDriveOrderConsumer::new(queue.clone(), activity.clone()),
            queue,
            robot_pool,
            drive,
            task_factory,
            distributor,
            activity,
            current_tape: Mutex::new(current_tape),
            last_result: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            running: AtomicBool::new(false),
            died,
        }
    }

    /// Starts the worker loop on a new OS thread named `thread_name`.
    pub fn spawn(
        self: &Arc<Self>,
        thread_name: String,
        handle: Handle,
    ) -> Result<std::thread::JoinHandle<()>, WorkerError> {
        let worker = Arc::clone(self);
        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                if let Err(e) = handle.block_on(worker.run()) {
                    error!(drive_index = worker.index, error = %e, "Drive worker died");
                }
            })
            .map_err(|source| {
                self.died.send_replace(true);
                WorkerError::Spawn {
                    drive_index: self.index,
                    source,
                }
            })
    }

    /// Runs the loop until a stop request or a fatal error.
    pub async fn run(&self) -> Result<(), WorkerError> {
        let _guard = DiedGuard { worker: self };
        self.running.store(true, Ordering::SeqCst);
        info!(drive_index = self.index, priority = ?self.priority, "Drive worker started");

        self.check_drive().await?;

        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                info!(drive_index = self.index, "Drive worker stopped");
                return Ok(());
            }

            // Registered before looking at the queue so an enqueue in between still wakes us
            let listener = self.distributor.listen();
            let current_tape = self.current_tape.lock().clone();

            let received = self
                .consumer
                .consume(self.index, self.priority, current_tape.as_ref())
                .await?;

            let Some((id, order)) = received else {
                debug!(drive_index = self.index, "Waiting for work");
                tokio::select! {
                    _ = listener.wait() => {}
                    _ = self.stop_notify.notified() => {}
                }
                continue;
            };
            drop(listener);

            if self.execute(id, order, current_tape).await? {
                self.distributor.notify_work();
                debug!(drive_index = self.index, "Order given back; backing off");
                tokio::select! {
                    _ = tokio::time::sleep(self.distributor.poll_interval()) => {}
                    _ = self.stop_notify.notified() => {}
                }
            }
        }
    }

    /// Runs the factory's startup check of the drive and the cartridge in it.
    async fn check_drive(&self) -> Result<(), WorkerError> {
        let current_tape = self.current_tape.lock().clone();
        let Some(task) =
            self.task_factory
                .bootstrap(current_tape, self.robot_pool.clone(), self.drive.clone())
        else {
            return Ok(());
        };

        let result = task.run().await;
        let status = result.status;
        let message = result.message.clone();
        self.activity
            .record(self.index, result.current_tape.as_ref(), None);
        *self.current_tape.lock() = result.current_tape.clone();
        *self.last_result.lock() = Some(result);

        match status {
            StatusCode::Ok => Ok(()),
            StatusCode::Fatal => Err(WorkerError::Fatal {
                drive_index: self.index,
                message: message.unwrap_or_else(|| "drive check failed".to_string()),
            }),
            StatusCode::Warning | StatusCode::Ko => {
                warn!(
                    drive_index = self.index,
                    ?status,
                    "Drive check: {}",
                    message.as_deref().unwrap_or("no detail")
                );
                Ok(())
            }
        }
    }

    /// Runs one order; returns whether it went back to the queue.
    async fn execute(
        &self,
        id: Uuid,
        order: Order,
        current_tape: Option<TapeCatalog>,
    ) -> Result<bool, WorkerError> {
        info!(
            drive_index = self.index,
            order_id = %id,
            archive_id = %order.archive_id(),
            write = order.is_write(),
            "Executing order"
        );

        let task = self.task_factory.create(
            order,
            current_tape,
            self.robot_pool.clone(),
            self.drive.clone(),
        );
        let result = task.run().await;

        match result.order_state {
            QueueState::Completed => self.queue.complete(id).await?,
            QueueState::Error => self.queue.mark_error(id).await?,
            QueueState::Ready => self.queue.mark_ready(id).await?,
            QueueState::Running => {
                warn!(drive_index = self.index, order_id = %id, "Task left its order running; requeueing");
                self.queue.mark_ready(id).await?
            }
        };

        let status = result.status;
        let requeued = result.order_state != QueueState::Completed
            && result.order_state != QueueState::Error;
        let message = result.message.clone();
        self.activity
            .record(self.index, result.current_tape.as_ref(), None);
        *self.current_tape.lock() = result.current_tape.clone();
        *self.last_result.lock() = Some(result);

        match status {
            StatusCode::Fatal => Err(WorkerError::Fatal {
                drive_index: self.index,
                message: message.unwrap_or_else(|| format!("order {} failed", id)),
            }),
            StatusCode::Ok => {
                info!(drive_index = self.index, order_id = %id, "Order done");
                Ok(requeued)
            }
            StatusCode::Warning | StatusCode::Ko => {
                warn!(
                    drive_index = self.index,
                    order_id = %id,
                    ?status,
                    "Order not done: {}",
                    message.as_deref().unwrap_or("no detail")
                );
                Ok(requeued)
            }
        }
    }

    /// Asks the loop to stop at its next check point.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.stop_notify.notify_one();
    }

    /// Requests a stop and waits, without bound, until the worker has died.
    pub async fn stop(&self) {
        self.request_stop();
        let mut died = self.died.subscribe();
        let _ = died.wait_for(|died| *died).await;
    }

    /// Requests a stop and waits up to `timeout`.
    ///
    /// Returns whether the worker died in time. A worker busy in a task keeps
    /// running after a `false` return and stops once the task is over.
    pub async fn stop_timeout(&self, timeout: Duration) -> bool {
        self.request_stop();
        let mut died = self.died.subscribe();
        tokio::time::timeout(timeout, async move {
            let _ = died.wait_for(|died| *died).await;
        })
        .await
        .is_ok()
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn priority(&self) -> ReadWritePriority {
        self.priority
    }

    /// Cartridge in the drive, as reported by the last task.
    pub fn current_tape(&self) -> Option<TapeCatalog> {
        self.current_tape.lock().clone()
    }

    /// Result of the last task run.
    pub fn read_write_result(&self) -> Option<ReadWriteResult> {
        self.last_result.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn has_died(&self) -> bool {
        *self.died.borrow()
    }

    /// Receiver that turns `true` once the worker loop has ended.
    pub fn subscribe_died(&self) -> watch::Receiver<bool> {
        self.died.subscribe()
    }
}
