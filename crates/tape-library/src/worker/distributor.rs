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

//! Wake-ups for idle drive workers.
//!
//! SQLite has no notification mechanism, so idle workers poll the queue at a
//! fixed interval. Orders enqueued through the manager also notify the
//! distributor, which wakes every waiting worker right away.
//!
//! # Example
//!
//! ```rust,ignore
//! let distributor = WorkDistributor::with_poll_interval(Duration::from_secs(60));
//!
//! loop {
//!     // Register before looking at the queue so a concurrent enqueue is not missed
//!     let listener = distributor.listen();
//!     match consumer.consume(drive_index, priority, current_tape.as_ref()).await? {
//!         Some((id, order)) => execute(id, order).await?,
//!         None => listener.wait().await,
//!     }
//! }
//! ```

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::debug;

/// Shared wake-up signal of the workers of one library.
#[derive(Debug)]
pub struct WorkDistributor {
    poll_interval: Duration,
    shutdown: AtomicBool,
    notify: Notify,
}

impl WorkDistributor {
    /// Default poll interval when nothing is enqueued.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

    pub fn new() -> Self {
        Self::with_poll_interval(Self::DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            shutdown: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Registers interest in the next notification.
    pub fn listen(&self) -> WorkListener<'_> {
        let mut notified = Box::pin(self.notify.notified());
        notified.as_mut().enable();
        WorkListener {
            notified,
            poll_interval: self.poll_interval,
            shutdown: &self.shutdown,
        }
    }

    /// Wakes every waiting worker.
    pub fn notify_work(&self) {
        self.notify.notify_waiters();
    }

    /// Makes current and future waits return immediately.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

impl Default for WorkDistributor {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered wait, created by [`WorkDistributor::listen`].
pub struct WorkListener<'a> {
    notified: Pin<Box<Notified<'a>>>,
    poll_interval: Duration,
    shutdown: &'a AtomicBool,
}

impl WorkListener<'_> {
    /// Waits for a notification since registration, or the poll interval.
    pub async fn wait(self) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }

        tokio::select! {
            _ = self.notified => {
                debug!("Woke from work notification");
            }
            _ = tokio::time::sleep(self.poll_interval) => {
                debug!("Poll interval elapsed");
            }
        }
    }
}

impl std::fmt::Debug for WorkListener<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkListener")
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
