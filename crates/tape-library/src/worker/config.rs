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

//! Configuration of the drive worker manager.

use std::time::Duration;

use crate::config::TapeLibraryConfig;

/// Settings shared by the workers of one manager.
///
/// ```rust,ignore
/// let config = TapeDriveWorkerManagerConfig::builder()
///     .poll_interval(Duration::from_secs(10))
///     .build();
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct TapeDriveWorkerManagerConfig {
    poll_interval: Duration,
    thread_name_prefix: String,
}

impl TapeDriveWorkerManagerConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> TapeDriveWorkerManagerConfigBuilder {
        TapeDriveWorkerManagerConfigBuilder::default()
    }

    /// How long an idle worker waits before looking at the queue again.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Worker threads are named `<prefix>-<drive index>`.
    pub fn thread_name_prefix(&self) -> &str {
        &self.thread_name_prefix
    }
}

impl From<&TapeLibraryConfig> for TapeDriveWorkerManagerConfig {
    fn from(config: &TapeLibraryConfig) -> Self {
        Self::builder().poll_interval(config.poll_interval()).build()
    }
}

/// Builder for [`TapeDriveWorkerManagerConfig`].
pub struct TapeDriveWorkerManagerConfigBuilder {
    config: TapeDriveWorkerManagerConfig,
}

impl Default for TapeDriveWorkerManagerConfigBuilder {
    fn default() -> Self {
        Self {
            config: TapeDriveWorkerManagerConfig {
                poll_interval: Duration::from_secs(60),
                thread_name_prefix: "tape-drive-worker".to_string(),
            },
        }
    }
}

impl TapeDriveWorkerManagerConfigBuilder {
    pub fn poll_interval(mut self, value: Duration) -> Self {
        self.config.poll_interval = value;
        self
    }

    pub fn thread_name_prefix(mut self, value: impl Into<String>) -> Self {
        self.config.thread_name_prefix = value.into();
        self
    }

    pub fn build(self) -> TapeDriveWorkerManagerConfig {
        self.config
    }
}

impl Default for TapeDriveWorkerManagerConfig {
    fn default() -> Self {
        TapeDriveWorkerManagerConfigBuilder::default().build()
    }
}
