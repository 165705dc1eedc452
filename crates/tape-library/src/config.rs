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

//! Library configuration file.
//!
//! ```toml
//! library_identifier = "lib-1"
//! database_url = "${TAPE_DATABASE_URL:-/var/lib/tape/queue.db}"
//! output_directory = "/var/lib/tape/output"
//!
//! [robot]
//! device = "/dev/sg1"
//! use_sudo = true
//!
//! [[drives]]
//! index = 0
//! device = "/dev/nst0"
//! read_write_priority = "READ"
//! ```
//!
//! `${VAR}`, `${VAR:-default}` and `${VAR:?message}` are substituted from
//! the environment before parsing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::drive::TapeDriveConf;
use crate::error::ConfigError;

static ENV_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid substitution pattern"));

fn default_controller_path() -> String {
    "/usr/sbin/mtx".to_string()
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("output")
}

/// Changer controller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Changer device, passed as `-f <device>`
    pub device: String,
    #[serde(default = "default_controller_path")]
    pub controller_path: String,
    /// Run the controller through `sudo`
    #[serde(default)]
    pub use_sudo: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl RobotConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            device: "/dev/sg0".to_string(),
            controller_path: default_controller_path(),
            use_sudo: false,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Top-level configuration of one tape library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapeLibraryConfig {
    pub library_identifier: String,
    #[serde(default)]
    pub database_url: Option<String>,
    /// Where read orders deliver their files
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    pub robot: RobotConfig,
    #[serde(default)]
    pub drives: Vec<TapeDriveConf>,
}

impl TapeLibraryConfig {
    /// Reads, substitutes, parses and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.library_identifier.trim().is_empty() {
            return Err(ConfigError::Validation(
                "library_identifier must not be empty".to_string(),
            ));
        }
        if self.drives.is_empty() {
            return Err(ConfigError::Validation(
                "at least one [[drives]] entry is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for drive in &self.drives {
            if !seen.insert(drive.index) {
                return Err(ConfigError::Validation(format!(
                    "drive index {} is configured more than once",
                    drive.index
                )));
            }
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Replaces `${VAR}`, `${VAR:-default}` and `${VAR:?message}` occurrences.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(content.len());
    let mut last = 0;

    for caps in ENV_VAR.captures_iter(content) {
        let Some(full) = caps.get(0) else { continue };
        result.push_str(&content[last..full.start()]);
        result.push_str(&resolve_var(&caps[1])?);
        last = full.end();
    }
    result.push_str(&content[last..]);

    Ok(result)
}

fn resolve_var(expr: &str) -> Result<String, ConfigError> {
    if let Some((name, default)) = expr.split_once(":-") {
        Ok(env::var(name).unwrap_or_else(|_| default.to_string()))
    } else if let Some((name, message)) = expr.split_once(":?") {
        env::var(name).map_err(|_| {
            ConfigError::Validation(format!(
                "required environment variable '{}' is not set: {}",
                name, message
            ))
        })
    } else {
        env::var(expr).map_err(|_| {
            ConfigError::Validation(format!(
                "required environment variable '{}' is not set",
                expr
            ))
        })
    }
}
