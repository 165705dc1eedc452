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

//! External process execution for hardware controllers.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Exit code reported when the process timed out or was killed by a signal.
pub const EXIT_CODE_INTERRUPTED: i32 = -1;

/// Exit code reported when the process could not be started.
pub const EXIT_CODE_NOT_STARTED: i32 = 127;

/// Captured result of one controller invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external command to completion, bounded by a timeout.
///
/// Failures to run are reported through the exit code rather than as errors:
/// [`EXIT_CODE_INTERRUPTED`] for timeouts and signals, and
/// [`EXIT_CODE_NOT_STARTED`] when the command cannot be spawned.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn execute(
        &self,
        command_path: &str,
        use_sudo: bool,
        timeout: Duration,
        args: &[String],
    ) -> ProcessOutput;
}

/// [`ProcessExecutor`] backed by `tokio::process`.
///
/// The child is killed when the timeout elapses.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessExecutor;

#[async_trait]
impl ProcessExecutor for TokioProcessExecutor {
    async fn execute(
        &self,
        command_path: &str,
        use_sudo: bool,
        timeout: Duration,
        args: &[String],
    ) -> ProcessOutput {
        let mut command = if use_sudo {
            let mut command = Command::new("sudo");
            command.arg(command_path);
            command
        } else {
            Command::new(command_path)
        };
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = command_path, ?args, use_sudo, "Executing controller command");

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = command_path, error = %e, "Failed to start controller command");
                return ProcessOutput {
                    exit_code: EXIT_CODE_NOT_STARTED,
                    stdout: String::new(),
                    stderr: e.to_string(),
                };
            }
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => ProcessOutput {
                exit_code: output.status.code().unwrap_or(EXIT_CODE_INTERRUPTED),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Ok(Err(e)) => ProcessOutput {
                exit_code: EXIT_CODE_INTERRUPTED,
                stdout: String::new(),
                stderr: e.to_string(),
            },
            // Dropping the wait future drops the child, which kills it
            Err(_) => {
                warn!(
                    command = command_path,
                    timeout_ms = timeout.as_millis() as u64,
                    "Controller command timed out"
                );
                ProcessOutput {
                    exit_code: EXIT_CODE_INTERRUPTED,
                    stdout: String::new(),
                    stderr: format!("timed out after {} ms", timeout.as_millis()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_captures_exit_code_and_output() {
        let output = TokioProcessExecutor
            .execute(
                "sh",
                false,
                Duration::from_secs(5),
                &sh("echo loaded; echo busy >&2; exit 3"),
            )
            .await;

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "loaded");
        assert_eq!(output.stderr.trim(), "busy");
    }

    #[tokio::test]
    async fn test_missing_command_reports_not_started() {
        let output = TokioProcessExecutor
            .execute(
                "/nonexistent/tape-controller",
                false,
                Duration::from_secs(5),
                &[],
            )
            .await;

        assert_eq!(output.exit_code, EXIT_CODE_NOT_STARTED);
        assert!(!output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_reports_interrupted() {
        let start = std::time::Instant::now();
        let output = TokioProcessExecutor
            .execute("sh", false, Duration::from_millis(100), &sh("sleep 5"))
            .await;

        assert_eq!(output.exit_code, EXIT_CODE_INTERRUPTED);
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
