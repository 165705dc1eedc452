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

//! Robot / media changer mediation.
//!
//! All cartridge moves go through a [`TapeRobotService`], which serializes
//! its commands, and drives share robots through a [`TapeRobotPool`].
//! Command failures come back as a [`StatusCode`](crate::models::StatusCode)
//! on the response; only precondition violations are errors.

pub mod parser;
pub mod pool;
pub mod process;
pub mod service;

pub use parser::{parse_status, StatusParseError};
pub use pool::{RobotToken, TapeRobotPool};
pub use process::{ProcessExecutor, ProcessOutput, TokioProcessExecutor};
pub use service::TapeRobotService;
