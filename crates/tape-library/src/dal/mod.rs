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

//! Data Access Layer
//!
//! Thin, SQL-level operations over the queue store. The [`queue`](crate::queue)
//! and [`catalog`](crate::catalog) services build their contracts on top of it.

use crate::database::Database;

pub mod models;
pub mod queue_message;

pub use queue_message::QueueMessageDAL;

/// Entry point of the data access layer.
#[derive(Clone, Debug)]
pub struct DAL {
    pub database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        DAL { database }
    }

    /// Returns a QueueMessageDAL for queue message operations.
    pub fn queue_message(&self) -> QueueMessageDAL<'_> {
        QueueMessageDAL::new(self)
    }
}
