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

//! SQLite connection pool for the queue store.
//!
//! Connections are pooled with `deadpool-diesel`; every blocking diesel call
//! runs through `interact` so it never stalls the async runtime.
//!
//! # Example
//!
//! ```rust,ignore
//! use tape_library::database::Database;
//!
//! let db = Database::new("sqlite:///var/lib/tape/queue.db")?;
//! db.run_migrations().await?;
//! ```

use deadpool_diesel::sqlite::{
    Manager as SqliteManager, Pool as SqlitePool, Runtime as SqliteRuntime,
};
use tracing::info;

use crate::error::DatabaseError;

/// Shared handle on the SQLite connection pool.
///
/// `Database` is `Clone`; every clone references the same pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("max_size", &self.pool.status().max_size)
            .finish()
    }
}

impl Database {
    /// SQLite has limited concurrent write support even with WAL mode.
    /// A single pooled connection avoids "database is locked" errors; every
    /// queue transition is a short transaction, so callers simply wait their turn.
    const POOL_SIZE: usize = 1;

    /// Creates the connection pool.
    ///
    /// # Arguments
    ///
    /// * `connection_string` - A file path, `sqlite://` URL, `file:` URI or `:memory:`
    pub fn new(connection_string: &str) -> Result<Self, DatabaseError> {
        let connection_url = Self::build_sqlite_url(connection_string);
        let manager = SqliteManager::new(connection_url, SqliteRuntime::Tokio1);
        let pool = SqlitePool::builder(manager)
            .max_size(Self::POOL_SIZE)
            .build()
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;

        info!("SQLite connection pool initialized (size: {})", Self::POOL_SIZE);

        Ok(Self { pool })
    }

    /// Strips an optional `sqlite://` prefix.
    fn build_sqlite_url(connection_string: &str) -> String {
        if let Some(path) = connection_string.strip_prefix("sqlite://") {
            path.to_string()
        } else {
            connection_string.to_string()
        }
    }

    /// Runs pending migrations after switching the database to WAL mode.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.get_connection().await?;

        conn.interact(|conn| {
            use diesel::prelude::*;
            use diesel_migrations::MigrationHarness;

            // WAL mode allows concurrent reads during writes
            diesel::sql_query("PRAGMA journal_mode=WAL;")
                .execute(conn)
                .map_err(|e| e.to_string())?;
            // Wait on locks held by other processes (e.g. tapectl) instead of failing
            diesel::sql_query("PRAGMA busy_timeout=30000;")
                .execute(conn)
                .map_err(|e| e.to_string())?;

            conn.run_pending_migrations(super::SQLITE_MIGRATIONS)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))?
        .map_err(DatabaseError::Migration)?;

        Ok(())
    }

    /// Gets a pooled connection.
    pub async fn get_connection(
        &self,
    ) -> Result<deadpool::managed::Object<SqliteManager>, DatabaseError> {
        self.pool
            .get()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))
    }
}
