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

//! Command implementations and the settings they share.

use anyhow::{Context, Result};
use std::path::Path;
use tape_library::{Database, TapeLibraryConfig, DAL};
use tracing::debug;

pub mod catalog;
pub mod queue;
pub mod robot;

/// Configuration file and database URL resolved from the command line.
pub struct Settings {
    config: Option<TapeLibraryConfig>,
    database_url: Option<String>,
}

impl Settings {
    /// Loads the configuration file when one is given.
    ///
    /// An explicit database URL wins over the one in the configuration file.
    pub fn load(config_path: Option<&Path>, database_url: Option<String>) -> Result<Self> {
        let config = config_path
            .map(|path| {
                TapeLibraryConfig::load(path)
                    .with_context(|| format!("Failed to load configuration '{}'", path.display()))
            })
            .transpose()?;

        Ok(Self::new(config, database_url))
    }

    fn new(config: Option<TapeLibraryConfig>, database_url: Option<String>) -> Self {
        let database_url =
            database_url.or_else(|| config.as_ref().and_then(|c| c.database_url.clone()));
        Self {
            config,
            database_url,
        }
    }

    pub fn config(&self) -> Result<&TapeLibraryConfig> {
        self.config.as_ref().context(
            "A configuration file is required. Set --config or TAPE_LIBRARY_CONFIG environment variable",
        )
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url.as_deref().context(
            "Database URL is required. Set --database-url, DATABASE_URL or database_url in the configuration file",
        )
    }

    /// Opens the queue database, creating or migrating it as needed.
    pub async fn dal(&self) -> Result<DAL> {
        let database_url = self.database_url()?;
        debug!(database_url, "Opening queue database");

        let database = Database::new(database_url).context("Failed to connect to database")?;
        database
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;

        Ok(DAL::new(database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        library_identifier = "lib-1"
        database_url = "/var/lib/tape/queue.db"

        [robot]
        device = "/dev/sg1"

        [[drives]]
        index = 0
        device = "/dev/nst0"
    "#;

    #[test]
    fn test_database_url_from_configuration() {
        let config = TapeLibraryConfig::from_toml(CONFIG).unwrap();
        let settings = Settings::new(Some(config), None);
        assert_eq!(settings.database_url().unwrap(), "/var/lib/tape/queue.db");
    }

    #[test]
    fn test_explicit_database_url_wins() {
        let config = TapeLibraryConfig::from_toml(CONFIG).unwrap();
        let settings = Settings::new(Some(config), Some("/tmp/other.db".to_string()));
        assert_eq!(settings.database_url().unwrap(), "/tmp/other.db");
    }

    #[test]
    fn test_missing_settings_are_reported() {
        let settings = Settings::new(None, None);
        assert!(settings.config().is_err());
        assert!(settings.database_url().is_err());
    }
}
