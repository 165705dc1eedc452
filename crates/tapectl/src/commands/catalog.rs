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

//! Implementation of the `catalog` commands.

use anyhow::{Context, Result};
use tape_library::models::{TapeCatalog, TapeLocation};
use tape_library::queue::BucketFilter;
use tape_library::{
    PersistentTapeCatalogService, QueueFilter, TapeCatalogService, TapeLibraryConfig, DAL,
};
use tracing::info;

use super::robot::robot_pool;

/// Run the `catalog init` command.
///
/// Asks the changer for the library state, reconciles the catalog with it
/// and prints the cartridge found in each drive.
pub async fn init(config: &TapeLibraryConfig, dal: DAL) -> Result<()> {
    let pool = robot_pool(config);
    let catalog = PersistentTapeCatalogService::new(dal);

    let mounted = catalog
        .bootstrap(&pool)
        .await
        .context("Failed to initialize the tape catalog")?;

    info!(
        library = %config.library_identifier,
        mounted = mounted.len(),
        "Tape catalog initialized"
    );

    let mut drives: Vec<_> = mounted.into_iter().collect();
    drives.sort_by_key(|(index, _)| *index);
    for (index, tape) in drives {
        println!("drive {:>3}  {}", index, tape.code);
    }
    Ok(())
}

/// Run the `catalog list` command.
pub async fn list(
    dal: DAL,
    library: Option<String>,
    bucket: Option<String>,
    json: bool,
) -> Result<()> {
    let mut query = QueueFilter::new();
    if let Some(library) = library {
        query = query.library(library);
    }
    if let Some(bucket) = bucket {
        query = query.bucket(BucketFilter::Is(bucket));
    }

    let tapes = PersistentTapeCatalogService::new(dal)
        .find(query)
        .await
        .context("Failed to list catalog entries")?;

    for tape in &tapes {
        if json {
            println!(
                "{}",
                serde_json::to_string(tape).context("Failed to serialize catalog entry")?
            );
        } else {
            println!("{}", render_tape(tape));
        }
    }
    Ok(())
}

fn location(location: Option<TapeLocation>) -> String {
    match location {
        Some(location) => format!("{:?} {}", location.location_type, location.index),
        None => "-".to_string(),
    }
}

fn render_tape(tape: &TapeCatalog) -> String {
    format!(
        "{:<10} {:<9} {:<6} {:<12} {:<10} files={:<5} bytes={}",
        tape.code,
        tape.state.as_str(),
        tape.tape_state.as_str(),
        tape.bucket.as_deref().unwrap_or("-"),
        location(tape.current_location),
        tape.file_count,
        tape.written_bytes
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tape_library::models::TapeState;

    #[test]
    fn test_render_tape() {
        let mut tape = TapeCatalog::new("TAPE01L6", "lib-1");
        tape.bucket = Some("objects".to_string());
        tape.tape_state = TapeState::Open;
        tape.current_location = Some(TapeLocation::drive(0));
        tape.file_count = 3;
        tape.written_bytes = 42;

        let rendered = render_tape(&tape);
        assert!(rendered.starts_with("TAPE01L6   READY     OPEN   objects"));
        assert!(rendered.contains("Drive 0"));
        assert!(rendered.ends_with("files=3     bytes=42"));
    }

    #[test]
    fn test_unknown_location() {
        assert_eq!(location(None), "-");
        assert_eq!(location(Some(TapeLocation::slot(7))), "Slot 7");
    }
}
