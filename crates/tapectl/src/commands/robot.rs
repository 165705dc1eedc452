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

//! Implementation of the `robot` commands.
//!
//! Every command checks a robot out of the configured pool, so the changer
//! is driven exactly as the drive workers drive it.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tape_library::library::robot_pool_from_config;
use tape_library::models::{TapeCartridge, TapeLibraryState, TapeResponse};
use tape_library::robot::{RobotToken, TokioProcessExecutor};
use tape_library::{TapeLibraryConfig, TapeRobotPool};
use tracing::info;

pub(crate) fn robot_pool(config: &TapeLibraryConfig) -> TapeRobotPool {
    robot_pool_from_config(config, Arc::new(TokioProcessExecutor))
}

async fn checkout(pool: &TapeRobotPool) -> Result<RobotToken> {
    pool.checkout().await.context("Failed to check out a robot")
}

fn ensure_ok<T>(command: &str, response: &TapeResponse<T>) -> Result<()> {
    if !response.is_ok() {
        bail!(
            "Changer {} failed with status {:?}: {}",
            command,
            response.status,
            response.message.as_deref().unwrap_or("no diagnostic output")
        );
    }
    Ok(())
}

/// Run the `robot status` command.
pub async fn status(config: &TapeLibraryConfig) -> Result<()> {
    let pool = robot_pool(config);
    let response = checkout(&pool).await?.status().await;
    ensure_ok("status", &response)?;

    match response.entity {
        Some(state) => print!("{}", render_state(&state)),
        None => bail!("Changer status returned no library state"),
    }
    Ok(())
}

/// Run the `robot load` command.
pub async fn load(config: &TapeLibraryConfig, slot: u32, drive: u32) -> Result<()> {
    let pool = robot_pool(config);
    let response = checkout(&pool)
        .await?
        .load_tape(slot, drive)
        .await
        .context("Invalid load request")?;
    ensure_ok("load", &response)?;

    info!("Loaded slot {} into drive {}", slot, drive);
    Ok(())
}

/// Run the `robot unload` command.
pub async fn unload(config: &TapeLibraryConfig, slot: u32, drive: u32) -> Result<()> {
    let pool = robot_pool(config);
    let response = checkout(&pool)
        .await?
        .unload_tape(slot, drive)
        .await
        .context("Invalid unload request")?;
    ensure_ok("unload", &response)?;

    info!("Unloaded drive {} into slot {}", drive, slot);
    Ok(())
}

fn cartridge(tape: Option<&TapeCartridge>) -> String {
    match tape {
        Some(tape) => tape
            .volume_tag
            .clone()
            .unwrap_or_else(|| "(no barcode)".to_string()),
        None => "empty".to_string(),
    }
}

fn render_state(state: &TapeLibraryState) -> String {
    let mut out = format!(
        "{}: {} drive(s), {} slot(s), {} mail slot(s)\n",
        state.device, state.drive_count, state.slot_count, state.mailbox_count
    );
    for drive in &state.drives {
        out.push_str(&format!(
            "  drive {:>3}  {}",
            drive.index,
            cartridge(drive.tape.as_ref())
        ));
        if let Some(slot) = drive.tape.as_ref().and_then(|tape| tape.slot_index) {
            out.push_str(&format!(" (from slot {})", slot));
        }
        out.push('\n');
    }
    for slot in &state.slots {
        out.push_str(&format!(
            "  slot  {:>3}  {:?}  {}\n",
            slot.index,
            slot.slot_type,
            cartridge(slot.tape.as_ref())
        ));
    }
    out
}
