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

//! Implementation of the `queue` commands.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Duration, Utc};
use tape_library::models::{QueueMessageType, QueueState};
use tape_library::{
    PersistentQueueRepository, PersistentTapeCatalogService, QueueRepository, DAL,
};
use tracing::info;
use uuid::Uuid;

/// Parse a duration string like "90d", "24h" or "7d12h" into a chrono::Duration.
///
/// Units are `d`, `h`, `m` and `s`; the result must be positive.
fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err(anyhow!("Duration string cannot be empty"));
    }

    let mut total = Duration::zero();
    let mut digits = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return Err(anyhow!(
                "Invalid duration format: expected number before '{}'",
                c
            ));
        }

        let num: i64 = digits
            .parse()
            .with_context(|| format!("Invalid number in duration: {}", digits))?;
        digits.clear();

        let part = match c {
            'd' => Duration::try_days(num),
            'h' => Duration::try_hours(num),
            'm' => Duration::try_minutes(num),
            's' => Duration::try_seconds(num),
            _ => return Err(anyhow!("Unknown duration unit: '{}'. Use d, h, m, or s", c)),
        };
        total = part
            .and_then(|part| total.checked_add(&part))
            .ok_or_else(|| anyhow!("Duration '{}' is out of range", s))?;
    }

    if !digits.is_empty() {
        return Err(anyhow!(
            "Duration '{}' is missing a unit. Use d (days), h (hours), m (minutes), or s (seconds)",
            s
        ));
    }
    if total == Duration::zero() {
        return Err(anyhow!("Duration must be greater than zero"));
    }

    Ok(total)
}

/// Run the `queue bootstrap` command.
///
/// Same recovery the service performs at startup: orphaned orders and
/// cartridges reserved by no drive go back to `READY`. Only safe while the
/// service is stopped, since orders its drives are running look orphaned
/// too; `force` confirms it is.
pub async fn bootstrap(dal: DAL, force: bool) -> Result<()> {
    if !force {
        bail!(
            "queue bootstrap resets every RUNNING order and reserved cartridge; \
             stop the service first, then rerun with --force"
        );
    }
    let orders = PersistentQueueRepository::new(dal.clone())
        .initialize_on_bootstrap()
        .await
        .context("Failed to reset running orders")?;
    let tapes = PersistentTapeCatalogService::new(dal)
        .initialize_on_bootstrap()
        .await
        .context("Failed to reset reserved cartridges")?;

    info!(
        "Reset {} order(s) and {} cartridge(s) to READY",
        orders, tapes
    );
    Ok(())
}

/// Run the `queue requeue` command.
pub async fn requeue(dal: DAL, id: Uuid) -> Result<()> {
    let updated = PersistentQueueRepository::new(dal)
        .mark_ready(id)
        .await
        .context("Failed to requeue message")?;

    if updated == 0 {
        bail!("No queue message with id {}", id);
    }
    info!("Message {} is READY again", id);
    Ok(())
}

/// Run the `queue stats` command.
pub async fn stats(dal: DAL) -> Result<()> {
    let queue = PersistentQueueRepository::new(dal);
    let states = [
        QueueState::Ready,
        QueueState::Running,
        QueueState::Completed,
        QueueState::Error,
    ];

    println!(
        "{:<12} {:>10} {:>10} {:>10} {:>10}",
        "TYPE", "READY", "RUNNING", "COMPLETED", "ERROR"
    );
    for message_type in [
        QueueMessageType::ReadOrder,
        QueueMessageType::WriteOrder,
        QueueMessageType::TapeCatalog,
    ] {
        let mut counts = Vec::with_capacity(states.len());
        for state in states {
            let count = queue
                .count(message_type, state)
                .await
                .with_context(|| format!("Failed to count {} {} messages", state, message_type))?;
            counts.push(count);
        }
        println!(
            "{:<12} {:>10} {:>10} {:>10} {:>10}",
            message_type.as_str(),
            counts[0],
            counts[1],
            counts[2],
            counts[3]
        );
    }
    Ok(())
}

/// Run the `queue purge` command.
///
/// # Arguments
///
/// * `older_than` - Duration string (e.g., "90d", "30d")
/// * `dry_run` - If true, only report what would be deleted
pub async fn purge(dal: DAL, older_than: &str, dry_run: bool) -> Result<()> {
    let duration = parse_duration(older_than)
        .with_context(|| format!("Invalid duration: '{}'", older_than))?;
    let cutoff = Utc::now()
        .checked_sub_signed(duration)
        .ok_or_else(|| anyhow!("Duration '{}' reaches before the supported date range", older_than))?;

    info!(
        "Purging orders completed more than {} ago (cutoff: {})",
        older_than, cutoff
    );

    let messages = dal.queue_message();
    if dry_run {
        let count = messages
            .count_completed_before(cutoff.timestamp_millis())
            .await
            .context("Failed to count completed orders")?;
        info!(
            "[DRY RUN] Would delete {} completed order(s) older than {}",
            count, cutoff
        );
    } else {
        let deleted = messages
            .delete_completed_before(cutoff.timestamp_millis())
            .await
            .context("Failed to delete completed orders")?;
        info!("Deleted {} completed order(s) older than {}", deleted, cutoff);
    }

    Ok(())
}
