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

//! tapectl - operator command-line interface for the tape library backend.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

mod commands;

use commands::Settings;

/// tapectl - inspect and operate a robotic tape library
#[derive(Parser)]
#[command(name = "tapectl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Library configuration file (can also be set via TAPE_LIBRARY_CONFIG)
    #[arg(long, env = "TAPE_LIBRARY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Queue database URL, overrides `database_url` of the configuration file
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Media changer commands
    Robot {
        #[command(subcommand)]
        command: RobotCommands,
    },
    /// Order queue maintenance
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Cartridge catalog commands
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
}

#[derive(Subcommand)]
enum RobotCommands {
    /// Print the drives and storage elements reported by the changer
    Status,
    /// Move a cartridge from a storage element into a drive
    Load {
        /// Storage element index (starting at 1)
        #[arg(long)]
        slot: u32,
        /// Data transfer element index
        #[arg(long)]
        drive: u32,
    },
    /// Move the cartridge of a drive back to a storage element
    Unload {
        /// Storage element index (starting at 1)
        #[arg(long)]
        slot: u32,
        /// Data transfer element index
        #[arg(long)]
        drive: u32,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Return orphaned RUNNING orders and cartridges to READY.
    ///
    /// Run only while the service is stopped: orders its drives are running
    /// would be handed out a second time.
    Bootstrap {
        /// Confirm the service is stopped
        #[arg(long)]
        force: bool,
    },
    /// Put a message back to READY so it is picked up again
    Requeue {
        /// Message id
        id: Uuid,
    },
    /// Count messages per type and state
    Stats,
    /// Delete completed orders older than a retention period
    Purge {
        /// Delete orders completed more than this long ago (e.g., "90d", "7d", "24h")
        #[arg(long, default_value = "30d")]
        older_than: String,

        /// Preview what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum CatalogCommands {
    /// Reconcile the catalog with the changer and print mounted cartridges
    Init,
    /// List catalog entries
    List {
        /// Only cartridges of this library
        #[arg(long)]
        library: Option<String>,

        /// Only cartridges dedicated to this bucket
        #[arg(long)]
        bucket: Option<String>,

        /// Print entries as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let settings = Settings::load(cli.config.as_deref(), cli.database_url)?;

    match cli.command {
        Commands::Robot { command } => match command {
            RobotCommands::Status => commands::robot::status(settings.config()?).await?,
            RobotCommands::Load { slot, drive } => {
                commands::robot::load(settings.config()?, slot, drive).await?
            }
            RobotCommands::Unload { slot, drive } => {
                commands::robot::unload(settings.config()?, slot, drive).await?
            }
        },
        Commands::Queue { command } => {
            let dal = settings.dal().await?;
            match command {
                QueueCommands::Bootstrap { force } => commands::queue::bootstrap(dal, force).await?,
                QueueCommands::Requeue { id } => commands::queue::requeue(dal, id).await?,
                QueueCommands::Stats => commands::queue::stats(dal).await?,
                QueueCommands::Purge {
                    older_than,
                    dry_run,
                } => commands::queue::purge(dal, &older_than, dry_run).await?,
            }
        }
        Commands::Catalog { command } => match command {
            CatalogCommands::Init => {
                let dal = settings.dal().await?;
                commands::catalog::init(settings.config()?, dal).await?
            }
            CatalogCommands::List {
                library,
                bucket,
                json,
            } => commands::catalog::list(settings.dal().await?, library, bucket, json).await?,
        },
    }

    Ok(())
}
