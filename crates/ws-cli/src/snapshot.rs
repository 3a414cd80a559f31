use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;
use ws_core::{Engine, SnapshotAction, SnapshotOptions};

use crate::{blocking, print_json};

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Snapshot a workspace on the view hosting it
    Take {
        #[arg(long, value_name = "ID")]
        workspace: String,
    },
    /// List a workspace's snapshots, oldest first
    List {
        #[arg(long, value_name = "ID")]
        workspace: String,
    },
}

impl SnapshotCommands {
    pub async fn run(self, engine: Arc<Engine>) -> Result<()> {
        match self {
            SnapshotCommands::Take { workspace } => {
                let snapshot = blocking(&engine, move |engine| {
                    let record = engine.db().workspace(&workspace)?;
                    engine.snapshotter().snapshot(
                        &record.codebase_id,
                        &record.id,
                        SnapshotAction::Manual,
                        SnapshotOptions::new().mark_as_latest(),
                    )
                })
                .await
                .context("Failed to take snapshot")?;
                print_json(&snapshot)
            }
            SnapshotCommands::List { workspace } => {
                let snapshots =
                    blocking(&engine, move |engine| engine.db().list_snapshots(&workspace))
                        .await
                        .context("Failed to list snapshots")?;
                print_json(&snapshots)
            }
        }
    }
}
