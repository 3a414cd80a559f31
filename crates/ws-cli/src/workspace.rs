use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use ws_core::Engine;

use crate::{blocking, print_json};

#[derive(Subcommand)]
pub enum WorkspaceCommands {
    /// Create a workspace branched from the current trunk
    Create(WorkspaceCreateArgs),
    /// Archive a workspace and free its view
    Archive {
        /// Workspace id
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(Args)]
pub struct WorkspaceCreateArgs {
    #[arg(long, value_name = "ID")]
    pub codebase: String,

    /// Owning user
    #[arg(long, value_name = "USER")]
    pub user: String,

    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,
}

impl WorkspaceCommands {
    pub async fn run(self, engine: Arc<Engine>) -> Result<()> {
        match self {
            WorkspaceCommands::Create(args) => {
                let workspace = blocking(&engine, move |engine| {
                    engine.provisioner().create_workspace(
                        &args.codebase,
                        &args.user,
                        args.name.as_deref(),
                    )
                })
                .await
                .context("Failed to create workspace")?;
                print_json(&workspace)
            }
            WorkspaceCommands::Archive { id } => {
                let workspace =
                    blocking(&engine, move |engine| engine.provisioner().archive_workspace(&id))
                        .await
                        .context("Failed to archive workspace")?;
                print_json(&workspace)
            }
        }
    }
}
