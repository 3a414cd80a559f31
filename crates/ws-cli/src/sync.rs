use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use ws_core::{Engine, FileResolution, Resolution};

use crate::{blocking, print_json};

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Sync a workspace with trunk
    Start {
        #[arg(long, value_name = "ID")]
        workspace: String,
    },
    /// Show the conflicts of an in-progress sync on a view
    Status {
        #[arg(long, value_name = "ID")]
        view: String,
    },
    /// Resolve conflicts and finish the sync
    Resolve(SyncResolveArgs),
}

#[derive(Args)]
pub struct SyncResolveArgs {
    #[arg(long, value_name = "ID")]
    pub view: String,

    /// Resolution for one conflicted file
    #[arg(
        long = "file",
        value_name = "PATH=trunk|workspace|custom",
        value_parser = parse_file_resolution
    )]
    pub files: Vec<FileResolution>,
}

/// Parse `path=resolution`. The path may itself contain `=`.
pub fn parse_file_resolution(value: &str) -> Result<FileResolution, String> {
    let (path, resolution) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("expected PATH=RESOLUTION, got '{}'", value))?;
    if path.is_empty() {
        return Err("file path must not be empty".to_string());
    }
    let resolution: Resolution = resolution.parse()?;
    Ok(FileResolution::new(path, resolution))
}

impl SyncCommands {
    pub async fn run(self, engine: Arc<Engine>) -> Result<()> {
        let status = match self {
            SyncCommands::Start { workspace } => {
                blocking(&engine, move |engine| engine.sync().on_trunk(&workspace))
                    .await
                    .context("Failed to sync workspace")?
            }
            SyncCommands::Status { view } => {
                blocking(&engine, move |engine| engine.sync().view_status(&view))
                    .await
                    .context("Failed to read sync status")?
            }
            SyncCommands::Resolve(args) => blocking(&engine, move |engine| {
                engine.sync().resolve(&args.view, &args.files)
            })
            .await
            .context("Failed to resolve conflicts")?,
        };
        print_json(&status)
    }
}
