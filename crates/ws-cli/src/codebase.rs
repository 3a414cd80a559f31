use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use ws_core::Engine;

use crate::{blocking, print_json};

#[derive(Subcommand)]
pub enum CodebaseCommands {
    /// Create a codebase, optionally importing an existing repository
    Create(CodebaseCreateArgs),
}

#[derive(Args)]
pub struct CodebaseCreateArgs {
    /// Display name
    #[arg(long, value_name = "NAME")]
    pub name: String,

    /// Repository path or URL to import as trunk
    #[arg(long = "import", value_name = "PATH_OR_URL")]
    pub import: Option<String>,
}

impl CodebaseCommands {
    pub async fn run(self, engine: Arc<Engine>) -> Result<()> {
        match self {
            CodebaseCommands::Create(args) => {
                let codebase = blocking(&engine, move |engine| {
                    engine
                        .provisioner()
                        .create_codebase(&args.name, args.import.as_deref())
                })
                .await
                .context("Failed to create codebase")?;
                print_json(&codebase)
            }
        }
    }
}
