use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use ws_core::Engine;

use crate::{blocking, print_json};

#[derive(Subcommand)]
pub enum ViewCommands {
    /// Clone the trunk into a new view
    Create(ViewCreateArgs),
    /// Open a workspace on a view
    Open(ViewOpenArgs),
}

#[derive(Args)]
pub struct ViewCreateArgs {
    #[arg(long, value_name = "ID")]
    pub codebase: String,

    /// Owning user
    #[arg(long, value_name = "USER")]
    pub user: String,

    /// Where the view is mounted on the user's machine
    #[arg(long = "mount-path", value_name = "PATH")]
    pub mount_path: Option<String>,

    /// Defaults to the local hostname
    #[arg(long = "mount-hostname", value_name = "HOST")]
    pub mount_hostname: Option<String>,
}

#[derive(Args)]
pub struct ViewOpenArgs {
    #[arg(long, value_name = "ID")]
    pub view: String,

    #[arg(long, value_name = "ID")]
    pub workspace: String,
}

impl ViewCommands {
    pub async fn run(self, engine: Arc<Engine>) -> Result<()> {
        match self {
            ViewCommands::Create(args) => {
                let view = blocking(&engine, move |engine| {
                    engine.provisioner().create_view(
                        &args.codebase,
                        &args.user,
                        args.mount_path.as_deref(),
                        args.mount_hostname.as_deref(),
                    )
                })
                .await
                .context("Failed to create view")?;
                print_json(&view)
            }
            ViewCommands::Open(args) => {
                let view = blocking(&engine, move |engine| {
                    engine
                        .views()
                        .open_workspace_on_view(&args.view, &args.workspace)
                })
                .await
                .context("Failed to open workspace on view")?;
                print_json(&view)
            }
        }
    }
}
