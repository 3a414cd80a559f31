//! Workspace sync CLI library

pub mod codebase;
pub mod snapshot;
pub mod sync;
pub mod view;
pub mod workspace;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use ws_core::{Engine, EngineConfig};

// Re-export CLI types for testing
pub use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wsync")]
#[command(about = "Keep workspaces in sync with their codebase's trunk")]
#[command(version, author, long_about = None)]
pub struct Cli {
    /// State directory (defaults to $WSYNC_HOME or the platform state dir)
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long = "log-level", global = true, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Codebase management
    Codebase {
        #[command(subcommand)]
        subcommand: codebase::CodebaseCommands,
    },
    /// Workspace management
    Workspace {
        #[command(subcommand)]
        subcommand: workspace::WorkspaceCommands,
    },
    /// View management
    View {
        #[command(subcommand)]
        subcommand: view::ViewCommands,
    },
    /// Sync workspaces with trunk and resolve conflicts
    Sync {
        #[command(subcommand)]
        subcommand: sync::SyncCommands,
    },
    /// Working directory snapshots
    Snapshot {
        #[command(subcommand)]
        subcommand: snapshot::SnapshotCommands,
    },
}

impl Cli {
    pub fn init_logging(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    pub fn open_engine(&self) -> Result<Arc<Engine>> {
        let config =
            EngineConfig::load(self.home.clone()).context("Failed to load engine configuration")?;
        let engine = Engine::open(config).context("Failed to open engine state")?;
        Ok(Arc::new(engine))
    }

    pub async fn run(self) -> Result<()> {
        let engine = self.open_engine()?;
        match self.command {
            Commands::Codebase { subcommand } => subcommand.run(engine).await,
            Commands::Workspace { subcommand } => subcommand.run(engine).await,
            Commands::View { subcommand } => subcommand.run(engine).await,
            Commands::Sync { subcommand } => subcommand.run(engine).await,
            Commands::Snapshot { subcommand } => subcommand.run(engine).await,
        }
    }
}

/// Run an engine call on the blocking pool. Engine calls hold repository
/// locks and shell out to git.
pub async fn blocking<T, F>(engine: &Arc<Engine>, call: F) -> Result<T>
where
    F: FnOnce(&Engine) -> ws_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let engine = Arc::clone(engine);
    let result = tokio::task::spawn_blocking(move || call(&engine))
        .await
        .context("Engine task failed")?;
    Ok(result?)
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", output);
    Ok(())
}
