use anyhow::Result;
use ws_cli::{Cli, Parser};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();
    cli.run().await
}
