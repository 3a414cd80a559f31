use ws_cli::sync::{parse_file_resolution, SyncCommands};
use ws_cli::view::ViewCommands;
use ws_cli::workspace::WorkspaceCommands;
use ws_cli::{Cli, Commands, Parser};
use ws_core::Resolution;

#[test]
fn test_cli_parsing_sync_start() {
    let cli = Cli::try_parse_from(["wsync", "sync", "start", "--workspace", "w1"]).unwrap();
    match cli.command {
        Commands::Sync {
            subcommand: SyncCommands::Start { workspace },
        } => assert_eq!(workspace, "w1"),
        _ => panic!("expected sync start"),
    }
    assert_eq!(cli.log_level, "info");
    assert!(cli.home.is_none());
}

#[test]
fn test_cli_parsing_resolve_files() {
    let cli = Cli::try_parse_from([
        "wsync",
        "sync",
        "resolve",
        "--view",
        "v1",
        "--file",
        "src/a.rs=trunk",
        "--file",
        "b=c.txt=custom",
    ])
    .unwrap();

    match cli.command {
        Commands::Sync {
            subcommand: SyncCommands::Resolve(args),
        } => {
            assert_eq!(args.view, "v1");
            assert_eq!(args.files.len(), 2);
            assert_eq!(args.files[0].path, "src/a.rs");
            assert_eq!(args.files[0].resolution, Resolution::Trunk);
            assert_eq!(args.files[1].path, "b=c.txt");
            assert_eq!(args.files[1].resolution, Resolution::Custom);
        }
        _ => panic!("expected sync resolve"),
    }
}

#[test]
fn test_cli_rejects_bad_resolution() {
    let result = Cli::try_parse_from([
        "wsync", "sync", "resolve", "--view", "v1", "--file", "a.txt=mine",
    ]);
    assert!(result.is_err());
    assert!(parse_file_resolution("a.txt").is_err());
    assert!(parse_file_resolution("=trunk").is_err());
}

#[test]
fn test_cli_parsing_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "wsync",
        "view",
        "open",
        "--view",
        "v1",
        "--workspace",
        "w1",
        "--home",
        "/tmp/wsync",
        "--log-level",
        "debug",
    ])
    .unwrap();

    assert_eq!(cli.home.as_deref(), Some(std::path::Path::new("/tmp/wsync")));
    assert_eq!(cli.log_level, "debug");
    assert!(matches!(
        cli.command,
        Commands::View {
            subcommand: ViewCommands::Open(_)
        }
    ));
}

#[test]
fn test_cli_parsing_workspace_archive() {
    let cli = Cli::try_parse_from(["wsync", "workspace", "archive", "w1"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Workspace {
            subcommand: WorkspaceCommands::Archive { .. }
        }
    ));
}

#[test]
fn test_cli_requires_subcommand_arguments() {
    assert!(Cli::try_parse_from(["wsync", "sync", "status"]).is_err());
    assert!(Cli::try_parse_from(["wsync", "codebase", "create"]).is_err());
}

#[tokio::test]
async fn test_run_creates_codebase_in_home() {
    let home = tempfile::TempDir::new().unwrap();
    let git_ok = std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !git_ok {
        eprintln!("Git not available, skipping test");
        return;
    }

    let cli = Cli::try_parse_from([
        "wsync",
        "--home",
        home.path().to_str().unwrap(),
        "codebase",
        "create",
        "--name",
        "demo",
    ])
    .unwrap();
    cli.run().await.unwrap();

    assert!(home.path().join("state.db").exists());
    assert!(home.path().join("repos").is_dir());
}
