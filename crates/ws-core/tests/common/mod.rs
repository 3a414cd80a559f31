#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use ws_core::{Engine, EngineConfig};
use ws_local_db::{CodebaseRecord, ViewRecord, WorkspaceRecord};
use ws_repo::test_helpers::{push_branch, run_git};

pub struct Fixture {
    pub home: TempDir,
    pub engine: Engine,
    pub codebase: CodebaseRecord,
}

impl Fixture {
    /// Engine rooted in a temporary home with one fresh codebase whose trunk
    /// holds `files`.
    pub fn new(files: &[(&str, &str)]) -> Self {
        let home = TempDir::new().unwrap();
        let mut config = EngineConfig::for_home(home.path());
        config.signature_name = "Test User".to_string();
        config.signature_email = "test@example.com".to_string();
        let engine = Engine::open(config).unwrap();
        let codebase = engine.provisioner().create_codebase("demo", None).unwrap();

        let fixture = Self {
            home,
            engine,
            codebase,
        };
        if !files.is_empty() {
            fixture.commit_on_trunk("seed", |checkout| {
                for (file, content) in files {
                    write(checkout, file, content);
                }
            });
        }
        fixture
    }

    pub fn trunk_path(&self) -> PathBuf {
        self.engine
            .executors()
            .layout()
            .trunk_path(&self.codebase.id)
    }

    pub fn view_path(&self, view: &ViewRecord) -> PathBuf {
        self.engine
            .executors()
            .layout()
            .view_path(&self.codebase.id, &view.id)
    }

    /// Commit on trunk as another contributor would, through a throwaway clone.
    pub fn commit_on_trunk(&self, message: &str, edit: impl FnOnce(&Path)) -> String {
        let scratch = TempDir::new().unwrap();
        let checkout = scratch.path().join("contrib");
        run_git(
            scratch.path(),
            &["clone", "--quiet", &self.trunk_path().to_string_lossy(), "contrib"],
        )
        .unwrap();
        run_git(&checkout, &["config", "user.email", "contrib@example.com"]).unwrap();
        run_git(&checkout, &["config", "user.name", "Contributor"]).unwrap();
        run_git(&checkout, &["config", "commit.gpgsign", "false"]).unwrap();

        edit(&checkout);
        run_git(&checkout, &["add", "--all"]).unwrap();
        run_git(&checkout, &["commit", "--quiet", "-m", message]).unwrap();
        push_branch(&checkout, "trunk").unwrap();
        run_git(&checkout, &["rev-parse", "HEAD"]).unwrap()
    }

    pub fn trunk_head(&self) -> String {
        self.branch_head("trunk")
    }

    /// Tip of `branch` as published in the trunk repository.
    pub fn branch_head(&self, branch: &str) -> String {
        run_git(&self.trunk_path(), &["rev-parse", &format!("refs/heads/{}", branch)]).unwrap()
    }

    pub fn workspace(&self, user: &str) -> WorkspaceRecord {
        self.engine
            .provisioner()
            .create_workspace(&self.codebase.id, user, None)
            .unwrap()
    }

    pub fn view(&self, user: &str) -> ViewRecord {
        self.engine
            .provisioner()
            .create_view(&self.codebase.id, user, None, Some("test-host"))
            .unwrap()
    }

    /// A workspace opened on a fresh view of the same user.
    pub fn open_workspace(&self, user: &str) -> (WorkspaceRecord, ViewRecord, PathBuf) {
        let workspace = self.workspace(user);
        let view = self.view(user);
        let view = self
            .engine
            .views()
            .open_workspace_on_view(&view.id, &workspace.id)
            .unwrap();
        let path = self.view_path(&view);
        (workspace, view, path)
    }
}

pub fn write(root: &Path, file: &str, content: &str) {
    let path = root.join(file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

pub fn read(root: &Path, file: &str) -> String {
    std::fs::read_to_string(root.join(file)).unwrap()
}

pub fn head_of(path: &Path) -> String {
    run_git(path, &["rev-parse", "HEAD"]).unwrap()
}

pub fn current_branch(path: &Path) -> String {
    run_git(path, &["symbolic-ref", "--short", "HEAD"]).unwrap()
}
