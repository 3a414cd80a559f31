//! Creating codebases, workspaces and views.

use std::sync::Arc;

use tracing::info;
use ws_executor::ExecutorProvider;
use ws_local_db::{now_timestamp, CodebaseRecord, ViewRecord, WorkspaceRecord};
use ws_repo::GitRepo;

use crate::db::DatabaseManager;
use crate::error::GitContext;
use crate::{Error, Result};

const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

pub struct Provisioner {
    db: DatabaseManager,
    executors: Arc<ExecutorProvider>,
    trunk_branch: String,
}

impl Provisioner {
    pub fn new(
        db: DatabaseManager,
        executors: Arc<ExecutorProvider>,
        trunk_branch: impl Into<String>,
    ) -> Self {
        Self {
            db,
            executors,
            trunk_branch: trunk_branch.into(),
        }
    }

    /// Create a codebase whose trunk is either a fresh repository with one
    /// empty commit or a bare clone of `import_from`.
    pub fn create_codebase(&self, name: &str, import_from: Option<&str>) -> Result<CodebaseRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let trunk = self.trunk_branch.as_str();

        self.executors
            .executor()
            .schedule()
            .exec_trunk(&id, |repo| -> Result<()> {
                match import_from {
                    Some(source) => {
                        GitRepo::clone_bare(source, repo.root()).git_op("clone_trunk", repo)?;
                        let head = repo.head_branch().git_op("read_head", repo)?;
                        if head != trunk {
                            repo.create_branch_at(trunk, "HEAD")
                                .git_op("create_trunk_branch", repo)?;
                            repo.set_head_branch(trunk).git_op("set_head", repo)?;
                        }
                    }
                    None => {
                        GitRepo::init_bare_with_branch(repo.root(), trunk)
                            .git_op("init_trunk", repo)?;
                        let tree = repo.write_empty_tree().git_op("write_tree", repo)?;
                        let commit = repo
                            .commit_tree(&tree, None, INITIAL_COMMIT_MESSAGE)
                            .git_op("commit_tree", repo)?;
                        repo.update_ref(&format!("refs/heads/{}", trunk), &commit)
                            .git_op("update_ref", repo)?;
                    }
                }
                Ok(())
            })?;

        let record = CodebaseRecord {
            id,
            name: name.to_string(),
            created_at: now_timestamp(),
            archived_at: None,
        };
        self.db.insert_codebase(&record)?;
        info!(codebase_id = %record.id, name, imported = import_from.is_some(), "created codebase");
        Ok(record)
    }

    /// Create a workspace branched from the current trunk head.
    pub fn create_workspace(
        &self,
        codebase_id: &str,
        user_id: &str,
        name: Option<&str>,
    ) -> Result<WorkspaceRecord> {
        let codebase = self.db.codebase(codebase_id)?;
        let id = uuid::Uuid::new_v4().to_string();

        self.executors
            .executor()
            .write()
            .exec_trunk(&codebase.id, |repo| -> Result<()> {
                let head = repo
                    .rev_parse(&self.trunk_branch)
                    .git_op("resolve_trunk", repo)?;
                repo.create_branch_at(&id, &head)
                    .git_op("create_workspace_branch", repo)
            })?;

        let now = now_timestamp();
        let record = WorkspaceRecord {
            name: name.map(str::to_string).unwrap_or_else(|| format!("workspace-{}", &id[..8])),
            id,
            codebase_id: codebase.id,
            user_id: user_id.to_string(),
            view_id: None,
            latest_snapshot_id: None,
            created_at: now.clone(),
            updated_at: now,
            archived_at: None,
        };
        self.db.insert_workspace(&record)?;
        info!(workspace_id = %record.id, codebase_id, user_id, "created workspace");
        Ok(record)
    }

    /// Clone the trunk into a new view. The view starts on the trunk branch
    /// and hosts no workspace.
    pub fn create_view(
        &self,
        codebase_id: &str,
        user_id: &str,
        mount_path: Option<&str>,
        mount_hostname: Option<&str>,
    ) -> Result<ViewRecord> {
        let codebase = self.db.codebase(codebase_id)?;
        let id = uuid::Uuid::new_v4().to_string();
        let trunk_url = self
            .executors
            .layout()
            .trunk_path(&codebase.id)
            .to_string_lossy()
            .into_owned();

        self.executors
            .executor()
            .schedule()
            .exec_view(&codebase.id, &id, |repo| -> Result<()> {
                GitRepo::clone_from(&trunk_url, repo.root()).git_op("clone_view", repo)?;
                Ok(())
            })?;

        let hostname = match mount_hostname {
            Some(hostname) => Some(hostname.to_string()),
            None => local_hostname(),
        };
        let record = ViewRecord {
            id,
            codebase_id: codebase.id,
            user_id: user_id.to_string(),
            workspace_id: None,
            mount_path: mount_path.map(str::to_string),
            mount_hostname: hostname,
            created_at: now_timestamp(),
            last_used_at: None,
        };
        self.db.insert_view(&record)?;
        info!(view_id = %record.id, codebase_id, user_id, "created view");
        Ok(record)
    }

    /// Archive a workspace and free the view hosting it.
    pub fn archive_workspace(&self, workspace_id: &str) -> Result<WorkspaceRecord> {
        let workspace = self.db.workspace(workspace_id)?;
        if workspace.is_archived() {
            return Err(Error::Archived { id: workspace.id });
        }
        self.db.archive_workspace(workspace_id)?;
        info!(workspace_id, "archived workspace");
        self.db.workspace(workspace_id)
    }
}

fn local_hostname() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .map(|name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_hostname_is_not_empty() {
        if let Some(name) = local_hostname() {
            assert!(!name.is_empty());
        }
    }
}
