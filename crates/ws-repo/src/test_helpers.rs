//! Git repository fixtures for unit and integration tests.
//!
//! Every fixture starts from a bare "origin" repository with a trunk branch,
//! which is how the sync engine sees a codebase.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

use crate::repo::GitIdentity;

pub type HelperResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Check if git is available on the system.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Configuration options for fixture repositories.
#[derive(Debug, Clone)]
pub struct GitRepoConfig {
    /// Git user email (default: "test@example.com")
    pub user_email: String,
    /// Git user name (default: "Test User")
    pub user_name: String,
    /// Branch the remote treats as trunk (default: "trunk")
    pub trunk_branch: String,
    /// Files committed on trunk before the first push (default: README.md)
    pub initial_files: Vec<(String, String)>,
}

impl GitRepoConfig {
    /// Create a new GitRepoConfig with default values, allowing fluent configuration.
    ///
    /// ```rust
    /// use ws_repo::test_helpers::GitRepoConfig;
    ///
    /// let config = GitRepoConfig::new()
    ///     .trunk_branch("main")
    ///     .initial_file("a.txt", "a\n");
    /// assert_eq!(config.initial_files.len(), 2);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = email.into();
        self
    }

    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = name.into();
        self
    }

    pub fn trunk_branch(mut self, branch: impl Into<String>) -> Self {
        self.trunk_branch = branch.into();
        self
    }

    /// Add a file to the initial trunk commit.
    pub fn initial_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.initial_files.push((path.into(), content.into()));
        self
    }

    pub fn identity(&self) -> GitIdentity {
        GitIdentity::new(&self.user_name, &self.user_email)
    }
}

impl Default for GitRepoConfig {
    fn default() -> Self {
        Self {
            user_email: "test@example.com".to_string(),
            user_name: "Test User".to_string(),
            trunk_branch: "trunk".to_string(),
            initial_files: vec![("README.md".to_string(), "Initial content\n".to_string())],
        }
    }
}

/// A bare remote with a populated trunk branch.
pub struct TestRemote {
    /// Keeps the fixture directory alive for the duration of the test
    pub dir: TempDir,
    /// Path to the bare repository
    pub path: PathBuf,
    pub config: GitRepoConfig,
}

impl TestRemote {
    pub fn url(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    /// Clone the remote into `<fixture>/<name>` with the fixture identity configured.
    pub fn clone_checkout(&self, name: &str) -> HelperResult<PathBuf> {
        let dest = self.dir.path().join(name);
        run_git(self.dir.path(), &["clone", "--quiet", &self.url(), name])?;
        self.configure_identity(&dest)?;
        Ok(dest)
    }

    /// Give a clone made elsewhere the fixture identity, so plain `git commit`
    /// works without a global git config.
    pub fn configure_identity(&self, checkout: &Path) -> HelperResult<()> {
        run_git(checkout, &["config", "user.email", &self.config.user_email])?;
        run_git(checkout, &["config", "user.name", &self.config.user_name])?;
        run_git(checkout, &["config", "commit.gpgsign", "false"])?;
        Ok(())
    }

    /// Commit a file straight onto the remote trunk, as another contributor would.
    pub fn advance_trunk(&self, filename: &str, content: &str, message: &str) -> HelperResult<String> {
        let scratch = format!("contrib-{}", self.commit_count()?);
        let checkout = self.clone_checkout(&scratch)?;
        run_git(&checkout, &["checkout", "--quiet", &self.config.trunk_branch])?;
        let commit = commit_file(&checkout, filename, content, message)?;
        push_branch(&checkout, &self.config.trunk_branch)?;
        std::fs::remove_dir_all(&checkout)?;
        Ok(commit)
    }

    /// Current trunk tip on the remote.
    pub fn trunk_head(&self) -> HelperResult<String> {
        let rev = format!("refs/heads/{}", self.config.trunk_branch);
        run_git(&self.path, &["rev-parse", &rev])
    }

    /// Tip of an arbitrary branch on the remote, if it exists.
    pub fn branch_head(&self, branch: &str) -> Option<String> {
        let rev = format!("refs/heads/{}", branch);
        run_git(&self.path, &["rev-parse", "--verify", "--quiet", &rev]).ok()
    }

    /// Contents of `path` at the tip of `branch` on the remote.
    pub fn show_file(&self, branch: &str, path: &str) -> HelperResult<String> {
        let spec = format!("refs/heads/{}:{}", branch, path);
        let output = Command::new("git")
            .args(["show", &spec])
            .current_dir(&self.path)
            .output()?;
        if !output.status.success() {
            return Err(format!("git show {} failed", spec).into());
        }
        Ok(String::from_utf8(output.stdout)?)
    }

    fn commit_count(&self) -> HelperResult<usize> {
        let rev = format!("refs/heads/{}", self.config.trunk_branch);
        Ok(run_git(&self.path, &["rev-list", "--count", &rev])?.parse()?)
    }
}

/// Create a bare remote whose trunk holds one commit with the configured files.
pub fn create_remote(config: Option<GitRepoConfig>) -> HelperResult<TestRemote> {
    let config = config.unwrap_or_default();
    let dir = TempDir::new()?;
    let path = dir.path().join("origin.git");
    std::fs::create_dir_all(&path)?;

    run_git(&path, &["init", "--bare", "--quiet"])?;
    let head = format!("refs/heads/{}", config.trunk_branch);
    run_git(&path, &["symbolic-ref", "HEAD", &head])?;

    let seed = dir.path().join("seed");
    std::fs::create_dir_all(&seed)?;
    run_git(&seed, &["init", "--quiet", "-b", &config.trunk_branch])?;
    run_git(&seed, &["config", "user.email", &config.user_email])?;
    run_git(&seed, &["config", "user.name", &config.user_name])?;
    run_git(&seed, &["config", "commit.gpgsign", "false"])?;
    for (file, content) in &config.initial_files {
        write_file(&seed, file, content)?;
    }
    run_git(&seed, &["add", "--all"])?;
    run_git(&seed, &["commit", "--quiet", "-m", "Initial commit"])?;
    run_git(&seed, &["remote", "add", "origin", &path.to_string_lossy()])?;
    push_branch(&seed, &config.trunk_branch)?;
    std::fs::remove_dir_all(&seed)?;

    Ok(TestRemote { dir, path, config })
}

/// Run git in `repo_path` and return trimmed stdout.
pub fn run_git(repo_path: &Path, args: &[&str]) -> HelperResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("git {:?} failed: {}", args, stderr.trim()).into());
    }

    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

/// Write a file relative to the repository root, creating parent directories.
pub fn write_file(repo_path: &Path, filename: &str, content: &str) -> HelperResult<()> {
    let full = repo_path.join(filename);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(full, content)?;
    Ok(())
}

/// Write, stage and commit a single file. Returns the new commit id.
pub fn commit_file(
    repo_path: &Path,
    filename: &str,
    content: &str,
    message: &str,
) -> HelperResult<String> {
    write_file(repo_path, filename, content)?;
    run_git(repo_path, &["add", "--", filename])?;
    run_git(repo_path, &["commit", "--quiet", "-m", message])?;
    run_git(repo_path, &["rev-parse", "HEAD"])
}

/// Push the local `branch` to origin.
pub fn push_branch(repo_path: &Path, branch: &str) -> HelperResult<()> {
    let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
    run_git(repo_path, &["push", "--quiet", "origin", &refspec])?;
    Ok(())
}

/// Get the current git status (porcelain format).
pub fn git_status(repo_path: &Path) -> HelperResult<String> {
    run_git(repo_path, &["status", "--porcelain"])
}
