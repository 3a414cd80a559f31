use regex::Regex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::error::{VcsError, VcsResult};

/// Author and committer recorded on commits created through a [`GitRepo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

impl GitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// How a `git rebase` invocation came to rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseStart {
    /// Every commit was replayed; no rebase metadata is left behind.
    Completed,
    /// The rebase stopped on conflicts and its metadata is on disk.
    Conflicted,
}

/// One stage of an unmerged index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub mode: String,
    pub oid: String,
}

/// An unmerged path with its three index stages.
///
/// While rebasing, `ours` (stage 2) is the commit being rebased onto and
/// `theirs` (stage 3) is the commit being replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub path: String,
    pub ancestor: Option<IndexEntry>,
    pub ours: Option<IndexEntry>,
    pub theirs: Option<IndexEntry>,
}

/// Which side of an unmerged path to check out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSide {
    Ours,
    Theirs,
}

#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
    identity: Option<GitIdentity>,
}

impl GitRepo {
    /// Open an existing repository (working copy or bare) rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> VcsResult<Self> {
        let root = path.as_ref();
        let is_work_tree = root.join(".git").exists();
        let is_bare = root.join("HEAD").is_file() && root.join("objects").is_dir();

        if !is_work_tree && !is_bare {
            return Err(VcsError::RepositoryNotFound(root.display().to_string()));
        }

        Ok(Self::at(root))
    }

    /// Refer to `path` without checking that a repository exists there yet.
    pub fn at<P: AsRef<Path>>(path: P) -> Self {
        Self {
            root: path.as_ref().to_path_buf(),
            identity: None,
        }
    }

    /// Use `identity` for every commit created through this handle.
    pub fn with_identity(mut self, identity: GitIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Get the repository root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn identity(&self) -> Option<&GitIdentity> {
        self.identity.as_ref()
    }

    /// Validate a branch name
    pub fn valid_branch_name(name: &str) -> bool {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._/-]*$")
            .map(|re| re.is_match(name) && !name.contains(".."))
            .unwrap_or(false)
    }

    /// Clone `source` into `dest`, creating parent directories as needed.
    pub fn clone_from(source: &str, dest: &Path) -> VcsResult<Self> {
        let parent = dest
            .parent()
            .ok_or_else(|| VcsError::Other(format!("no parent for {}", dest.display())))?;
        std::fs::create_dir_all(parent)?;

        let dest_str = dest.to_string_lossy();
        Self::at(parent).run_command(&git(&["clone", "--quiet", source, &dest_str]))?;
        Self::open(dest)
    }

    /// Clone `source` as a bare repository into `dest`.
    pub fn clone_bare(source: &str, dest: &Path) -> VcsResult<Self> {
        let parent = dest
            .parent()
            .ok_or_else(|| VcsError::Other(format!("no parent for {}", dest.display())))?;
        std::fs::create_dir_all(parent)?;

        let dest_str = dest.to_string_lossy();
        Self::at(parent).run_command(&git(&["clone", "--bare", "--quiet", source, &dest_str]))?;
        Self::open(dest)
    }

    /// Initialise an empty bare repository whose HEAD points at `branch`.
    pub fn init_bare_with_branch(path: &Path, branch: &str) -> VcsResult<Self> {
        std::fs::create_dir_all(path)?;
        let repo = Self::at(path);
        repo.run_command(&git(&["init", "--bare", "--quiet"]))?;
        repo.set_head_branch(branch)?;
        Ok(repo)
    }

    /// Point a (bare) repository's symbolic HEAD at `branch`.
    pub fn set_head_branch(&self, branch: &str) -> VcsResult<()> {
        check_branch(branch)?;
        let target = format!("refs/heads/{}", branch);
        self.run_command(&git(&["symbolic-ref", "HEAD", &target]))?;
        Ok(())
    }

    /// Fetch `branch` from origin into `refs/remotes/origin/<branch>`.
    pub fn fetch_branch(&self, branch: &str) -> VcsResult<()> {
        check_branch(branch)?;
        let refspec = format!("+refs/heads/{0}:refs/remotes/origin/{0}", branch);
        self.run_command(&git(&["fetch", "--quiet", "origin", &refspec]))?;
        Ok(())
    }

    /// Resolve a revision to a full commit id.
    pub fn rev_parse(&self, rev: &str) -> VcsResult<String> {
        let spec = format!("{}^{{commit}}", rev);
        let output = self.run_command(&git(&["rev-parse", "--verify", "--quiet", &spec]))?;
        Ok(output.trim().to_string())
    }

    pub fn head_commit(&self) -> VcsResult<String> {
        self.rev_parse("HEAD")
    }

    /// Name of the branch HEAD points to. Fails when HEAD is detached.
    pub fn head_branch(&self) -> VcsResult<String> {
        let output = self.run_command(&git(&["symbolic-ref", "--quiet", "--short", "HEAD"]))?;
        let branch = output.trim().to_string();

        if branch.is_empty() {
            return Err(VcsError::Other(
                "Could not determine current branch".to_string(),
            ));
        }

        Ok(branch)
    }

    /// Check if a local branch exists
    pub fn branch_exists(&self, branch: &str) -> VcsResult<bool> {
        let reference = format!("refs/heads/{}", branch);
        match self.run_command(&git(&["show-ref", "--verify", "--quiet", &reference])) {
            Ok(_) => Ok(true),
            Err(VcsError::CommandFailed { exit_code: 1, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create `branch` at the current HEAD and switch to it, keeping the working tree.
    pub fn checkout_new_branch(&self, branch: &str) -> VcsResult<()> {
        check_branch(branch)?;
        self.run_command(&git(&["checkout", "--quiet", "-B", branch]))?;
        Ok(())
    }

    /// Point `branch` at `start_point` (or HEAD) and force it into the working tree.
    pub fn checkout_branch_force(&self, branch: &str, start_point: Option<&str>) -> VcsResult<()> {
        check_branch(branch)?;
        let mut args = vec!["checkout", "--quiet", "-f", "-B", branch];
        if let Some(start) = start_point {
            args.push(start);
        }
        self.run_command(&git(&args))?;
        Ok(())
    }

    /// Remove untracked files and directories (ignored files are kept).
    pub fn clean_untracked(&self) -> VcsResult<()> {
        self.run_command(&git(&["clean", "-fdq"]))?;
        Ok(())
    }

    /// Stage every change in the working tree, including deletions and new files.
    pub fn add_all(&self) -> VcsResult<()> {
        self.run_command(&git(&["add", "--all"]))?;
        Ok(())
    }

    /// Whether the index differs from HEAD.
    pub fn has_staged_changes(&self) -> VcsResult<bool> {
        match self.run_command(&git(&["diff", "--cached", "--quiet", "HEAD"])) {
            Ok(_) => Ok(false),
            Err(VcsError::CommandFailed { exit_code: 1, .. }) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Commit the index without running hooks and return the new commit id.
    pub fn commit(&self, message: &str) -> VcsResult<String> {
        self.run_command(&git(&[
            "commit",
            "--quiet",
            "--no-verify",
            "--allow-empty-message",
            "-m",
            message,
        ]))?;
        self.head_commit()
    }

    pub fn commit_parents(&self, rev: &str) -> VcsResult<Vec<String>> {
        let cmd = git(&["rev-list", "--parents", "-n", "1", rev]);
        let output = self.run_command(&cmd)?;
        let mut ids = output.split_whitespace().map(str::to_string);

        match ids.next() {
            Some(_) => Ok(ids.collect()),
            None => Err(VcsError::UnexpectedOutput {
                command: cmd.join(" "),
                output,
            }),
        }
    }

    pub fn reset_mixed(&self, rev: &str) -> VcsResult<()> {
        self.run_command(&git(&["reset", "--quiet", "--mixed", rev]))?;
        Ok(())
    }

    pub fn reset_hard(&self, rev: &str) -> VcsResult<()> {
        self.run_command(&git(&["reset", "--quiet", "--hard", rev]))?;
        Ok(())
    }

    /// Force push HEAD to `branch` on origin
    pub fn force_push(&self, branch: &str) -> VcsResult<()> {
        check_branch(branch)?;
        let refspec = format!("HEAD:refs/heads/{}", branch);
        self.run_command(&git(&["push", "--quiet", "--force", "origin", &refspec]))?;
        Ok(())
    }

    /// Push the local `branch` to origin under the same name.
    pub fn push_branch(&self, branch: &str) -> VcsResult<()> {
        check_branch(branch)?;
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
        self.run_command(&git(&["push", "--quiet", "origin", &refspec]))?;
        Ok(())
    }

    /// Create (or move) `branch` to point at `commit`. Works in bare repositories.
    pub fn create_branch_at(&self, branch: &str, commit: &str) -> VcsResult<()> {
        check_branch(branch)?;
        self.run_command(&git(&["branch", "--force", branch, commit]))?;
        Ok(())
    }

    pub fn delete_branch(&self, branch: &str) -> VcsResult<()> {
        check_branch(branch)?;
        self.run_command(&git(&["branch", "--quiet", "-D", branch]))?;
        Ok(())
    }

    /// Replay the commits in `upstream..HEAD` on top of `onto`.
    ///
    /// Commits that end up empty, or whose change is already present in
    /// `onto`, are dropped.
    pub fn rebase_onto(&self, onto: &str, upstream: &str) -> VcsResult<RebaseStart> {
        let cmd = git(&["rebase", "--quiet", "--empty=drop", "--onto", onto, upstream]);
        self.run_rebase_step(&cmd)
    }

    /// Continue an in-progress rebase after conflicts have been staged.
    pub fn rebase_continue(&self) -> VcsResult<RebaseStart> {
        self.run_rebase_step(&git(&["rebase", "--continue"]))
    }

    /// Drop the commit the rebase stopped on and continue.
    pub fn rebase_skip(&self) -> VcsResult<RebaseStart> {
        self.run_rebase_step(&git(&["rebase", "--skip"]))
    }

    fn run_rebase_step(&self, cmd: &[String]) -> VcsResult<RebaseStart> {
        match self.run_command(cmd) {
            Ok(_) => Ok(RebaseStart::Completed),
            Err(err @ VcsError::CommandFailed { .. }) => {
                if self.is_rebasing()? {
                    Ok(RebaseStart::Conflicted)
                } else {
                    Err(err)
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Absolute path of the git directory.
    pub fn git_dir(&self) -> VcsResult<PathBuf> {
        let output = self.run_command(&git(&["rev-parse", "--absolute-git-dir"]))?;
        Ok(PathBuf::from(output.trim()))
    }

    /// Whether rebase metadata is present on disk. Read from disk on every call.
    pub fn is_rebasing(&self) -> VcsResult<bool> {
        let git_dir = self.git_dir()?;
        Ok(git_dir.join("rebase-merge").is_dir() || git_dir.join("rebase-apply").is_dir())
    }

    /// The commit the in-progress rebase is replaying onto.
    pub fn rebase_onto_commit(&self) -> VcsResult<String> {
        self.read_rebase_state("onto")
    }

    /// The branch tip recorded when the in-progress rebase started.
    pub fn rebase_orig_head(&self) -> VcsResult<String> {
        self.read_rebase_state("orig-head")
    }

    fn read_rebase_state(&self, name: &str) -> VcsResult<String> {
        let git_dir = self.git_dir()?;
        for dir in ["rebase-merge", "rebase-apply"] {
            let file = git_dir.join(dir).join(name);
            if file.is_file() {
                return Ok(std::fs::read_to_string(file)?.trim().to_string());
            }
        }
        Err(VcsError::NoRebaseInProgress(self.root.display().to_string()))
    }

    /// Unmerged paths in the index, sorted by path.
    pub fn conflicts(&self) -> VcsResult<Vec<Conflict>> {
        let output = self.run_command(&git(&["ls-files", "--unmerged", "-z"]))?;
        parse_unmerged(&output)
    }

    /// Write one side of an unmerged path to the working tree.
    pub fn checkout_conflict_side(&self, path: &str, side: ConflictSide) -> VcsResult<()> {
        let flag = match side {
            ConflictSide::Ours => "--ours",
            ConflictSide::Theirs => "--theirs",
        };
        self.run_command(&git(&["checkout", flag, "--", path]))?;
        Ok(())
    }

    /// Stage the working-tree contents of `path`.
    pub fn stage_path(&self, path: &str) -> VcsResult<()> {
        self.run_command(&git(&["add", "--", path]))?;
        Ok(())
    }

    /// Remove `path` from both the index and the working tree.
    pub fn remove_path(&self, path: &str) -> VcsResult<()> {
        self.run_command(&git(&["rm", "--quiet", "-f", "--ignore-unmatch", "--", path]))?;
        Ok(())
    }

    /// Raw contents of a blob.
    pub fn read_blob(&self, oid: &str) -> VcsResult<Vec<u8>> {
        let output = self.run_command_raw(&git(&["cat-file", "blob", oid]), &[])?;
        Ok(output.stdout)
    }

    /// Number of commits reachable from `to` but not from `from`.
    pub fn commit_count(&self, from: &str, to: &str) -> VcsResult<usize> {
        let range = format!("{}..{}", from, to);
        let cmd = git(&["rev-list", "--count", &range]);
        let output = self.run_command(&cmd)?;
        output
            .trim()
            .parse()
            .map_err(|_| VcsError::UnexpectedOutput {
                command: cmd.join(" "),
                output,
            })
    }

    /// Whether the working tree declares any git-lfs managed paths.
    pub fn uses_large_files(&self) -> bool {
        std::fs::read_to_string(self.root.join(".gitattributes"))
            .map(|attrs| attrs.contains("filter=lfs"))
            .unwrap_or(false)
    }

    /// Materialise externally stored (git-lfs) file contents.
    pub fn large_files_pull(&self) -> VcsResult<()> {
        if !self.uses_large_files() {
            return Ok(());
        }
        self.run_command(&git(&["lfs", "pull"]))?;
        Ok(())
    }

    /// Write a tree object of the complete working directory (tracked and
    /// untracked, minus ignored files) without touching the real index.
    pub fn write_tree_from_worktree(&self) -> VcsResult<String> {
        let scratch = tempfile::tempdir()?;
        let index = scratch.path().join("index");
        let env = [("GIT_INDEX_FILE", index.as_os_str())];

        self.run_command_raw(&git(&["read-tree", "HEAD"]), &env)?;
        self.run_command_raw(&git(&["add", "--all"]), &env)?;
        let output = self.run_command_raw(&git(&["write-tree"]), &env)?;

        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }

    /// Write the empty tree object and return its id.
    pub fn write_empty_tree(&self) -> VcsResult<String> {
        let output = self.run_command(&git(&["mktree"]))?;
        Ok(output.trim().to_string())
    }

    /// Create a commit object for `tree` without moving any ref.
    pub fn commit_tree(&self, tree: &str, parent: Option<&str>, message: &str) -> VcsResult<String> {
        let mut args = vec!["commit-tree", tree, "-m", message];
        if let Some(parent) = parent {
            args.push("-p");
            args.push(parent);
        }
        let output = self.run_command(&git(&args))?;
        Ok(output.trim().to_string())
    }

    pub fn update_ref(&self, reference: &str, commit: &str) -> VcsResult<()> {
        self.run_command(&git(&["update-ref", reference, commit]))?;
        Ok(())
    }

    /// Porcelain status of the working tree.
    pub fn working_copy_status(&self) -> VcsResult<String> {
        let output = self.run_command(&git(&["status", "--porcelain"]))?;
        Ok(output.trim().to_string())
    }

    // Private helper methods

    fn run_command(&self, cmd: &[String]) -> VcsResult<String> {
        let output = self.run_command_raw(cmd, &[])?;
        String::from_utf8(output.stdout).map_err(VcsError::Utf8)
    }

    fn run_command_raw(&self, cmd: &[String], extra_env: &[(&str, &OsStr)]) -> VcsResult<Output> {
        tracing::debug!(repo = %self.root.display(), command = %cmd.join(" "), "running git");

        let mut command = Command::new(&cmd[0]);
        command
            .args(&cmd[1..])
            .current_dir(&self.root)
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_ASKPASS", "echo")
            .env("SSH_ASKPASS", "echo")
            .env("GIT_EDITOR", "true")
            .env("GIT_CONFIG_COUNT", "1")
            .env("GIT_CONFIG_KEY_0", "commit.gpgsign")
            .env("GIT_CONFIG_VALUE_0", "false")
            .stdin(Stdio::null());

        if let Some(identity) = &self.identity {
            command
                .env("GIT_AUTHOR_NAME", &identity.name)
                .env("GIT_AUTHOR_EMAIL", &identity.email)
                .env("GIT_COMMITTER_NAME", &identity.name)
                .env("GIT_COMMITTER_EMAIL", &identity.email);
        }

        for (key, value) in extra_env {
            command.env(key, value);
        }

        let output = command.output().map_err(|e| VcsError::CommandFailed {
            command: cmd.join(" "),
            exit_code: -1,
            stderr: e.to_string(),
        })?;

        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(VcsError::CommandFailed {
                command: cmd.join(" "),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

fn git(args: &[&str]) -> Vec<String> {
    std::iter::once("git")
        .chain(args.iter().copied())
        .map(str::to_string)
        .collect()
}

fn check_branch(branch: &str) -> VcsResult<()> {
    if GitRepo::valid_branch_name(branch) {
        Ok(())
    } else {
        Err(VcsError::InvalidBranchName(branch.to_string()))
    }
}

/// Parse `git ls-files --unmerged -z` output into per-path conflicts.
///
/// Each record is `<mode> <oid> <stage>\t<path>` terminated by NUL; records for
/// one path are adjacent.
pub(crate) fn parse_unmerged(output: &str) -> VcsResult<Vec<Conflict>> {
    let mut conflicts: Vec<Conflict> = Vec::new();

    for record in output.split('\0').filter(|r| !r.is_empty()) {
        let malformed = || VcsError::UnexpectedOutput {
            command: "git ls-files --unmerged -z".to_string(),
            output: record.to_string(),
        };

        let (meta, path) = record.split_once('\t').ok_or_else(malformed)?;
        let mut fields = meta.split(' ');
        let (mode, oid, stage) = match (fields.next(), fields.next(), fields.next()) {
            (Some(mode), Some(oid), Some(stage)) => (mode, oid, stage),
            _ => return Err(malformed()),
        };
        let entry = IndexEntry {
            mode: mode.to_string(),
            oid: oid.to_string(),
        };

        let needs_new = conflicts.last().map(|c| c.path != path).unwrap_or(true);
        if needs_new {
            conflicts.push(Conflict {
                path: path.to_string(),
                ancestor: None,
                ours: None,
                theirs: None,
            });
        }
        let Some(conflict) = conflicts.last_mut() else {
            return Err(malformed());
        };

        match stage {
            "1" => conflict.ancestor = Some(entry),
            "2" => conflict.ours = Some(entry),
            "3" => conflict.theirs = Some(entry),
            _ => return Err(malformed()),
        }
    }

    Ok(conflicts)
}
