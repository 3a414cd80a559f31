use std::path::{Path, PathBuf};

/// The repository an execution is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RepoTarget {
    View { codebase_id: String, view_id: String },
    Trunk { codebase_id: String },
}

impl RepoTarget {
    pub fn view(codebase_id: impl Into<String>, view_id: impl Into<String>) -> Self {
        RepoTarget::View {
            codebase_id: codebase_id.into(),
            view_id: view_id.into(),
        }
    }

    pub fn trunk(codebase_id: impl Into<String>) -> Self {
        RepoTarget::Trunk {
            codebase_id: codebase_id.into(),
        }
    }

    pub fn codebase_id(&self) -> &str {
        match self {
            RepoTarget::View { codebase_id, .. } | RepoTarget::Trunk { codebase_id } => codebase_id,
        }
    }
}

/// On-disk placement of trunk and view repositories.
///
/// ```text
/// <base>/<codebase>/trunk    bare trunk repository
/// <base>/<codebase>/<view>   view working copy
/// ```
#[derive(Debug, Clone)]
pub struct RepoLayout {
    base: PathBuf,
}

impl RepoLayout {
    pub fn new<P: AsRef<Path>>(base: P) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn codebase_dir(&self, codebase_id: &str) -> PathBuf {
        self.base.join(codebase_id)
    }

    pub fn trunk_path(&self, codebase_id: &str) -> PathBuf {
        self.codebase_dir(codebase_id).join("trunk")
    }

    pub fn view_path(&self, codebase_id: &str, view_id: &str) -> PathBuf {
        self.codebase_dir(codebase_id).join(view_id)
    }

    pub fn path(&self, target: &RepoTarget) -> PathBuf {
        match target {
            RepoTarget::View {
                codebase_id,
                view_id,
            } => self.view_path(codebase_id, view_id),
            RepoTarget::Trunk { codebase_id } => self.trunk_path(codebase_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = RepoLayout::new("/srv/repos");
        assert_eq!(
            layout.path(&RepoTarget::trunk("c1")),
            PathBuf::from("/srv/repos/c1/trunk")
        );
        assert_eq!(
            layout.path(&RepoTarget::view("c1", "v9")),
            PathBuf::from("/srv/repos/c1/v9")
        );
        assert_eq!(RepoTarget::view("c1", "v9").codebase_id(), "c1");
    }
}
