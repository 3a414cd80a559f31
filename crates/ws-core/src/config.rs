//! Engine configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use ws_repo::{GitIdentity, GitRepo};

use crate::events::DEFAULT_QUEUE_CAPACITY;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_TRUNK_BRANCH: &str = "trunk";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub home: PathBuf,
    pub repos_base_path: PathBuf,
    pub database_path: PathBuf,
    pub trunk_branch: String,
    pub signature_name: String,
    pub signature_email: String,
    pub event_queue_capacity: usize,
}

/// Overrides read from `<home>/config.json`. Every field is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    repos_base_path: Option<PathBuf>,
    database_path: Option<PathBuf>,
    trunk_branch: Option<String>,
    signature_name: Option<String>,
    signature_email: Option<String>,
    event_queue_capacity: Option<usize>,
}

impl EngineConfig {
    /// Defaults rooted at `home`.
    pub fn for_home<P: AsRef<Path>>(home: P) -> Self {
        let home = home.as_ref().to_path_buf();
        Self {
            repos_base_path: home.join("repos"),
            database_path: home.join("state.db"),
            home,
            trunk_branch: DEFAULT_TRUNK_BRANCH.to_string(),
            signature_name: "Workspace Sync".to_string(),
            signature_email: "wsync@localhost".to_string(),
            event_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Resolve the home directory (explicit, then `WSYNC_HOME`, then the
    /// platform default) and apply `config.json` if present.
    pub fn load(home: Option<PathBuf>) -> crate::Result<Self> {
        let home = match home {
            Some(home) => home,
            None => ws_local_db::default_home()?,
        };
        let mut config = Self::for_home(&home);

        let path = home.join(CONFIG_FILE_NAME);
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            let file: ConfigFile = serde_json::from_str(&content)?;
            config.apply(file);
            debug!(path = %path.display(), "loaded engine configuration");
        }

        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, file: ConfigFile) {
        if let Some(path) = file.repos_base_path {
            self.repos_base_path = self.home.join(path);
        }
        if let Some(path) = file.database_path {
            self.database_path = self.home.join(path);
        }
        if let Some(branch) = file.trunk_branch {
            self.trunk_branch = branch;
        }
        if let Some(name) = file.signature_name {
            self.signature_name = name;
        }
        if let Some(email) = file.signature_email {
            self.signature_email = email;
        }
        if let Some(capacity) = file.event_queue_capacity {
            self.event_queue_capacity = capacity;
        }
    }

    fn validate(&self) -> crate::Result<()> {
        if !GitRepo::valid_branch_name(&self.trunk_branch) {
            return Err(crate::Error::Config(format!(
                "invalid trunk branch name: {}",
                self.trunk_branch
            )));
        }
        if self.event_queue_capacity == 0 {
            return Err(crate::Error::Config(
                "event_queue_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn identity(&self) -> GitIdentity {
        GitIdentity::new(&self.signature_name, &self.signature_email)
    }
}
