//! Unified diffs decorated for conflict reporting.
//!
//! Each side of a conflict is described as a [`FileDiff`] against the merge
//! base. Hunks carry a stable id derived from their patch text so clients can
//! refer to them across status calls.

use serde::Serialize;
use sha2::{Digest, Sha256};
use similar::TextDiff;

const CONTEXT_LINES: usize = 3;
const DEV_NULL: &str = "/dev/null";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hunk {
    /// Hex SHA-256 of `patch`.
    pub id: String,
    /// File header followed by a single `@@` hunk.
    pub patch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub orig_name: String,
    pub new_name: String,
    pub preferred_name: String,
    pub is_new: bool,
    pub is_deleted: bool,
    pub is_binary: bool,
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }
}

/// Diff `old` against `new` for `path`. `None` means the file is absent on
/// that side.
pub fn decorate(path: &str, old: Option<&[u8]>, new: Option<&[u8]>) -> FileDiff {
    let is_new = old.is_none() && new.is_some();
    let is_deleted = old.is_some() && new.is_none();
    let is_binary = old.map_or(false, looks_binary) || new.map_or(false, looks_binary);

    let orig_name = match old {
        Some(_) => format!("a/{}", path),
        None => DEV_NULL.to_string(),
    };
    let new_name = match new {
        Some(_) => format!("b/{}", path),
        None => DEV_NULL.to_string(),
    };

    let mut header = format!("diff --git a/{0} b/{0}\n", path);
    if is_new {
        header.push_str("new file mode 100644\n");
    } else if is_deleted {
        header.push_str("deleted file mode 100644\n");
    }

    let old_bytes = old.unwrap_or_default();
    let new_bytes = new.unwrap_or_default();
    let unchanged = old.is_some() == new.is_some() && old_bytes == new_bytes;

    let hunks = if unchanged {
        Vec::new()
    } else if is_binary {
        let patch = format!("{}Binary files {} and {} differ\n", header, orig_name, new_name);
        vec![hunk(patch)]
    } else {
        header.push_str(&format!("--- {}\n+++ {}\n", orig_name, new_name));
        text_hunks(&header, old_bytes, new_bytes)
    };

    FileDiff {
        preferred_name: if is_deleted { path_of(&orig_name) } else { path_of(&new_name) },
        orig_name,
        new_name,
        is_new,
        is_deleted,
        is_binary,
        hunks,
    }
}

fn text_hunks(header: &str, old: &[u8], new: &[u8]) -> Vec<Hunk> {
    let old = String::from_utf8_lossy(old);
    let new = String::from_utf8_lossy(new);
    let diff = TextDiff::from_lines(old.as_ref(), new.as_ref());

    let mut unified = diff.unified_diff();
    unified.context_radius(CONTEXT_LINES);
    unified
        .iter_hunks()
        .map(|h| hunk(format!("{}{}", header, h)))
        .collect()
}

fn hunk(patch: String) -> Hunk {
    Hunk {
        id: hex::encode(Sha256::digest(patch.as_bytes())),
        patch,
    }
}

fn looks_binary(content: &[u8]) -> bool {
    content.iter().take(8000).any(|b| *b == 0)
}

fn path_of(name: &str) -> String {
    name.strip_prefix("a/")
        .or_else(|| name.strip_prefix("b/"))
        .unwrap_or(name)
        .to_string()
}
