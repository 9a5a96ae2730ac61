//! Per-piece metadata records, stored as small JSON files inside the
//! worktree's `.monkeypuzzle/` directory. Both are best-effort caches:
//! their absence never blocks an operation.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fsio::Fs;
use crate::paths;

// ---------------------------------------------------------------------------
// CurrentIssueMarker
// ---------------------------------------------------------------------------

/// Links a piece to the issue it was created from. Written once at piece
/// creation, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentIssueMarker {
    /// Issue path relative to the repo root.
    pub issue_path: String,
    /// Display name extracted from the issue.
    pub issue_name: String,
    /// Sanitized piece name.
    pub piece_name: String,
}

impl CurrentIssueMarker {
    pub fn load(worktree: &Path, fs: &dyn Fs) -> Result<Self> {
        let data = fs.read_to_string(&paths::current_issue_path(worktree))?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, worktree: &Path, fs: &dyn Fs) -> Result<()> {
        fs.create_dir_all(&paths::mp_dir(worktree))?;
        let data = serde_json::to_string_pretty(self)?;
        fs.write(&paths::current_issue_path(worktree), &data)
    }
}

// ---------------------------------------------------------------------------
// PrMetadata
// ---------------------------------------------------------------------------

/// Record of a pull request created for a piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrMetadata {
    pub pr_number: u64,
    pub pr_url: String,
    pub branch: String,
    pub base_branch: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_path: Option<String>,
}

impl PrMetadata {
    pub fn load(worktree: &Path, fs: &dyn Fs) -> Result<Self> {
        let data = fs.read_to_string(&paths::pr_metadata_path(worktree))?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, worktree: &Path, fs: &dyn Fs) -> Result<()> {
        fs.create_dir_all(&paths::mp_dir(worktree))?;
        let data = serde_json::to_string_pretty(self)?;
        fs.write(&paths::pr_metadata_path(worktree), &data)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
