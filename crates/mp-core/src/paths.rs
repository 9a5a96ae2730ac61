use crate::error::{MpError, Result};
use std::path::{Component, Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const MP_DIR: &str = ".monkeypuzzle";
pub const CONFIG_FILE: &str = "monkeypuzzle.json";
pub const HOOKS_DIR: &str = ".monkeypuzzle/hooks";

pub const CURRENT_ISSUE_FILE: &str = "current-issue.json";
pub const PR_METADATA_FILE: &str = "pr-metadata.json";
pub const SOURCE_SYMLINK: &str = ".monkeypuzzle-source";

pub const SESSION_PREFIX: &str = "mp-piece-";
pub const PIECES_DIR_ENV: &str = "MP_PIECES_DIR";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn mp_dir(root: &Path) -> PathBuf {
    root.join(MP_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(MP_DIR).join(CONFIG_FILE)
}

pub fn hooks_dir(root: &Path) -> PathBuf {
    root.join(HOOKS_DIR)
}

pub fn current_issue_path(worktree: &Path) -> PathBuf {
    worktree.join(MP_DIR).join(CURRENT_ISSUE_FILE)
}

pub fn pr_metadata_path(worktree: &Path) -> PathBuf {
    worktree.join(MP_DIR).join(PR_METADATA_FILE)
}

pub fn session_name(piece: &str) -> String {
    format!("{SESSION_PREFIX}{piece}")
}

/// Where piece worktrees live. `MP_PIECES_DIR` wins, then
/// `XDG_DATA_HOME/monkeypuzzle/pieces`, then
/// `~/.local/share/monkeypuzzle/pieces`.
pub fn pieces_root() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(PIECES_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let data_home = match std::env::var_os("XDG_DATA_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => home::home_dir()
            .ok_or(MpError::HomeNotFound)?
            .join(".local")
            .join("share"),
    };
    Ok(data_home.join("monkeypuzzle").join("pieces"))
}

/// Lexically normalize a path: resolve `.` and `..` without touching the
/// filesystem. `..` that would climb past the root is kept, which makes
/// containment checks fail safe.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal =
                    matches!(out.components().next_back(), Some(Component::Normal(_)));
                if last_is_normal {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
