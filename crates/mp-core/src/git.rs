//! Version-control adapter.
//!
//! A thin wrapper over the execution port; each method maps to one git
//! subcommand and treats the output as an opaque string to parse
//! minimally. Failures carry the combined subprocess output.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{MpError, Result};
use crate::exec::Exec;

pub struct Git {
    exec: Arc<dyn Exec>,
}

impl Git {
    pub fn new(exec: Arc<dyn Exec>) -> Self {
        Self { exec }
    }

    fn git(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let out = self.exec.run_in(dir, "git", args)?;
        if !out.success() {
            return Err(MpError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                output: out.output.trim().to_string(),
            });
        }
        Ok(out.output)
    }

    // -----------------------------------------------------------------------
    // Worktrees
    // -----------------------------------------------------------------------

    pub fn worktree_add(&self, repo_root: &Path, worktree_path: &Path) -> Result<()> {
        let path = worktree_path.to_string_lossy();
        self.git(repo_root, &["worktree", "add", path.as_ref()])?;
        Ok(())
    }

    pub fn worktree_remove(&self, repo_root: &Path, worktree_path: &Path) -> Result<()> {
        let path = worktree_path.to_string_lossy();
        self.git(repo_root, &["worktree", "remove", path.as_ref()])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Absolute path of the git directory for `work_dir`.
    pub fn git_dir(&self, work_dir: &Path) -> Result<PathBuf> {
        let out = self.git(work_dir, &["rev-parse", "--git-dir"])?;
        let raw = PathBuf::from(out.trim());
        if raw.is_absolute() {
            Ok(raw)
        } else {
            Ok(work_dir.join(raw))
        }
    }

    /// A worktree's git dir lives under `<main>/.git/worktrees/<name>`.
    pub fn is_worktree_git_dir(git_dir: &Path) -> bool {
        git_dir
            .components()
            .any(|c| matches!(c, Component::Normal(s) if s == "worktrees"))
    }

    pub fn repo_root(&self, work_dir: &Path) -> Result<PathBuf> {
        let out = self.git(work_dir, &["rev-parse", "--show-toplevel"])?;
        Ok(PathBuf::from(out.trim()))
    }

    /// Root of the main repository, resolved from inside a worktree by
    /// walking up from `<main>/.git/worktrees/<name>`.
    pub fn main_repo_root(&self, work_dir: &Path) -> Result<PathBuf> {
        let git_dir = self.git_dir(work_dir)?;
        if Self::is_worktree_git_dir(&git_dir) {
            git_dir
                .ancestors()
                .nth(3)
                .map(Path::to_path_buf)
                .ok_or_else(|| MpError::CommandFailed {
                    command: "git rev-parse --git-dir".to_string(),
                    output: format!("unexpected worktree git dir: {}", git_dir.display()),
                })
        } else {
            self.repo_root(work_dir)
        }
    }

    pub fn current_branch(&self, work_dir: &Path) -> Result<String> {
        let out = self.git(work_dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    pub fn rev_parse(&self, dir: &Path, refname: &str) -> Result<String> {
        let out = self.git(dir, &["rev-parse", refname])?;
        Ok(out.trim().to_string())
    }

    // -----------------------------------------------------------------------
    // Merging
    // -----------------------------------------------------------------------

    pub fn merge(&self, work_dir: &Path, branch: &str) -> Result<()> {
        self.git(work_dir, &["merge", branch])?;
        Ok(())
    }

    pub fn merge_squash(&self, work_dir: &Path, branch: &str) -> Result<()> {
        self.git(work_dir, &["merge", "--squash", branch])?;
        Ok(())
    }

    pub fn checkout(&self, work_dir: &Path, branch: &str) -> Result<()> {
        self.git(work_dir, &["checkout", branch])?;
        Ok(())
    }

    pub fn commit(&self, work_dir: &Path, message: &str) -> Result<()> {
        self.git(work_dir, &["commit", "-m", message])?;
        Ok(())
    }

    /// Whether `main` has commits that are not reachable from `branch`:
    /// counts commits between the merge-base and `main`'s tip.
    pub fn is_ahead(&self, dir: &Path, main: &str, branch: &str) -> Result<bool> {
        let base = self.git(dir, &["merge-base", main, branch])?;
        let range = format!("{}..{main}", base.trim());
        let count = self.git(dir, &["rev-list", "--count", &range])?;
        Ok(count.trim() != "0")
    }

    /// One-line subjects of the commits on `branch` that are not on `main`.
    pub fn commit_subjects(&self, dir: &Path, main: &str, branch: &str) -> Result<Vec<String>> {
        let range = format!("{main}..{branch}");
        let out = self.git(dir, &["log", "--format=%s", &range])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    // -----------------------------------------------------------------------
    // Merge detection
    // -----------------------------------------------------------------------

    /// Whether `branch` appears in `git branch --merged <main>`.
    pub fn branch_merged_into(&self, dir: &Path, main: &str, branch: &str) -> Result<bool> {
        let out = self.git(dir, &["branch", "--merged", main])?;
        Ok(out
            .lines()
            .map(|l| l.trim().trim_start_matches("* ").trim_start_matches("+ "))
            .any(|l| l == branch))
    }

    pub fn branch_exists_on_remote(&self, dir: &Path, branch: &str) -> Result<bool> {
        let out = self.git(dir, &["ls-remote", "--heads", "origin", branch])?;
        Ok(!out.trim().is_empty())
    }

    /// Whether `commit` is an ancestor of `branch`'s tip. Exit code 1 is
    /// a negative answer, anything else non-zero is a real failure.
    pub fn is_ancestor(&self, dir: &Path, commit: &str, branch: &str) -> Result<bool> {
        let args = ["merge-base", "--is-ancestor", commit, branch];
        let out = self.exec.run_in(dir, "git", &args)?;
        match out.code {
            0 => Ok(true),
            1 => Ok(false),
            _ => Err(MpError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                output: out.output.trim().to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
