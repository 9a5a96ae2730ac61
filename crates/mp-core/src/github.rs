//! Forge adapter over the `gh` CLI (plus the one `git push` it needs).

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{MpError, Result};
use crate::exec::Exec;

pub struct GitHub {
    exec: Arc<dyn Exec>,
}

#[derive(Debug, Clone)]
pub struct PrCreateInput {
    pub title: String,
    pub body: String,
    pub base: String,
}

#[derive(Debug, Clone)]
pub struct PrCreated {
    pub number: u64,
    pub url: String,
}

impl GitHub {
    pub fn new(exec: Arc<dyn Exec>) -> Self {
        Self { exec }
    }

    pub fn is_available() -> bool {
        which::which("gh").is_ok()
    }

    fn run(&self, dir: &Path, program: &str, args: &[&str]) -> Result<String> {
        let out = self.exec.run_in(dir, program, args)?;
        if !out.success() {
            return Err(MpError::CommandFailed {
                command: format!("{program} {}", args.join(" ")),
                output: out.output.trim().to_string(),
            });
        }
        Ok(out.output)
    }

    /// Push the current branch to origin with upstream tracking.
    pub fn push_upstream(&self, work_dir: &Path) -> Result<()> {
        self.run(work_dir, "git", &["push", "-u", "origin", "HEAD"])?;
        Ok(())
    }

    /// `gh pr create` prints the new PR's URL; the number is parsed out
    /// of it.
    pub fn create_pr(&self, work_dir: &Path, input: &PrCreateInput) -> Result<PrCreated> {
        let mut args = vec![
            "pr",
            "create",
            "--title",
            input.title.as_str(),
            "--body",
            input.body.as_str(),
        ];
        if !input.base.is_empty() {
            args.push("--base");
            args.push(input.base.as_str());
        }
        let out = self.run(work_dir, "gh", &args)?;
        let url = out.trim().to_string();
        if url.is_empty() {
            return Err(MpError::CommandFailed {
                command: "gh pr create".to_string(),
                output: "empty output".to_string(),
            });
        }
        let number = parse_pr_number(&url)?;
        Ok(PrCreated { number, url })
    }

    pub fn pr_state(&self, work_dir: &Path, number: u64) -> Result<String> {
        #[derive(Deserialize)]
        struct View {
            state: String,
        }
        let n = number.to_string();
        let out = self.run(work_dir, "gh", &["pr", "view", &n, "--json", "state"])?;
        let view: View = serde_json::from_str(out.trim())?;
        Ok(view.state)
    }

    pub fn is_pr_merged(&self, work_dir: &Path, number: u64) -> Result<bool> {
        #[derive(Deserialize)]
        struct View {
            #[serde(rename = "mergedAt")]
            merged_at: Option<String>,
        }
        let n = number.to_string();
        let out = self.run(work_dir, "gh", &["pr", "view", &n, "--json", "mergedAt"])?;
        let view: View = serde_json::from_str(out.trim())?;
        Ok(view.merged_at.map(|t| !t.is_empty()).unwrap_or(false))
    }

    /// The number of a merged PR whose head is `branch`, if any. Covers
    /// squash-merged PRs that left no local metadata behind.
    pub fn merged_pr_for_branch(&self, work_dir: &Path, branch: &str) -> Result<Option<u64>> {
        #[derive(Deserialize)]
        struct Item {
            number: u64,
        }
        let out = self.run(
            work_dir,
            "gh",
            &[
                "pr", "list", "--head", branch, "--state", "merged", "--json", "number",
                "--limit", "1",
            ],
        )?;
        let items: Vec<Item> = serde_json::from_str(out.trim())?;
        Ok(items.first().map(|i| i.number))
    }
}

/// PR URLs look like `https://github.com/owner/repo/pull/123`.
fn parse_pr_number(url: &str) -> Result<u64> {
    url.rsplit('/')
        .next()
        .and_then(|last| last.parse().ok())
        .ok_or_else(|| MpError::InvalidPrUrl(url.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
