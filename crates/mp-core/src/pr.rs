//! Pull-request creation for the current piece: push the branch, create
//! the PR via the forge adapter, and persist best-effort metadata for
//! later merge detection.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::deps::Deps;
use crate::error::{MpError, Result};
use crate::git::Git;
use crate::github::{GitHub, PrCreateInput};
use crate::metadata::{CurrentIssueMarker, PrMetadata};
use crate::piece::PieceEngine;
use crate::report::{Message, Report};

pub const DEFAULT_BASE_BRANCH: &str = "main";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub base: String,
}

impl PrInput {
    pub fn with_defaults(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.body = self.body.trim().to_string();
        self.base = self.base.trim().to_string();
        if self.base.is_empty() {
            self.base = DEFAULT_BASE_BRANCH.to_string();
        }
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PrCreateResult {
    pub pr_number: u64,
    pub pr_url: String,
    pub branch: String,
}

pub struct PrHandler {
    deps: Deps,
    engine: PieceEngine,
    git: Git,
    github: GitHub,
}

impl PrHandler {
    pub fn new(deps: Deps, engine: PieceEngine) -> Self {
        Self {
            git: Git::new(deps.exec.clone()),
            github: GitHub::new(deps.exec.clone()),
            engine,
            deps,
        }
    }

    /// Create a PR for the current piece. The title defaults to the
    /// linked issue's name, then to the piece name.
    pub fn create_pr(&self, work_dir: &Path, input: PrInput) -> Result<PrCreateResult> {
        let mut input = input.with_defaults();

        let status = self.engine.status(work_dir)?;
        if !status.in_piece {
            return Err(MpError::NotInPiece);
        }
        let worktree = status
            .worktree_path
            .clone()
            .unwrap_or_else(|| work_dir.to_path_buf());

        let branch = self.git.current_branch(work_dir)?;

        let marker = CurrentIssueMarker::load(&worktree, self.deps.fs.as_ref()).ok();
        if input.title.is_empty() {
            if let Some(m) = &marker {
                input.title = m.issue_name.clone();
            }
        }
        if input.title.is_empty() {
            input.title = status.piece_name.clone().unwrap_or_else(|| branch.clone());
        }

        self.deps.report.emit(Message::info(format!(
            "Pushing branch {branch} to origin..."
        )));
        self.github.push_upstream(work_dir)?;

        self.deps.report.emit(Message::info("Creating PR..."));
        let created = self.github.create_pr(
            work_dir,
            &PrCreateInput {
                title: input.title,
                body: input.body,
                base: input.base.clone(),
            },
        )?;

        let metadata = PrMetadata {
            pr_number: created.number,
            pr_url: created.url.clone(),
            branch: branch.clone(),
            base_branch: input.base,
            created_at: Utc::now(),
            issue_path: marker.map(|m| m.issue_path),
        };
        if let Err(e) = metadata.save(&worktree, self.deps.fs.as_ref()) {
            self.deps
                .report
                .emit(Message::warning(format!("Failed to write PR metadata: {e}")));
        }

        let result = PrCreateResult {
            pr_number: created.number,
            pr_url: created.url,
            branch,
        };
        self.deps.report.emit(
            Message::success(format!(
                "Created PR #{}: {}",
                result.pr_number, result.pr_url
            ))
            .with_data(serde_json::to_value(&result)?),
        );
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
