//! Piece lifecycle engine.
//!
//! A piece is an isolated unit of work: one git worktree under the
//! pieces root, one branch named after the piece, one (best-effort) tmux
//! session. The engine drives the full lifecycle — create, status,
//! update, merge, cleanup — delegating all external effects to the
//! injected ports and running user hooks around each mutating step.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::Config;
use crate::deps::Deps;
use crate::error::{MpError, Result};
use crate::fsio::Fs;
use crate::git::Git;
use crate::github::GitHub;
use crate::hooks::{Hook, HookContext, HookRunner};
use crate::issue::{self, Status};
use crate::metadata::{CurrentIssueMarker, PrMetadata};
use crate::paths;
use crate::report::{Message, Report};
use crate::tmux::Tmux;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PieceInfo {
    pub name: String,
    pub worktree_path: PathBuf,
    pub session_name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PieceStatus {
    pub in_piece: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub piece_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeMethod {
    Pr,
    PrBranch,
    Git,
    Commit,
}

impl MergeMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeMethod::Pr => "pr",
            MergeMethod::PrBranch => "pr-branch",
            MergeMethod::Git => "git",
            MergeMethod::Commit => "commit",
        }
    }
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived merge state of a piece branch. Recomputed on every cleanup
/// run, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct MergeStatus {
    pub merged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<MergeMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    pub exists_on_remote: bool,
}

#[derive(Debug, Clone)]
pub struct CleanupOptions {
    /// Report candidates without mutating anything.
    pub dry_run: bool,
    /// Reserved: skip confirmation prompts.
    pub force: bool,
    pub main_branch: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupResult {
    pub piece_name: String,
    pub worktree_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_path: Option<String>,
    pub issue_updated: bool,
}

/// Outcome of one detection strategy. An error degrades to
/// `Inconclusive` so detection falls through instead of aborting.
enum Detection {
    Matched(MergeMethod, Option<u64>),
    NotMatched,
    Inconclusive(String),
}

/// Compensating action recorded during provisioning, replayed in reverse
/// when the creation hook fails.
enum Compensation {
    KillSession(String),
    RemoveWorktree(PathBuf),
}

// ---------------------------------------------------------------------------
// PieceEngine
// ---------------------------------------------------------------------------

pub struct PieceEngine {
    deps: Deps,
    git: Git,
    tmux: Tmux,
    github: GitHub,
    hooks: HookRunner,
    pieces_root: PathBuf,
}

impl PieceEngine {
    pub fn new(deps: Deps) -> Result<Self> {
        let pieces_root = paths::pieces_root()?;
        Ok(Self::with_pieces_root(deps, pieces_root))
    }

    /// Engine with an explicit pieces root, bypassing environment lookup.
    pub fn with_pieces_root(deps: Deps, pieces_root: PathBuf) -> Self {
        Self {
            git: Git::new(deps.exec.clone()),
            tmux: Tmux::new(deps.exec.clone()),
            github: GitHub::new(deps.exec.clone()),
            hooks: HookRunner::new(deps.clone()),
            deps,
            pieces_root,
        }
    }

    pub fn pieces_root(&self) -> &Path {
        &self.pieces_root
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Provision a new piece: worktree, source symlink, tmux session,
    /// creation hook. Symlink and session failures are warnings; a hook
    /// failure rolls the provisioning back.
    pub fn create_piece(
        &self,
        work_dir: &Path,
        source_dir: &Path,
        name: Option<&str>,
    ) -> Result<PieceInfo> {
        let repo_root = self
            .git
            .repo_root(work_dir)
            .map_err(|_| MpError::NotGitRepository)?;

        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => {
                if self.deps.fs.exists(&self.pieces_root.join(n)) {
                    return Err(MpError::PieceExists(n.to_string()));
                }
                n.to_string()
            }
            None => self.generate_piece_name()?,
        };

        self.deps.fs.create_dir_all(&self.pieces_root)?;
        let worktree_path = self.pieces_root.join(&name);
        self.git.worktree_add(&repo_root, &worktree_path)?;

        let mut undo = vec![Compensation::RemoveWorktree(worktree_path.clone())];

        let symlink = worktree_path.join(paths::SOURCE_SYMLINK);
        if let Err(e) = self.deps.fs.symlink(source_dir, &symlink) {
            self.warn(format!("Failed to create symlink: {e}"));
        }

        let session_name = paths::session_name(&name);
        match self.tmux.new_session(&session_name, &worktree_path) {
            Ok(()) => undo.push(Compensation::KillSession(session_name.clone())),
            Err(e) => self.warn(format!("Failed to create tmux session: {e}")),
        }

        let ctx = HookContext {
            piece_name: name.clone(),
            worktree_path: worktree_path.to_string_lossy().into_owned(),
            repo_root: repo_root.to_string_lossy().into_owned(),
            session_name: session_name.clone(),
            ..Default::default()
        };
        if let Err(e) = self.hooks.run(&repo_root, Hook::OnPieceCreate, &ctx) {
            self.compensate(&repo_root, undo);
            return Err(e);
        }

        let info = PieceInfo {
            name: name.clone(),
            worktree_path: worktree_path.clone(),
            session_name,
        };
        self.deps.report.emit(
            Message::success(format!(
                "Created piece: {name} at {}",
                worktree_path.display()
            ))
            .with_data(serde_json::to_value(&info)?),
        );
        Ok(info)
    }

    /// Replay compensations in reverse provisioning order. Failures here
    /// are warnings; the original error is what the caller sees.
    fn compensate(&self, repo_root: &Path, undo: Vec<Compensation>) {
        for action in undo.into_iter().rev() {
            match action {
                Compensation::KillSession(name) => {
                    if let Err(e) = self.tmux.kill_session(&name) {
                        self.warn(format!("Failed to cleanup tmux session: {e}"));
                    }
                }
                Compensation::RemoveWorktree(path) => {
                    self.remove_own_state_files(&path);
                    if let Err(e) = self.git.worktree_remove(repo_root, &path) {
                        self.warn(format!("Failed to cleanup worktree: {e}"));
                    }
                }
            }
        }
    }

    /// Create a piece from a markdown issue: the sanitized issue title
    /// becomes the piece name, a marker links the worktree back to the
    /// issue, and a `todo` issue advances to `in-progress`.
    pub fn create_piece_from_issue(
        &self,
        work_dir: &Path,
        source_dir: &Path,
        issue_path: &str,
    ) -> Result<PieceInfo> {
        let repo_root = self
            .git
            .repo_root(work_dir)
            .map_err(|_| MpError::NotGitRepository)?;

        let cfg = Config::load(&repo_root, self.deps.fs.as_ref())?;
        let issues_dir = cfg.issues_dir()?.to_string();

        let abs_issue = issue::resolve_issue_path(&repo_root, issue_path, self.deps.fs.as_ref())?;

        // Containment check: the resolved path must stay inside the
        // configured issues directory.
        let abs_issues_dir = paths::clean_path(&repo_root.join(&issues_dir));
        if abs_issue.strip_prefix(&abs_issues_dir).is_err() {
            return Err(MpError::IssueOutsideIssuesDir {
                dir: issues_dir,
                path: issue_path.to_string(),
            });
        }

        let issue_name = issue::extract_issue_name(&abs_issue, self.deps.fs.as_ref())?;
        let piece_name = issue::sanitize_piece_name(&issue_name);

        let info = self.create_piece(work_dir, source_dir, Some(&piece_name))?;

        let rel_issue = abs_issue
            .strip_prefix(&repo_root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| issue_path.to_string());
        let marker = CurrentIssueMarker {
            issue_path: rel_issue,
            issue_name,
            piece_name,
        };
        if let Err(e) = marker.save(&info.worktree_path, self.deps.fs.as_ref()) {
            self.warn(format!("Failed to write current issue marker: {e}"));
        }

        self.advance_issue_to_in_progress(&abs_issue);
        Ok(info)
    }

    fn advance_issue_to_in_progress(&self, issue_path: &Path) {
        let current = match issue::parse_status(issue_path, self.deps.fs.as_ref()) {
            Ok(s) => s,
            Err(e) => {
                self.warn(format!("Failed to read issue status: {e}"));
                return;
            }
        };
        if current != Status::Todo {
            return;
        }
        if let Err(e) = issue::update_status(issue_path, self.deps.fs.as_ref(), Status::InProgress)
        {
            self.warn(format!("Failed to update issue status: {e}"));
        }
    }

    /// `piece-<YYYYMMDD-HHMMSS>` with a numeric suffix on collision.
    pub fn generate_piece_name(&self) -> Result<String> {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        self.unique_piece_name(&format!("piece-{timestamp}"))
    }

    fn unique_piece_name(&self, base: &str) -> Result<String> {
        if !self.deps.fs.exists(&self.pieces_root.join(base)) {
            return Ok(base.to_string());
        }
        for n in 1..=1000 {
            let candidate = format!("{base}-{n}");
            if !self.deps.fs.exists(&self.pieces_root.join(&candidate)) {
                return Ok(candidate);
            }
        }
        Err(MpError::NameSpaceExhausted)
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Pure query: are we inside a piece worktree? Not being in a git
    /// repository at all is a valid, non-error answer.
    pub fn status(&self, work_dir: &Path) -> Result<PieceStatus> {
        let git_dir = match self.git.git_dir(work_dir) {
            Ok(d) => d,
            Err(_) => return Ok(PieceStatus::default()),
        };

        if !Git::is_worktree_git_dir(&git_dir) {
            return Ok(PieceStatus {
                in_piece: false,
                repo_root: self.git.repo_root(work_dir).ok(),
                ..Default::default()
            });
        }

        let worktree_path = self
            .git
            .repo_root(work_dir)
            .unwrap_or_else(|_| work_dir.to_path_buf());
        let piece_name = worktree_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Ok(PieceStatus {
            in_piece: true,
            piece_name,
            worktree_path: Some(worktree_path),
            repo_root: self.git.main_repo_root(work_dir).ok(),
        })
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Merge the main branch into the piece. The before-hook is a gate;
    /// the after-hook is a notification whose failure does not undo the
    /// merge.
    pub fn update_piece(&self, work_dir: &Path, main_branch: &str) -> Result<()> {
        let status = self.status(work_dir)?;
        if !status.in_piece {
            return Err(MpError::NotInPiece);
        }
        let current_branch = self.git.current_branch(work_dir)?;
        let repo_root = status
            .repo_root
            .clone()
            .unwrap_or_else(|| work_dir.to_path_buf());

        let ctx = HookContext {
            piece_name: status.piece_name.clone().unwrap_or_default(),
            worktree_path: status
                .worktree_path
                .as_deref()
                .unwrap_or(work_dir)
                .to_string_lossy()
                .into_owned(),
            repo_root: repo_root.to_string_lossy().into_owned(),
            main_branch: main_branch.to_string(),
            ..Default::default()
        };

        self.hooks.run(&repo_root, Hook::BeforePieceUpdate, &ctx)?;
        self.git.merge(work_dir, main_branch)?;
        self.hooks.run(&repo_root, Hook::AfterPieceUpdate, &ctx)?;

        self.deps.report.emit(Message::success(format!(
            "Merged {main_branch} into {current_branch}"
        )));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    /// Squash-merge the piece branch into the main branch as a single
    /// commit. Refuses to proceed while main has commits the piece has
    /// not seen — a squash would silently discard them.
    pub fn merge_piece(&self, work_dir: &Path, main_branch: &str) -> Result<()> {
        let status = self.status(work_dir)?;
        if !status.in_piece {
            return Err(MpError::NotInPiece);
        }
        let piece_branch = self.git.current_branch(work_dir)?;
        let main_root = self.git.main_repo_root(work_dir)?;
        let piece_name = status.piece_name.clone().unwrap_or_else(|| piece_branch.clone());

        let ctx = HookContext {
            piece_name: piece_name.clone(),
            worktree_path: status
                .worktree_path
                .as_deref()
                .unwrap_or(work_dir)
                .to_string_lossy()
                .into_owned(),
            repo_root: main_root.to_string_lossy().into_owned(),
            main_branch: main_branch.to_string(),
            ..Default::default()
        };

        self.hooks.run(&main_root, Hook::BeforePieceMerge, &ctx)?;

        if self.git.is_ahead(&main_root, main_branch, &piece_branch)? {
            return Err(MpError::MainAhead {
                main: main_branch.to_string(),
            });
        }

        let subjects = self
            .git
            .commit_subjects(&main_root, main_branch, &piece_branch)?;

        self.git.checkout(&main_root, main_branch)?;
        self.git.merge_squash(&main_root, &piece_branch)?;
        self.git
            .commit(&main_root, &build_squash_message(&piece_name, &subjects))?;

        self.hooks.run(&main_root, Hook::AfterPieceMerge, &ctx)?;

        self.deps.report.emit(Message::success(format!(
            "Squash merged {piece_branch} into {main_branch}"
        )));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Merge detection
    // -----------------------------------------------------------------------

    /// Multi-strategy merge detection. Strategies are tried in order and
    /// the first positive wins; a strategy that errors degrades to a
    /// warning and detection falls through to the next one.
    pub fn is_branch_merged(
        &self,
        worktree_path: &Path,
        branch: &str,
        main_branch: &str,
    ) -> MergeStatus {
        let exists_on_remote = match self.git.branch_exists_on_remote(worktree_path, branch) {
            Ok(v) => v,
            Err(e) => {
                self.warn(format!("Failed to check remote branch: {e}"));
                false
            }
        };

        let strategies: [(&str, Box<dyn Fn() -> Detection + '_>); 4] = [
            ("pr", Box::new(|| self.detect_via_pr_metadata(worktree_path))),
            (
                "pr-branch",
                Box::new(|| self.detect_via_pr_branch(worktree_path, branch)),
            ),
            (
                "git",
                Box::new(|| self.detect_via_merged_branches(worktree_path, main_branch, branch)),
            ),
            (
                "commit",
                Box::new(|| self.detect_via_commit_ancestry(worktree_path, branch, main_branch)),
            ),
        ];

        for (label, strategy) in strategies {
            match strategy() {
                Detection::Matched(method, pr_number) => {
                    return MergeStatus {
                        merged: true,
                        method: Some(method),
                        pr_number,
                        exists_on_remote,
                    }
                }
                Detection::NotMatched => {}
                Detection::Inconclusive(reason) => {
                    self.warn(format!("{label} merge check failed: {reason}"));
                }
            }
        }

        MergeStatus {
            merged: false,
            method: None,
            pr_number: None,
            exists_on_remote,
        }
    }

    fn detect_via_pr_metadata(&self, worktree: &Path) -> Detection {
        if !self
            .deps
            .fs
            .exists(&paths::pr_metadata_path(worktree))
        {
            return Detection::NotMatched;
        }
        let meta = match PrMetadata::load(worktree, self.deps.fs.as_ref()) {
            Ok(m) => m,
            Err(e) => return Detection::Inconclusive(e.to_string()),
        };
        if meta.pr_number == 0 {
            return Detection::NotMatched;
        }
        match self.github.is_pr_merged(worktree, meta.pr_number) {
            Ok(true) => Detection::Matched(MergeMethod::Pr, Some(meta.pr_number)),
            Ok(false) => Detection::NotMatched,
            Err(e) => Detection::Inconclusive(e.to_string()),
        }
    }

    fn detect_via_pr_branch(&self, worktree: &Path, branch: &str) -> Detection {
        match self.github.merged_pr_for_branch(worktree, branch) {
            Ok(Some(number)) => Detection::Matched(MergeMethod::PrBranch, Some(number)),
            Ok(None) => Detection::NotMatched,
            Err(e) => Detection::Inconclusive(e.to_string()),
        }
    }

    fn detect_via_merged_branches(&self, dir: &Path, main: &str, branch: &str) -> Detection {
        match self.git.branch_merged_into(dir, main, branch) {
            Ok(true) => Detection::Matched(MergeMethod::Git, None),
            Ok(false) => Detection::NotMatched,
            Err(e) => Detection::Inconclusive(e.to_string()),
        }
    }

    /// Last resort: does main's history contain the branch tip? Catches
    /// merges that bypassed the forge and merge tracking entirely.
    fn detect_via_commit_ancestry(&self, dir: &Path, branch: &str, main: &str) -> Detection {
        let tip = match self.git.rev_parse(dir, branch) {
            Ok(t) => t,
            Err(e) => return Detection::Inconclusive(e.to_string()),
        };
        match self.git.is_ancestor(dir, &tip, main) {
            Ok(true) => Detection::Matched(MergeMethod::Commit, None),
            Ok(false) => Detection::NotMatched,
            Err(e) => Detection::Inconclusive(e.to_string()),
        }
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    /// Remove every piece whose branch is already merged. Per-piece
    /// failures are warnings; the loop keeps going.
    pub fn cleanup_merged_pieces(
        &self,
        repo_root: &Path,
        opts: &CleanupOptions,
    ) -> Result<Vec<CleanupResult>> {
        if !self.deps.fs.is_dir(&self.pieces_root) {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for entry in self.deps.fs.read_dir(&self.pieces_root)? {
            if !self.deps.fs.is_dir(&entry) {
                continue;
            }
            let piece_name = entry
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let branch = match self.git.current_branch(&entry) {
                Ok(b) => b,
                Err(e) => {
                    self.warn(format!("Skipping {piece_name}: failed to get branch: {e}"));
                    continue;
                }
            };

            let merge_status = self.is_branch_merged(&entry, &branch, &opts.main_branch);
            if !merge_status.merged {
                continue;
            }

            let issue_path = CurrentIssueMarker::load(&entry, self.deps.fs.as_ref())
                .ok()
                .map(|m| m.issue_path);
            let mut result = CleanupResult {
                piece_name: piece_name.clone(),
                worktree_path: entry.clone(),
                issue_path: issue_path.clone(),
                issue_updated: false,
            };

            if opts.dry_run {
                let method = merge_status
                    .method
                    .map(MergeMethod::as_str)
                    .unwrap_or("unknown");
                self.deps.report.emit(Message::info(format!(
                    "[dry-run] Would cleanup: {piece_name} (merged via {method})"
                )));
                results.push(result);
                continue;
            }

            // The session may not exist; kill failures are irrelevant.
            let _ = self.tmux.kill_session(&paths::session_name(&piece_name));

            self.remove_own_state_files(&entry);
            if let Err(e) = self.git.worktree_remove(repo_root, &entry) {
                self.warn(format!("Failed to cleanup {piece_name}: {e}"));
                continue;
            }

            if let Some(rel) = &issue_path {
                match self.advance_issue_to_done(&repo_root.join(rel)) {
                    Ok(updated) => result.issue_updated = updated,
                    Err(e) => self.warn(format!("Failed to update issue status: {e}")),
                }
            }

            self.deps
                .report
                .emit(Message::success(format!("Cleaned up: {piece_name}")));
            results.push(result);
        }
        Ok(results)
    }

    /// `in-progress → done`; anything else (including already `done`) is
    /// left untouched.
    fn advance_issue_to_done(&self, issue_path: &Path) -> Result<bool> {
        let current = issue::parse_status(issue_path, self.deps.fs.as_ref())?;
        if current != Status::InProgress {
            return Ok(false);
        }
        issue::update_status(issue_path, self.deps.fs.as_ref(), Status::Done)?;
        Ok(true)
    }

    /// Delete the engine's own untracked files from a worktree (source
    /// symlink, issue marker, PR metadata) so a clean worktree stays
    /// removable — `git worktree remove` refuses untracked content.
    fn remove_own_state_files(&self, worktree: &Path) {
        let _ = self.deps.fs.remove_file(&worktree.join(paths::SOURCE_SYMLINK));
        let _ = self.deps.fs.remove_file(&paths::current_issue_path(worktree));
        let _ = self.deps.fs.remove_file(&paths::pr_metadata_path(worktree));
    }

    fn warn(&self, text: String) {
        self.deps.report.emit(Message::warning(text));
    }
}

fn build_squash_message(piece_name: &str, subjects: &[String]) -> String {
    let mut msg = format!("feat: {piece_name}\n");
    if !subjects.is_empty() {
        msg.push_str("\nSquashed commits:\n");
        for subject in subjects {
            msg.push_str(&format!("- {subject}\n"));
        }
    }
    msg
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ScriptedExec;
    use crate::fsio::{Fs, MemFs};
    use crate::report::{BufferReport, Level};
    use std::sync::Arc;

    const REPO: &str = "/repo";
    const PIECES: &str = "/data/pieces";

    struct Fixture {
        engine: PieceEngine,
        fs: Arc<MemFs>,
        exec: Arc<ScriptedExec>,
        report: Arc<BufferReport>,
    }

    fn fixture() -> Fixture {
        let fs = Arc::new(MemFs::new());
        let exec = Arc::new(ScriptedExec::new());
        let report = Arc::new(BufferReport::new());
        let deps = Deps::new(fs.clone(), exec.clone(), report.clone());
        let engine = PieceEngine::with_pieces_root(deps, PathBuf::from(PIECES));
        Fixture {
            engine,
            fs,
            exec,
            report,
        }
    }

    fn script_main_repo(f: &Fixture) {
        f.exec
            .respond("git", &["rev-parse", "--show-toplevel"], 0, "/repo\n");
        f.exec.respond("git", &["rev-parse", "--git-dir"], 0, "/repo/.git\n");
    }

    fn script_worktree(f: &Fixture, name: &str) {
        f.exec.respond(
            "git",
            &["rev-parse", "--git-dir"],
            0,
            &format!("/repo/.git/worktrees/{name}\n"),
        );
        f.exec.respond(
            "git",
            &["rev-parse", "--show-toplevel"],
            0,
            &format!("{PIECES}/{name}\n"),
        );
        f.exec
            .respond("git", &["rev-parse", "--abbrev-ref", "HEAD"], 0, &format!("{name}\n"));
    }

    // -----------------------------------------------------------------------
    // create_piece
    // -----------------------------------------------------------------------

    #[test]
    fn create_piece_provisions_worktree_symlink_and_session() {
        let f = fixture();
        script_main_repo(&f);
        let wt = format!("{PIECES}/add-login");
        f.exec.respond("git", &["worktree", "add", &wt], 0, "");
        f.exec.respond(
            "tmux",
            &["new-session", "-d", "-s", "mp-piece-add-login", "-c", &wt],
            0,
            "",
        );

        let info = f
            .engine
            .create_piece(Path::new(REPO), Path::new("/src/mp"), Some("add-login"))
            .unwrap();

        assert_eq!(info.name, "add-login");
        assert_eq!(info.worktree_path, PathBuf::from(&wt));
        assert_eq!(info.session_name, "mp-piece-add-login");
        assert_eq!(
            f.fs.link_target(&PathBuf::from(&wt).join(".monkeypuzzle-source")),
            Some(PathBuf::from("/src/mp"))
        );
        assert!(f.report.contains(Level::Success, "Created piece: add-login"));
    }

    #[test]
    fn create_piece_session_failure_is_nonfatal() {
        let f = fixture();
        script_main_repo(&f);
        let wt = format!("{PIECES}/solo");
        f.exec.respond("git", &["worktree", "add", &wt], 0, "");
        // no tmux response: session creation fails

        let info = f
            .engine
            .create_piece(Path::new(REPO), Path::new("/src/mp"), Some("solo"))
            .unwrap();
        assert_eq!(info.name, "solo");
        assert!(f.report.contains(Level::Warning, "tmux session"));
    }

    #[test]
    fn create_piece_rejects_existing_name() {
        let f = fixture();
        script_main_repo(&f);
        f.fs.create_dir_all(Path::new("/data/pieces/taken")).unwrap();

        let err = f
            .engine
            .create_piece(Path::new(REPO), Path::new("/src/mp"), Some("taken"))
            .unwrap_err();
        assert!(matches!(err, MpError::PieceExists(n) if n == "taken"));
    }

    #[test]
    fn create_piece_outside_git_repository_fails() {
        let f = fixture();
        let err = f
            .engine
            .create_piece(Path::new("/elsewhere"), Path::new("/src/mp"), Some("x"))
            .unwrap_err();
        assert!(matches!(err, MpError::NotGitRepository));
    }

    #[test]
    fn failed_create_hook_rolls_back_session_and_worktree() {
        let f = fixture();
        script_main_repo(&f);
        let wt = format!("{PIECES}/gated");
        let hook = "/repo/.monkeypuzzle/hooks/on-piece-create.sh";
        f.fs.add_executable(hook, "exit 1");
        f.exec.respond("git", &["worktree", "add", &wt], 0, "");
        f.exec.respond(
            "tmux",
            &["new-session", "-d", "-s", "mp-piece-gated", "-c", &wt],
            0,
            "",
        );
        f.exec.respond("bash", &[hook], 1, "setup failed\n");
        f.exec
            .respond("tmux", &["kill-session", "-t", "mp-piece-gated"], 0, "");
        f.exec.respond("git", &["worktree", "remove", &wt], 0, "");

        let err = f
            .engine
            .create_piece(Path::new(REPO), Path::new("/src/mp"), Some("gated"))
            .unwrap_err();

        assert!(matches!(err, MpError::HookFailed { .. }));
        assert!(f
            .exec
            .was_called("tmux", &["kill-session", "-t", "mp-piece-gated"]));
        assert!(f.exec.was_called("git", &["worktree", "remove", &wt]));
    }

    #[test]
    fn rollback_skips_session_kill_when_none_was_created() {
        let f = fixture();
        script_main_repo(&f);
        let wt = format!("{PIECES}/nosession");
        let hook = "/repo/.monkeypuzzle/hooks/on-piece-create.sh";
        f.fs.add_executable(hook, "exit 1");
        f.exec.respond("git", &["worktree", "add", &wt], 0, "");
        // tmux unscripted: session creation fails, so nothing to kill
        f.exec.respond("bash", &[hook], 1, "nope\n");
        f.exec.respond("git", &["worktree", "remove", &wt], 0, "");

        f.engine
            .create_piece(Path::new(REPO), Path::new("/src/mp"), Some("nosession"))
            .unwrap_err();

        assert!(f.exec.was_called("git", &["worktree", "remove", &wt]));
        assert!(!f
            .exec
            .was_called("tmux", &["kill-session", "-t", "mp-piece-nosession"]));
    }

    #[test]
    fn unique_piece_name_appends_counter() {
        let f = fixture();
        f.fs.create_dir_all(Path::new("/data/pieces/piece-x")).unwrap();
        f.fs.create_dir_all(Path::new("/data/pieces/piece-x-1")).unwrap();
        assert_eq!(f.engine.unique_piece_name("piece-x").unwrap(), "piece-x-2");
        assert_eq!(f.engine.unique_piece_name("fresh").unwrap(), "fresh");
    }

    // -----------------------------------------------------------------------
    // create_piece_from_issue
    // -----------------------------------------------------------------------

    fn script_issue_setup(f: &Fixture) {
        script_main_repo(f);
        f.fs.add_file(
            "/repo/.monkeypuzzle/monkeypuzzle.json",
            r#"{"version":"1","project":{"name":"demo"},"issues":{"provider":"markdown","config":{"directory":"issues"}},"pr":{"provider":"github","config":{}}}"#,
        );
        f.fs.add_file(
            "/repo/issues/add-login.md",
            "---\ntitle: Add login\nstatus: todo\n---\n\n# Add login\n",
        );
        let wt = format!("{PIECES}/add-login");
        f.exec.respond("git", &["worktree", "add", &wt], 0, "");
        f.exec.respond(
            "tmux",
            &["new-session", "-d", "-s", "mp-piece-add-login", "-c", &wt],
            0,
            "",
        );
    }

    #[test]
    fn create_from_issue_names_piece_and_advances_status() {
        let f = fixture();
        script_issue_setup(&f);

        let info = f
            .engine
            .create_piece_from_issue(Path::new(REPO), Path::new("/src/mp"), "issues/add-login.md")
            .unwrap();

        assert_eq!(info.name, "add-login");

        let marker =
            CurrentIssueMarker::load(&info.worktree_path, f.fs.as_ref()).unwrap();
        assert_eq!(marker.issue_name, "Add login");
        assert_eq!(marker.issue_path, "issues/add-login.md");
        assert_eq!(marker.piece_name, "add-login");

        assert_eq!(
            issue::parse_status(Path::new("/repo/issues/add-login.md"), f.fs.as_ref()).unwrap(),
            Status::InProgress
        );
    }

    #[test]
    fn create_from_issue_leaves_non_todo_status_alone() {
        let f = fixture();
        script_issue_setup(&f);
        f.fs.add_file(
            "/repo/issues/add-login.md",
            "---\ntitle: Add login\nstatus: done\n---\n",
        );

        f.engine
            .create_piece_from_issue(Path::new(REPO), Path::new("/src/mp"), "issues/add-login.md")
            .unwrap();

        assert_eq!(
            issue::parse_status(Path::new("/repo/issues/add-login.md"), f.fs.as_ref()).unwrap(),
            Status::Done
        );
    }

    #[test]
    fn create_from_issue_rejects_paths_outside_issues_dir() {
        let f = fixture();
        script_issue_setup(&f);
        f.fs.add_file("/repo/README.md", "# readme");
        f.fs.add_file("/etc/passwd", "root:x");

        for escape in ["README.md", "issues/../README.md", "/etc/passwd"] {
            let err = f
                .engine
                .create_piece_from_issue(Path::new(REPO), Path::new("/src/mp"), escape)
                .unwrap_err();
            assert!(
                matches!(err, MpError::IssueOutsideIssuesDir { .. }),
                "path should be rejected: {escape}"
            );
        }
    }

    #[test]
    fn create_from_issue_requires_markdown_provider() {
        let f = fixture();
        script_main_repo(&f);
        f.fs.add_file(
            "/repo/.monkeypuzzle/monkeypuzzle.json",
            r#"{"version":"1","project":{"name":"demo"},"issues":{"provider":"jira","config":{}},"pr":{"provider":"github","config":{}}}"#,
        );

        let err = f
            .engine
            .create_piece_from_issue(Path::new(REPO), Path::new("/src/mp"), "issues/x.md")
            .unwrap_err();
        assert!(matches!(err, MpError::WrongIssueProvider(p) if p == "jira"));
    }

    // -----------------------------------------------------------------------
    // status
    // -----------------------------------------------------------------------

    #[test]
    fn status_outside_git_is_not_an_error() {
        let f = fixture();
        let status = f.engine.status(Path::new("/nowhere")).unwrap();
        assert!(!status.in_piece);
        assert!(status.repo_root.is_none());
    }

    #[test]
    fn status_in_main_repository() {
        let f = fixture();
        script_main_repo(&f);
        let status = f.engine.status(Path::new(REPO)).unwrap();
        assert!(!status.in_piece);
        assert_eq!(status.repo_root, Some(PathBuf::from("/repo")));
    }

    #[test]
    fn status_in_worktree_resolves_piece_and_main_root() {
        let f = fixture();
        script_worktree(&f, "add-login");
        let status = f.engine.status(Path::new("/data/pieces/add-login")).unwrap();
        assert!(status.in_piece);
        assert_eq!(status.piece_name.as_deref(), Some("add-login"));
        assert_eq!(
            status.worktree_path,
            Some(PathBuf::from("/data/pieces/add-login"))
        );
        assert_eq!(status.repo_root, Some(PathBuf::from("/repo")));
    }

    // -----------------------------------------------------------------------
    // update_piece
    // -----------------------------------------------------------------------

    #[test]
    fn update_outside_piece_fails() {
        let f = fixture();
        script_main_repo(&f);
        let err = f.engine.update_piece(Path::new(REPO), "main").unwrap_err();
        assert!(matches!(err, MpError::NotInPiece));
    }

    #[test]
    fn update_merges_main_into_piece() {
        let f = fixture();
        script_worktree(&f, "add-login");
        f.exec.respond("git", &["merge", "main"], 0, "");

        f.engine
            .update_piece(Path::new("/data/pieces/add-login"), "main")
            .unwrap();

        assert!(f.exec.was_called("git", &["merge", "main"]));
        assert!(f.report.contains(Level::Success, "Merged main into add-login"));
    }

    #[test]
    fn failing_before_update_hook_prevents_merge() {
        let f = fixture();
        script_worktree(&f, "add-login");
        let hook = "/repo/.monkeypuzzle/hooks/before-piece-update.sh";
        f.fs.add_executable(hook, "exit 1");
        f.exec.respond("bash", &[hook], 1, "not now\n");

        let err = f
            .engine
            .update_piece(Path::new("/data/pieces/add-login"), "main")
            .unwrap_err();
        assert!(matches!(err, MpError::HookFailed { .. }));
        assert!(!f.exec.was_called("git", &["merge", "main"]));
    }

    // -----------------------------------------------------------------------
    // merge_piece
    // -----------------------------------------------------------------------

    fn script_merge_base(f: &Fixture, ahead_count: &str) {
        f.exec
            .respond("git", &["merge-base", "main", "add-login"], 0, "base\n");
        f.exec.respond(
            "git",
            &["rev-list", "--count", "base..main"],
            0,
            &format!("{ahead_count}\n"),
        );
    }

    #[test]
    fn merge_refuses_while_main_is_ahead() {
        let f = fixture();
        script_worktree(&f, "add-login");
        script_merge_base(&f, "2");

        let err = f
            .engine
            .merge_piece(Path::new("/data/pieces/add-login"), "main")
            .unwrap_err();

        assert!(matches!(err, MpError::MainAhead { .. }));
        assert!(err.to_string().contains("mp piece update"));
        assert!(!f.exec.was_called("git", &["checkout", "main"]));
        assert!(!f.exec.was_called("git", &["merge", "--squash", "add-login"]));
    }

    #[test]
    fn merge_squashes_with_synthesized_message() {
        let f = fixture();
        script_worktree(&f, "add-login");
        script_merge_base(&f, "0");
        f.exec.respond(
            "git",
            &["log", "--format=%s", "main..add-login"],
            0,
            "add form\nfix typo\n",
        );
        f.exec.respond("git", &["checkout", "main"], 0, "");
        f.exec
            .respond("git", &["merge", "--squash", "add-login"], 0, "");
        let expected_msg = "feat: add-login\n\nSquashed commits:\n- add form\n- fix typo\n";
        f.exec.respond("git", &["commit", "-m", expected_msg], 0, "");

        f.engine
            .merge_piece(Path::new("/data/pieces/add-login"), "main")
            .unwrap();

        assert!(f.exec.was_called("git", &["commit", "-m", expected_msg]));
        assert!(f
            .report
            .contains(Level::Success, "Squash merged add-login into main"));
    }

    #[test]
    fn squash_message_omits_empty_commit_list() {
        assert_eq!(build_squash_message("p", &[]), "feat: p\n");
        assert_eq!(
            build_squash_message("p", &["one".to_string()]),
            "feat: p\n\nSquashed commits:\n- one\n"
        );
    }

    // -----------------------------------------------------------------------
    // is_branch_merged
    // -----------------------------------------------------------------------

    const WT: &str = "/data/pieces/add-login";

    fn pr_metadata_json() -> String {
        r#"{"pr_number":7,"pr_url":"https://github.com/acme/app/pull/7","branch":"add-login","base_branch":"main","created_at":"2024-06-01T12:00:00Z"}"#
            .to_string()
    }

    #[test]
    fn merge_detected_via_pr_metadata() {
        let f = fixture();
        f.fs.add_file(
            format!("{WT}/.monkeypuzzle/pr-metadata.json"),
            &pr_metadata_json(),
        );
        f.exec.respond(
            "gh",
            &["pr", "view", "7", "--json", "mergedAt"],
            0,
            r#"{"mergedAt":"2024-06-02T08:00:00Z"}"#,
        );

        let status = f.engine.is_branch_merged(Path::new(WT), "add-login", "main");
        assert!(status.merged);
        assert_eq!(status.method, Some(MergeMethod::Pr));
        assert_eq!(status.pr_number, Some(7));
    }

    #[test]
    fn merge_detected_via_pr_branch_lookup() {
        let f = fixture();
        f.exec.respond(
            "gh",
            &[
                "pr", "list", "--head", "add-login", "--state", "merged", "--json", "number",
                "--limit", "1",
            ],
            0,
            r#"[{"number":9}]"#,
        );

        let status = f.engine.is_branch_merged(Path::new(WT), "add-login", "main");
        assert!(status.merged);
        assert_eq!(status.method, Some(MergeMethod::PrBranch));
        assert_eq!(status.pr_number, Some(9));
    }

    #[test]
    fn merge_detected_via_merged_branches() {
        let f = fixture();
        f.exec.respond(
            "git",
            &["branch", "--merged", "main"],
            0,
            "  add-login\n* main\n",
        );

        let status = f.engine.is_branch_merged(Path::new(WT), "add-login", "main");
        assert!(status.merged);
        assert_eq!(status.method, Some(MergeMethod::Git));
        // gh strategies errored and fell through with warnings
        assert!(f.report.has_level(Level::Warning));
    }

    #[test]
    fn merge_detected_via_commit_ancestry() {
        let f = fixture();
        f.exec
            .respond("git", &["branch", "--merged", "main"], 0, "* main\n");
        f.exec.respond("git", &["rev-parse", "add-login"], 0, "abc123\n");
        f.exec.respond(
            "git",
            &["merge-base", "--is-ancestor", "abc123", "main"],
            0,
            "",
        );

        let status = f.engine.is_branch_merged(Path::new(WT), "add-login", "main");
        assert!(status.merged);
        assert_eq!(status.method, Some(MergeMethod::Commit));
    }

    #[test]
    fn unmerged_branch_survives_every_strategy() {
        let f = fixture();
        f.exec
            .respond("git", &["branch", "--merged", "main"], 0, "* main\n");
        f.exec.respond("git", &["rev-parse", "add-login"], 0, "abc123\n");
        f.exec.respond(
            "git",
            &["merge-base", "--is-ancestor", "abc123", "main"],
            1,
            "",
        );
        f.exec.respond(
            "git",
            &["ls-remote", "--heads", "origin", "add-login"],
            0,
            "abc123\trefs/heads/add-login\n",
        );

        let status = f.engine.is_branch_merged(Path::new(WT), "add-login", "main");
        assert!(!status.merged);
        assert!(status.method.is_none());
        assert!(status.exists_on_remote);
    }

    // -----------------------------------------------------------------------
    // cleanup_merged_pieces
    // -----------------------------------------------------------------------

    fn cleanup_opts(dry_run: bool) -> CleanupOptions {
        CleanupOptions {
            dry_run,
            force: false,
            main_branch: "main".to_string(),
        }
    }

    fn script_merged_piece(f: &Fixture, name: &str) {
        f.fs.create_dir_all(&PathBuf::from(PIECES).join(name)).unwrap();
        f.exec.respond(
            "git",
            &["rev-parse", "--abbrev-ref", "HEAD"],
            0,
            &format!("{name}\n"),
        );
        f.exec.respond(
            "git",
            &["branch", "--merged", "main"],
            0,
            &format!("  {name}\n* main\n"),
        );
    }

    #[test]
    fn cleanup_dry_run_reports_without_mutating() {
        let f = fixture();
        script_merged_piece(&f, "add-login");

        let results = f
            .engine
            .cleanup_merged_pieces(Path::new(REPO), &cleanup_opts(true))
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].piece_name, "add-login");
        assert!(f.fs.is_dir(Path::new("/data/pieces/add-login")));
        assert!(!f
            .exec
            .was_called("git", &["worktree", "remove", "/data/pieces/add-login"]));
        assert!(f.report.contains(Level::Info, "[dry-run] Would cleanup: add-login"));
    }

    #[test]
    fn cleanup_removes_piece_and_advances_issue() {
        let f = fixture();
        script_merged_piece(&f, "add-login");
        f.fs.add_file(
            "/data/pieces/add-login/.monkeypuzzle/current-issue.json",
            r#"{"issue_path":"issues/add-login.md","issue_name":"Add login","piece_name":"add-login"}"#,
        );
        f.fs.add_file(
            "/repo/issues/add-login.md",
            "---\ntitle: Add login\nstatus: in-progress\n---\n",
        );
        f.exec.respond(
            "git",
            &["worktree", "remove", "/data/pieces/add-login"],
            0,
            "",
        );

        let results = f
            .engine
            .cleanup_merged_pieces(Path::new(REPO), &cleanup_opts(false))
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].issue_updated);
        assert_eq!(
            issue::parse_status(Path::new("/repo/issues/add-login.md"), f.fs.as_ref()).unwrap(),
            Status::Done
        );
        // Kill attempt happens even though no session was scripted.
        assert!(f
            .exec
            .was_called("tmux", &["kill-session", "-t", "mp-piece-add-login"]));
    }

    #[test]
    fn cleanup_is_idempotent_for_done_issues() {
        let f = fixture();
        script_merged_piece(&f, "add-login");
        f.fs.add_file(
            "/data/pieces/add-login/.monkeypuzzle/current-issue.json",
            r#"{"issue_path":"issues/add-login.md","issue_name":"Add login","piece_name":"add-login"}"#,
        );
        f.fs.add_file(
            "/repo/issues/add-login.md",
            "---\ntitle: Add login\nstatus: done\n---\n",
        );
        f.exec.respond(
            "git",
            &["worktree", "remove", "/data/pieces/add-login"],
            0,
            "",
        );

        let results = f
            .engine
            .cleanup_merged_pieces(Path::new(REPO), &cleanup_opts(false))
            .unwrap();
        assert!(!results[0].issue_updated);
        assert_eq!(
            issue::parse_status(Path::new("/repo/issues/add-login.md"), f.fs.as_ref()).unwrap(),
            Status::Done
        );
    }

    #[test]
    fn cleanup_continues_past_worktree_removal_failure() {
        let f = fixture();
        script_merged_piece(&f, "broken");
        script_merged_piece(&f, "healthy");
        // Both pieces report the same branch per the scripted responses;
        // make the merged set cover both.
        f.exec.respond(
            "git",
            &["branch", "--merged", "main"],
            0,
            "  broken\n  healthy\n* main\n",
        );
        f.exec.respond(
            "git",
            &["rev-parse", "--abbrev-ref", "HEAD"],
            0,
            "broken\n",
        );
        f.exec.respond(
            "git",
            &["worktree", "remove", "/data/pieces/broken"],
            1,
            "error: locked",
        );
        f.exec.respond(
            "git",
            &["worktree", "remove", "/data/pieces/healthy"],
            0,
            "",
        );

        let results = f
            .engine
            .cleanup_merged_pieces(Path::new(REPO), &cleanup_opts(false))
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].piece_name, "healthy");
        assert!(f.report.contains(Level::Warning, "Failed to cleanup broken"));
    }

    #[test]
    fn cleanup_skips_pieces_with_unreadable_branch() {
        let f = fixture();
        f.fs.create_dir_all(Path::new("/data/pieces/stale")).unwrap();
        // current_branch unscripted: errors

        let results = f
            .engine
            .cleanup_merged_pieces(Path::new(REPO), &cleanup_opts(false))
            .unwrap();
        assert!(results.is_empty());
        assert!(f.report.contains(Level::Warning, "Skipping stale"));
    }

    #[test]
    fn cleanup_with_no_pieces_root_is_empty() {
        let f = fixture();
        let results = f
            .engine
            .cleanup_merged_pieces(Path::new(REPO), &cleanup_opts(false))
            .unwrap();
        assert!(results.is_empty());
    }
}
