use std::path::{Path, PathBuf};

use anyhow::Context;
use mp_core::git::Git;
use mp_core::paths;
use mp_core::piece::{CleanupOptions, PieceEngine};
use mp_core::report::{Message, Report};
use mp_core::tmux::Tmux;

use crate::output::print_json;

fn engine(json: bool) -> anyhow::Result<(mp_core::Deps, PieceEngine)> {
    let deps = super::make_deps(json);
    let engine = PieceEngine::new(deps.clone()).context("failed to resolve pieces directory")?;
    Ok((deps, engine))
}

pub fn status(json: bool) -> anyhow::Result<()> {
    let (_, engine) = engine(json)?;
    let wd = super::work_dir()?;
    let status = engine.status(&wd)?;

    if !json {
        if status.in_piece {
            eprintln!(
                "Working on piece: {}",
                status.piece_name.as_deref().unwrap_or("?")
            );
            if let Some(path) = &status.worktree_path {
                eprintln!("Worktree path: {}", path.display());
            }
        } else {
            eprintln!("In main repository");
            if let Some(root) = &status.repo_root {
                eprintln!("Repo root: {}", root.display());
            }
        }
    }

    print_json(&status)
}

pub fn new(json: bool, name: Option<String>, issue: Option<String>) -> anyhow::Result<()> {
    if name.is_some() && issue.is_some() {
        anyhow::bail!("cannot use both --name and --issue flags together");
    }
    if let Some(issue) = &issue {
        if issue.trim().is_empty() {
            anyhow::bail!("--issue flag requires a non-empty path");
        }
    }

    let (deps, engine) = engine(json)?;
    let wd = super::work_dir()?;
    let source_dir = find_source_dir(&wd);

    if !Tmux::is_available() {
        deps.report.emit(Message::warning(
            "tmux not found in PATH; session creation will be skipped".to_string(),
        ));
    }

    let info = match issue {
        Some(issue_path) => engine.create_piece_from_issue(&wd, &source_dir, &issue_path)?,
        None => engine.create_piece(&wd, &source_dir, name.as_deref())?,
    };
    print_json(&info)
}

pub fn update(json: bool, main_branch: &str) -> anyhow::Result<()> {
    let (_, engine) = engine(json)?;
    let wd = super::work_dir()?;
    engine.update_piece(&wd, main_branch)?;
    Ok(())
}

pub fn merge(json: bool, main_branch: &str) -> anyhow::Result<()> {
    let (_, engine) = engine(json)?;
    let wd = super::work_dir()?;
    engine.merge_piece(&wd, main_branch)?;
    Ok(())
}

pub fn cleanup(json: bool, dry_run: bool, force: bool, main_branch: String) -> anyhow::Result<()> {
    let (deps, engine) = engine(json)?;
    let wd = super::work_dir()?;
    let repo_root = Git::new(deps.exec.clone())
        .main_repo_root(&wd)
        .map_err(|_| mp_core::MpError::NotGitRepository)?;

    let results = engine.cleanup_merged_pieces(
        &repo_root,
        &CleanupOptions {
            dry_run,
            force,
            main_branch,
        },
    )?;
    print_json(&results)
}

pub fn attach(json: bool, name: Option<String>) -> anyhow::Result<()> {
    let (deps, engine) = engine(json)?;
    let session = match name {
        Some(name) => paths::session_name(&name),
        None => {
            let wd = super::work_dir()?;
            let status = engine.status(&wd)?;
            let piece = status
                .piece_name
                .ok_or(mp_core::MpError::NotInPiece)?;
            paths::session_name(&piece)
        }
    };
    Tmux::new(deps.exec.clone())
        .attach_session(&session)
        .with_context(|| format!("failed to attach to session {session}"))?;
    Ok(())
}

/// Locate the monkeypuzzle source checkout for the worktree's
/// back-reference symlink: walk upward looking for the workspace
/// manifest, falling back to the starting directory.
pub fn find_source_dir(start: &Path) -> PathBuf {
    let mut dir = start.to_path_buf();
    loop {
        let manifest = dir.join("Cargo.toml");
        if let Ok(content) = std::fs::read_to_string(&manifest) {
            if content.contains("name = \"mp-cli\"") || content.contains("name = \"mp-core\"") {
                return dir;
            }
        }
        match dir.parent() {
            Some(parent) => dir = parent.to_path_buf(),
            None => break,
        }
    }
    start.to_path_buf()
}
