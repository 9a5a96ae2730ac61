//! Lifecycle hook runner.
//!
//! Hooks are opt-in shell scripts under `.monkeypuzzle/hooks/`. A missing
//! script is success; a present but non-executable script is skipped with
//! a warning. Context reaches the script as `MP_*` environment variables,
//! and any `MP_*` variables already in the ambient environment are
//! stripped first so stale values never leak into a hook.

use std::fmt;
use std::path::Path;

use crate::deps::Deps;
use crate::error::{MpError, Result};
use crate::exec::Exec;
use crate::fsio::Fs;
use crate::paths;
use crate::report::{Message, Report};

pub const ENV_PREFIX: &str = "MP_";

// ---------------------------------------------------------------------------
// Hook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    OnPieceCreate,
    BeforePieceUpdate,
    AfterPieceUpdate,
    BeforePieceMerge,
    AfterPieceMerge,
}

impl Hook {
    pub fn as_str(self) -> &'static str {
        match self {
            Hook::OnPieceCreate => "on-piece-create",
            Hook::BeforePieceUpdate => "before-piece-update",
            Hook::AfterPieceUpdate => "after-piece-update",
            Hook::BeforePieceMerge => "before-piece-merge",
            Hook::AfterPieceMerge => "after-piece-merge",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.sh", self.as_str())
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HookContext
// ---------------------------------------------------------------------------

/// Context injected into a hook's environment. Empty fields are omitted.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub piece_name: String,
    pub worktree_path: String,
    pub repo_root: String,
    pub main_branch: String,
    pub session_name: String,
}

impl HookContext {
    fn vars(&self) -> Vec<(String, String)> {
        let fields = [
            ("MP_PIECE_NAME", &self.piece_name),
            ("MP_WORKTREE_PATH", &self.worktree_path),
            ("MP_REPO_ROOT", &self.repo_root),
            ("MP_MAIN_BRANCH", &self.main_branch),
            ("MP_SESSION_NAME", &self.session_name),
        ];
        fields
            .into_iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// HookRunner
// ---------------------------------------------------------------------------

pub struct HookRunner {
    deps: Deps,
}

impl HookRunner {
    pub fn new(deps: Deps) -> Self {
        Self { deps }
    }

    pub fn run(&self, repo_root: &Path, hook: Hook, ctx: &HookContext) -> Result<()> {
        let hook_path = paths::hooks_dir(repo_root).join(hook.file_name());
        if !self.deps.fs.exists(&hook_path) {
            return Ok(());
        }

        if !self.deps.fs.is_executable(&hook_path)? {
            self.deps.report.emit(Message::warning(format!(
                "Hook {hook} is not executable, skipping"
            )));
            return Ok(());
        }

        // Environment is rebuilt per invocation; the ambient environment
        // can change between hooks within one process.
        let env = build_env(ctx);

        self.deps
            .report
            .emit(Message::info(format!("Running hook: {hook}")));

        let hook_arg = hook_path.to_string_lossy();
        let out = self
            .deps
            .exec
            .run_with_env(repo_root, &env, "bash", &[hook_arg.as_ref()])?;

        if !out.success() {
            if !out.output.is_empty() {
                self.deps.report.emit(Message::error(out.output.clone()));
            }
            return Err(MpError::HookFailed {
                hook: hook.as_str().to_string(),
                output: out.output.trim().to_string(),
            });
        }

        if !out.output.is_empty() {
            self.deps.report.emit(Message::info(out.output));
        }
        Ok(())
    }
}

/// Ambient environment minus every `MP_*` variable, plus the context.
fn build_env(ctx: &HookContext) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = std::env::vars()
        .filter(|(k, _)| !k.starts_with(ENV_PREFIX))
        .collect();
    env.extend(ctx.vars());
    env
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
