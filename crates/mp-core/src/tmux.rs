//! Session adapter over the tmux CLI.

use std::path::Path;
use std::sync::Arc;

use crate::error::{MpError, Result};
use crate::exec::Exec;

pub struct Tmux {
    exec: Arc<dyn Exec>,
}

impl Tmux {
    pub fn new(exec: Arc<dyn Exec>) -> Self {
        Self { exec }
    }

    /// Whether a tmux binary is on PATH at all. Session creation is
    /// best-effort either way; callers use this for friendlier warnings.
    pub fn is_available() -> bool {
        which::which("tmux").is_ok()
    }

    fn tmux(&self, args: &[&str]) -> Result<()> {
        let out = self.exec.run("tmux", args)?;
        if !out.success() {
            return Err(MpError::CommandFailed {
                command: format!("tmux {}", args.join(" ")),
                output: out.output.trim().to_string(),
            });
        }
        Ok(())
    }

    /// Create a detached session anchored to `work_dir`.
    pub fn new_session(&self, name: &str, work_dir: &Path) -> Result<()> {
        let dir = work_dir.to_string_lossy();
        self.tmux(&["new-session", "-d", "-s", name, "-c", dir.as_ref()])
    }

    pub fn attach_session(&self, name: &str) -> Result<()> {
        self.tmux(&["attach-session", "-t", name])
    }

    pub fn kill_session(&self, name: &str) -> Result<()> {
        self.tmux(&["kill-session", "-t", name])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ScriptedExec;

    #[test]
    fn new_session_passes_name_and_dir() {
        let exec = Arc::new(ScriptedExec::new());
        exec.respond(
            "tmux",
            &["new-session", "-d", "-s", "mp-piece-x", "-c", "/pieces/x"],
            0,
            "",
        );
        let tmux = Tmux::new(exec.clone());
        tmux.new_session("mp-piece-x", Path::new("/pieces/x")).unwrap();
        assert!(exec.was_called(
            "tmux",
            &["new-session", "-d", "-s", "mp-piece-x", "-c", "/pieces/x"]
        ));
    }

    #[test]
    fn kill_session_surfaces_failure() {
        let exec = Arc::new(ScriptedExec::new());
        exec.respond(
            "tmux",
            &["kill-session", "-t", "mp-piece-x"],
            1,
            "can't find session: mp-piece-x",
        );
        let tmux = Tmux::new(exec);
        assert!(tmux.kill_session("mp-piece-x").is_err());
    }
}
