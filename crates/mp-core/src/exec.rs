//! Process-execution port.
//!
//! Every external tool the engine touches (git, tmux, gh, bash) goes
//! through the `Exec` trait. `SystemExec` is the real adapter;
//! `ScriptedExec` replays configured responses and records calls for
//! tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use crate::error::{MpError, Result};

/// Captured result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Process exit code (-1 if terminated by signal).
    pub code: i32,
    /// Combined stdout + stderr, lossily decoded.
    pub output: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

pub trait Exec: Send + Sync {
    /// Run `program` with `args` in the current working directory.
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecOutput>;

    /// Run `program` with `args` in `dir`.
    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecOutput>;

    /// Run `program` in `dir` with the environment replaced wholesale by
    /// `env`. Nothing from the ambient environment leaks through.
    fn run_with_env(
        &self,
        dir: &Path,
        env: &[(String, String)],
        program: &str,
        args: &[&str],
    ) -> Result<ExecOutput>;
}

// ---------------------------------------------------------------------------
// SystemExec
// ---------------------------------------------------------------------------

/// Real adapter over `std::process::Command`.
pub struct SystemExec;

impl SystemExec {
    fn finish(mut cmd: Command, program: &str, args: &[&str]) -> Result<ExecOutput> {
        let out = cmd.output().map_err(|e| MpError::CommandFailed {
            command: format!("{program} {}", args.join(" ")),
            output: format!("failed to spawn: {e}"),
        })?;
        let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&out.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        Ok(ExecOutput {
            code: out.status.code().unwrap_or(-1),
            output: combined,
        })
    }
}

impl Exec for SystemExec {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        Self::finish(cmd, program, args)
    }

    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(dir);
        Self::finish(cmd, program, args)
    }

    fn run_with_env(
        &self,
        dir: &Path,
        env: &[(String, String)],
        program: &str,
        args: &[&str],
    ) -> Result<ExecOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(dir).env_clear();
        for (k, v) in env {
            cmd.env(k, v);
        }
        Self::finish(cmd, program, args)
    }
}

// ---------------------------------------------------------------------------
// ScriptedExec
// ---------------------------------------------------------------------------

/// One recorded invocation, for assertions.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub program: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    pub env: Option<Vec<(String, String)>>,
}

#[derive(Default)]
struct Script {
    responses: HashMap<String, (i32, String)>,
    calls: Vec<CallRecord>,
}

/// Deterministic fake: commands answer with pre-registered responses,
/// unregistered commands fail the way a missing binary would.
#[derive(Default)]
pub struct ScriptedExec {
    inner: Mutex<Script>,
}

impl ScriptedExec {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(program: &str, args: &[&str]) -> String {
        format!("{program} {}", args.join(" "))
    }

    /// Register the response for an exact `program args..` invocation.
    pub fn respond(&self, program: &str, args: &[&str], code: i32, output: &str) {
        let mut s = self.inner.lock().unwrap();
        s.responses
            .insert(Self::key(program, args), (code, output.to_string()));
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn was_called(&self, program: &str, args: &[&str]) -> bool {
        let key = Self::key(program, args);
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .any(|c| format!("{} {}", c.program, c.args.join(" ")) == key)
    }

    fn dispatch(&self, record: CallRecord, program: &str, args: &[&str]) -> Result<ExecOutput> {
        let key = Self::key(program, args);
        let mut s = self.inner.lock().unwrap();
        s.calls.push(record);
        match s.responses.get(&key) {
            Some((code, output)) => Ok(ExecOutput {
                code: *code,
                output: output.clone(),
            }),
            None => Err(MpError::CommandFailed {
                command: key,
                output: "no scripted response".to_string(),
            }),
        }
    }
}

impl Exec for ScriptedExec {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecOutput> {
        let record = CallRecord {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            dir: None,
            env: None,
        };
        self.dispatch(record, program, args)
    }

    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecOutput> {
        let record = CallRecord {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            dir: Some(dir.to_path_buf()),
            env: None,
        };
        self.dispatch(record, program, args)
    }

    fn run_with_env(
        &self,
        dir: &Path,
        env: &[(String, String)],
        program: &str,
        args: &[&str],
    ) -> Result<ExecOutput> {
        let record = CallRecord {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            dir: Some(dir.to_path_buf()),
            env: Some(env.to_vec()),
        };
        self.dispatch(record, program, args)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
