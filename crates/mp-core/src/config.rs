//! Project configuration (`.monkeypuzzle/monkeypuzzle.json`) and the
//! `mp init` scaffolding that writes it.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::deps::Deps;
use crate::error::{MpError, Result};
use crate::fsio::Fs;
use crate::paths;
use crate::report::{Message, Report};

pub const MARKDOWN_PROVIDER: &str = "markdown";
pub const DEFAULT_ISSUES_DIR: &str = "issues";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub project: ProjectConfig,
    pub issues: ProviderConfig,
    pub pr: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: String,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl Config {
    pub fn load(root: &Path, fs: &dyn Fs) -> Result<Self> {
        let path = paths::config_path(root);
        if !fs.exists(&path) {
            return Err(MpError::ConfigMissing);
        }
        let data = fs.read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, root: &Path, fs: &dyn Fs) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        fs.write(&paths::config_path(root), &data)
    }

    /// The configured issues directory, validating that the markdown
    /// provider is selected.
    pub fn issues_dir(&self) -> Result<&str> {
        if self.issues.provider != MARKDOWN_PROVIDER {
            return Err(MpError::WrongIssueProvider(self.issues.provider.clone()));
        }
        match self.issues.config.get("directory") {
            Some(dir) if !dir.is_empty() => Ok(dir),
            _ => Err(MpError::IssuesDirUnset),
        }
    }
}

// ---------------------------------------------------------------------------
// Init
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct InitInput {
    pub name: String,
    pub issue_provider: String,
    pub pr_provider: String,
}

/// Scaffold `.monkeypuzzle/` in `root`: write the config, create the
/// issues directory for the markdown provider, and ignore the per-piece
/// issue marker. Re-running against an initialized project is a no-op.
pub fn init_project(root: &Path, deps: &Deps, input: InitInput) -> Result<Config> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(MpError::InvalidInput("project name is required".to_string()));
    }

    let config_path = paths::config_path(root);
    if deps.fs.exists(&config_path) {
        let cfg = Config::load(root, deps.fs.as_ref())?;
        deps.report
            .emit(Message::info(format!("already initialized: {}", config_path.display())));
        return Ok(cfg);
    }

    deps.fs.create_dir_all(&paths::mp_dir(root))?;

    let mut issues = ProviderConfig {
        provider: input.issue_provider.clone(),
        config: HashMap::new(),
    };
    if input.issue_provider == MARKDOWN_PROVIDER {
        deps.fs.create_dir_all(&root.join(DEFAULT_ISSUES_DIR))?;
        issues
            .config
            .insert("directory".to_string(), DEFAULT_ISSUES_DIR.to_string());
    }

    let cfg = Config {
        version: "1".to_string(),
        project: ProjectConfig {
            name: name.to_string(),
        },
        issues,
        pr: ProviderConfig {
            provider: input.pr_provider,
            config: HashMap::new(),
        },
    };
    cfg.save(root, deps.fs.as_ref())?;

    let marker_entry = format!("{}/{}", paths::MP_DIR, paths::CURRENT_ISSUE_FILE);
    ensure_gitignore_entry(root, deps.fs.as_ref(), &marker_entry)?;

    deps.report.emit(
        Message::success(format!("Created {}", config_path.display()))
            .with_data(serde_json::to_value(&cfg)?),
    );
    Ok(cfg)
}

/// Add `entry` to `root/.gitignore` if it isn't already present.
/// Checks for an exact line match.
pub fn ensure_gitignore_entry(root: &Path, fs: &dyn Fs, entry: &str) -> Result<()> {
    let gitignore = root.join(".gitignore");
    let existing = if fs.exists(&gitignore) {
        fs.read_to_string(&gitignore)?
    } else {
        String::new()
    };
    if existing.lines().any(|l| l == entry) {
        return Ok(());
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(entry);
    updated.push('\n');
    fs.write(&gitignore, &updated)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ScriptedExec;
    use crate::fsio::MemFs;
    use crate::report::{BufferReport, Level};
    use std::sync::Arc;

    fn mem_deps() -> (Deps, Arc<MemFs>, Arc<BufferReport>) {
        let fs = Arc::new(MemFs::new());
        let report = Arc::new(BufferReport::new());
        let deps = Deps::new(fs.clone(), Arc::new(ScriptedExec::new()), report.clone());
        (deps, fs, report)
    }

    #[test]
    fn init_writes_config_and_gitignore() {
        let (deps, fs, report) = mem_deps();
        let root = Path::new("/repo");

        let cfg = init_project(
            root,
            &deps,
            InitInput {
                name: "demo".to_string(),
                issue_provider: "markdown".to_string(),
                pr_provider: "github".to_string(),
            },
        )
        .unwrap();

        assert_eq!(cfg.project.name, "demo");
        assert_eq!(cfg.issues.config.get("directory").unwrap(), "issues");
        assert!(fs.is_dir(Path::new("/repo/issues")));
        let ignore = fs.read_to_string(Path::new("/repo/.gitignore")).unwrap();
        assert!(ignore.contains(".monkeypuzzle/current-issue.json"));
        assert!(report.has_level(Level::Success));
    }

    #[test]
    fn init_is_idempotent() {
        let (deps, fs, _) = mem_deps();
        let root = Path::new("/repo");
        let input = InitInput {
            name: "demo".to_string(),
            issue_provider: "markdown".to_string(),
            pr_provider: "github".to_string(),
        };

        init_project(root, &deps, input.clone()).unwrap();
        init_project(root, &deps, input).unwrap();

        let ignore = fs.read_to_string(Path::new("/repo/.gitignore")).unwrap();
        let count = ignore
            .lines()
            .filter(|l| *l == ".monkeypuzzle/current-issue.json")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn load_missing_config_is_config_missing() {
        let fs = MemFs::new();
        assert!(matches!(
            Config::load(Path::new("/repo"), &fs),
            Err(MpError::ConfigMissing)
        ));
    }

    #[test]
    fn issues_dir_requires_markdown_provider() {
        let (deps, _, _) = mem_deps();
        let root = Path::new("/repo");
        let mut cfg = init_project(
            root,
            &deps,
            InitInput {
                name: "demo".to_string(),
                issue_provider: "markdown".to_string(),
                pr_provider: "github".to_string(),
            },
        )
        .unwrap();
        assert_eq!(cfg.issues_dir().unwrap(), "issues");

        cfg.issues.provider = "jira".to_string();
        assert!(matches!(
            cfg.issues_dir(),
            Err(MpError::WrongIssueProvider(_))
        ));
    }

    #[test]
    fn gitignore_appends_without_clobbering() {
        let fs = MemFs::new();
        let root = Path::new("/repo");
        fs.add_file("/repo/.gitignore", "target\n");

        ensure_gitignore_entry(root, &fs, ".monkeypuzzle/current-issue.json").unwrap();
        let ignore = fs.read_to_string(Path::new("/repo/.gitignore")).unwrap();
        assert!(ignore.starts_with("target\n"));
        assert!(ignore.contains(".monkeypuzzle/current-issue.json"));
    }
}
