//! Markdown issue metadata.
//!
//! Issues are plain markdown files with a small YAML-ish frontmatter
//! block. This module deliberately avoids a YAML object round-trip:
//! `status` updates are line-level edits so every other byte of the file
//! survives untouched.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{Config, DEFAULT_ISSUES_DIR, MARKDOWN_PROVIDER};
use crate::deps::Deps;
use crate::error::{MpError, Result};
use crate::fsio::Fs;
use crate::paths;
use crate::report::{Message, Report};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Todo,
    InProgress,
    Done,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in-progress",
            Status::Done => "done",
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Todo
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = MpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "todo" => Ok(Status::Todo),
            "in-progress" => Ok(Status::InProgress),
            "done" => Ok(Status::Done),
            _ => Err(MpError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Frontmatter plumbing
// ---------------------------------------------------------------------------

static TITLE_RE: OnceLock<Regex> = OnceLock::new();
static STATUS_RE: OnceLock<Regex> = OnceLock::new();
static HYPHEN_RE: OnceLock<Regex> = OnceLock::new();

fn title_re() -> &'static Regex {
    TITLE_RE.get_or_init(|| Regex::new(r"(?i)^title:\s*(.+)$").unwrap())
}

fn status_re() -> &'static Regex {
    STATUS_RE.get_or_init(|| Regex::new(r"(?i)^status:\s*(.+)$").unwrap())
}

fn hyphen_re() -> &'static Regex {
    HYPHEN_RE.get_or_init(|| Regex::new(r"-+").unwrap())
}

/// Split a document into its frontmatter lines and the rest. Returns
/// `None` when there is no leading `---` block. Joining
/// `"---\n" + frontmatter + "\n---" + rest` reproduces the input.
fn split_frontmatter(text: &str) -> Option<(String, String)> {
    if !text.starts_with("---\n") && !text.starts_with("---\r\n") {
        return None;
    }
    let lines: Vec<&str> = text.split('\n').collect();
    let end = lines[1..].iter().position(|l| l.trim() == "---")? + 1;
    let frontmatter = lines[1..end].join("\n");
    if frontmatter.is_empty() {
        return None;
    }
    let rest = format!("\n{}", lines[end + 1..].join("\n"));
    Some((frontmatter, rest))
}

fn frontmatter_field(frontmatter: &str, re: &Regex) -> Option<String> {
    for line in frontmatter.split('\n') {
        if let Some(caps) = re.captures(line.trim()) {
            let value = caps[1].trim().trim_matches(|c| c == '"' || c == '\'');
            return Some(value.to_string());
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Name extraction
// ---------------------------------------------------------------------------

/// Display name for an issue: frontmatter `title:`, else the first
/// `# ` heading, else the filename without extension. First match wins.
pub fn extract_issue_name(path: &Path, fs: &dyn Fs) -> Result<String> {
    let text = fs.read_to_string(path)?;

    if let Some((frontmatter, _)) = split_frontmatter(&text) {
        if let Some(title) = frontmatter_field(&frontmatter, title_re()) {
            if !title.is_empty() {
                return Ok(title);
            }
        }
    }

    // H1 scan has no code-fence awareness; the filename fallback covers
    // the pathological cases.
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("# ") {
            let heading = heading.trim();
            if !heading.is_empty() {
                return Ok(heading.to_string());
            }
        }
    }

    Ok(path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Sanitization
// ---------------------------------------------------------------------------

/// Turn an issue title into a filesystem-safe piece name: lowercase,
/// runs of separators and punctuation collapse to single hyphens, and an
/// empty result falls back to `piece`.
pub fn sanitize_piece_name(name: &str) -> String {
    const INVALID: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

    let mut out = String::with_capacity(name.len());
    let mut prev_sep = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        let separator = INVALID.contains(&c)
            || c.is_control()
            || c.is_whitespace()
            || c == '_'
            || c == '.'
            || (c.is_ascii_punctuation() && c != '-');
        if separator {
            if !prev_sep {
                out.push('-');
                prev_sep = true;
            }
        } else if c.is_alphanumeric() || c == '-' {
            out.push(c);
            prev_sep = false;
        }
        // anything else (symbols outside ASCII punctuation) is dropped
    }

    let trimmed = out.trim_matches('-');
    let collapsed = hyphen_re().replace_all(trimmed, "-");
    if collapsed.is_empty() {
        "piece".to_string()
    } else {
        collapsed.into_owned()
    }
}

// ---------------------------------------------------------------------------
// Status parse / update
// ---------------------------------------------------------------------------

/// Read the `status:` field. A missing field or missing frontmatter is
/// the default `todo`; a value outside the enum is an error.
pub fn parse_status(path: &Path, fs: &dyn Fs) -> Result<Status> {
    let text = fs.read_to_string(path)?;
    match split_frontmatter(&text)
        .and_then(|(frontmatter, _)| frontmatter_field(&frontmatter, status_re()))
    {
        Some(raw) => raw.parse(),
        None => Ok(Status::default()),
    }
}

/// Set the `status:` field, preserving everything else byte-for-byte.
/// A missing field is inserted after the first frontmatter line; a file
/// with no frontmatter gets a minimal block prepended.
pub fn update_status(path: &Path, fs: &dyn Fs, status: Status) -> Result<()> {
    let text = fs.read_to_string(path)?;
    let updated = update_status_in_text(&text, status);
    fs.write(path, &updated)
}

fn update_status_in_text(text: &str, status: Status) -> String {
    let Some((frontmatter, rest)) = split_frontmatter(text) else {
        return format!("---\nstatus: {status}\n---\n{text}");
    };

    let mut lines: Vec<String> = frontmatter.split('\n').map(str::to_string).collect();
    let existing = lines
        .iter()
        .position(|l| status_re().is_match(l.trim()));
    match existing {
        Some(i) => lines[i] = format!("status: {status}"),
        // Title is conventionally the first line; keep status right after.
        None => lines.insert(1.min(lines.len()), format!("status: {status}")),
    }

    format!("---\n{}\n---{rest}", lines.join("\n"))
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Resolve an issue path (absolute, or relative to the repo root) and
/// verify it exists.
pub fn resolve_issue_path(repo_root: &Path, issue_path: &str, fs: &dyn Fs) -> Result<PathBuf> {
    let candidate = Path::new(issue_path);
    let resolved = if candidate.is_absolute() {
        paths::clean_path(candidate)
    } else {
        paths::clean_path(&repo_root.join(candidate))
    };
    if !fs.exists(&resolved) {
        return Err(MpError::IssueNotFound(issue_path.to_string()));
    }
    Ok(resolved)
}

// ---------------------------------------------------------------------------
// Issue creation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl IssueInput {
    pub fn with_defaults(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueFile {
    pub path: String,
    pub title: String,
    pub filename: String,
}

/// Create a markdown issue in the configured issues directory, with a
/// unique sanitized filename and a `todo` status.
pub fn create_issue(repo_root: &Path, deps: &Deps, input: IssueInput) -> Result<IssueFile> {
    let input = input.with_defaults();
    if input.title.is_empty() {
        return Err(MpError::InvalidInput("title is required".to_string()));
    }

    let issues_dir = issues_dir_or_default(repo_root, deps.fs.as_ref())?;
    let full_dir = repo_root.join(&issues_dir);
    deps.fs.create_dir_all(&full_dir)?;

    let base = sanitize_piece_name(&input.title);
    let filename = unique_filename(deps.fs.as_ref(), &full_dir, &base)?;
    let content = build_markdown(&input);
    deps.fs.write(&full_dir.join(&filename), &content)?;

    let result = IssueFile {
        path: format!("{issues_dir}/{filename}"),
        title: input.title,
        filename,
    };
    deps.report.emit(
        Message::success(format!("Created {}", result.path))
            .with_data(serde_json::to_value(&result)?),
    );
    Ok(result)
}

fn issues_dir_or_default(repo_root: &Path, fs: &dyn Fs) -> Result<String> {
    let cfg = Config::load(repo_root, fs)?;
    if cfg.issues.provider != MARKDOWN_PROVIDER {
        return Err(MpError::WrongIssueProvider(cfg.issues.provider));
    }
    Ok(cfg
        .issues
        .config
        .get("directory")
        .filter(|d| !d.is_empty())
        .cloned()
        .unwrap_or_else(|| DEFAULT_ISSUES_DIR.to_string()))
}

fn unique_filename(fs: &dyn Fs, dir: &Path, base: &str) -> Result<String> {
    let first = format!("{base}.md");
    if !fs.exists(&dir.join(&first)) {
        return Ok(first);
    }
    for n in 1..=1000 {
        let candidate = format!("{base}-{n}.md");
        if !fs.exists(&dir.join(&candidate)) {
            return Ok(candidate);
        }
    }
    Err(MpError::NameSpaceExhausted)
}

fn build_markdown(input: &IssueInput) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("title: {}\n", escape_yaml(&input.title)));
    out.push_str(&format!("status: {}\n", Status::Todo));
    if !input.description.is_empty() {
        out.push_str(&format!("description: {}\n", escape_yaml(&input.description)));
    }
    out.push_str("---\n\n");
    out.push_str(&format!("# {}\n", input.title));
    if !input.description.is_empty() {
        out.push('\n');
        out.push_str(&input.description);
        out.push('\n');
    }
    out
}

fn escape_yaml(value: &str) -> String {
    let needs_quotes = value.contains(|c| ":#{}[]!|>\"'`@&*?\\".contains(c));
    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ScriptedExec;
    use crate::fsio::MemFs;
    use crate::report::BufferReport;
    use std::sync::Arc;

    fn mem_deps() -> (Deps, Arc<MemFs>) {
        let fs = Arc::new(MemFs::new());
        let deps = Deps::new(
            fs.clone(),
            Arc::new(ScriptedExec::new()),
            Arc::new(BufferReport::new()),
        );
        (deps, fs)
    }

    // -----------------------------------------------------------------------
    // extract_issue_name
    // -----------------------------------------------------------------------

    #[test]
    fn name_from_frontmatter_title() {
        let fs = MemFs::new();
        fs.add_file(
            "/repo/issues/a.md",
            "---\ntitle: \"Add login\"\nstatus: todo\n---\n\n# Other heading\n",
        );
        let name = extract_issue_name(Path::new("/repo/issues/a.md"), &fs).unwrap();
        assert_eq!(name, "Add login");
    }

    #[test]
    fn name_falls_back_to_h1() {
        let fs = MemFs::new();
        fs.add_file("/repo/issues/a.md", "some intro\n\n# Fix the parser\nbody\n");
        let name = extract_issue_name(Path::new("/repo/issues/a.md"), &fs).unwrap();
        assert_eq!(name, "Fix the parser");
    }

    #[test]
    fn name_falls_back_to_filename() {
        let fs = MemFs::new();
        fs.add_file("/repo/issues/fix-build.md", "no headings here\n");
        let name = extract_issue_name(Path::new("/repo/issues/fix-build.md"), &fs).unwrap();
        assert_eq!(name, "fix-build");
    }

    // -----------------------------------------------------------------------
    // sanitize_piece_name
    // -----------------------------------------------------------------------

    #[test]
    fn sanitize_basic() {
        assert_eq!(sanitize_piece_name("Add login"), "add-login");
        assert_eq!(sanitize_piece_name("Fix: parser/crash"), "fix-parser-crash");
        assert_eq!(sanitize_piece_name("a__b..c  d"), "a-b-c-d");
        assert_eq!(sanitize_piece_name("--keep-hyphens--"), "keep-hyphens");
    }

    #[test]
    fn sanitize_empty_and_punctuation_fall_back() {
        assert_eq!(sanitize_piece_name(""), "piece");
        assert_eq!(sanitize_piece_name("!!!"), "piece");
        assert_eq!(sanitize_piece_name("  .  "), "piece");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for input in ["Add Login!", "weird___name", "ALL CAPS", "a - b - c", "übergröße"] {
            let once = sanitize_piece_name(input);
            assert_eq!(sanitize_piece_name(&once), once, "input: {input}");
        }
    }

    // -----------------------------------------------------------------------
    // parse_status / update_status
    // -----------------------------------------------------------------------

    const ISSUE: &str = "/repo/issues/login.md";

    #[test]
    fn parse_status_defaults_to_todo() {
        let fs = MemFs::new();
        fs.add_file(ISSUE, "# No frontmatter\n");
        assert_eq!(parse_status(Path::new(ISSUE), &fs).unwrap(), Status::Todo);

        fs.add_file(ISSUE, "---\ntitle: Login\n---\nbody\n");
        assert_eq!(parse_status(Path::new(ISSUE), &fs).unwrap(), Status::Todo);
    }

    #[test]
    fn parse_status_rejects_unknown_values() {
        let fs = MemFs::new();
        fs.add_file(ISSUE, "---\nstatus: blocked\n---\n");
        assert!(matches!(
            parse_status(Path::new(ISSUE), &fs),
            Err(MpError::InvalidStatus(v)) if v == "blocked"
        ));
    }

    #[test]
    fn parse_status_is_case_insensitive_on_field_and_strips_quotes() {
        let fs = MemFs::new();
        fs.add_file(ISSUE, "---\nStatus: 'in-progress'\n---\n");
        assert_eq!(
            parse_status(Path::new(ISSUE), &fs).unwrap(),
            Status::InProgress
        );
    }

    #[test]
    fn update_status_roundtrips_every_value() {
        let fs = MemFs::new();
        for status in [Status::Todo, Status::InProgress, Status::Done] {
            fs.add_file(ISSUE, "---\ntitle: Login\nstatus: todo\npriority: high\n---\n\nBody text.\n");
            update_status(Path::new(ISSUE), &fs, status).unwrap();
            assert_eq!(parse_status(Path::new(ISSUE), &fs).unwrap(), status);
        }
    }

    #[test]
    fn update_status_preserves_other_content_byte_for_byte() {
        let fs = MemFs::new();
        let original = "---\ntitle: Login\nstatus: todo\npriority: high\nlabels: [auth, ui]\n---\n\n# Login\n\nSome *body* text.\n";
        fs.add_file(ISSUE, original);
        update_status(Path::new(ISSUE), &fs, Status::Done).unwrap();

        let updated = fs.read_to_string(Path::new(ISSUE)).unwrap();
        let expected = original.replace("status: todo", "status: done");
        assert_eq!(updated, expected);
    }

    #[test]
    fn update_status_inserts_field_after_title() {
        let fs = MemFs::new();
        fs.add_file(ISSUE, "---\ntitle: Login\npriority: high\n---\nbody\n");
        update_status(Path::new(ISSUE), &fs, Status::InProgress).unwrap();
        assert_eq!(
            fs.read_to_string(Path::new(ISSUE)).unwrap(),
            "---\ntitle: Login\nstatus: in-progress\npriority: high\n---\nbody\n"
        );
    }

    #[test]
    fn update_status_synthesizes_frontmatter() {
        let fs = MemFs::new();
        fs.add_file(ISSUE, "# Login\n\nbody\n");
        update_status(Path::new(ISSUE), &fs, Status::InProgress).unwrap();

        let updated = fs.read_to_string(Path::new(ISSUE)).unwrap();
        assert!(updated.starts_with("---\n"));
        assert!(updated.ends_with("# Login\n\nbody\n"));
        assert_eq!(
            parse_status(Path::new(ISSUE), &fs).unwrap(),
            Status::InProgress
        );
    }

    // -----------------------------------------------------------------------
    // resolve_issue_path
    // -----------------------------------------------------------------------

    #[test]
    fn resolve_relative_and_absolute_paths() {
        let fs = MemFs::new();
        fs.add_file("/repo/issues/a.md", "x");

        let p = resolve_issue_path(Path::new("/repo"), "issues/a.md", &fs).unwrap();
        assert_eq!(p, PathBuf::from("/repo/issues/a.md"));

        let p = resolve_issue_path(Path::new("/repo"), "/repo/issues/a.md", &fs).unwrap();
        assert_eq!(p, PathBuf::from("/repo/issues/a.md"));

        assert!(matches!(
            resolve_issue_path(Path::new("/repo"), "issues/missing.md", &fs),
            Err(MpError::IssueNotFound(_))
        ));
    }

    // -----------------------------------------------------------------------
    // create_issue
    // -----------------------------------------------------------------------

    fn init_config(fs: &MemFs) {
        fs.add_file(
            "/repo/.monkeypuzzle/monkeypuzzle.json",
            r#"{"version":"1","project":{"name":"demo"},"issues":{"provider":"markdown","config":{"directory":"issues"}},"pr":{"provider":"github","config":{}}}"#,
        );
    }

    #[test]
    fn create_issue_writes_frontmatter_and_body() {
        let (deps, fs) = mem_deps();
        init_config(&fs);

        let issue = create_issue(
            Path::new("/repo"),
            &deps,
            IssueInput {
                title: "Add login".to_string(),
                description: "Users need a login form".to_string(),
            },
        )
        .unwrap();

        assert_eq!(issue.filename, "add-login.md");
        let content = fs
            .read_to_string(Path::new("/repo/issues/add-login.md"))
            .unwrap();
        assert!(content.starts_with("---\ntitle: Add login\nstatus: todo\n"));
        assert!(content.contains("# Add login"));
        assert!(content.contains("Users need a login form"));
    }

    #[test]
    fn create_issue_avoids_filename_collisions() {
        let (deps, fs) = mem_deps();
        init_config(&fs);
        fs.add_file("/repo/issues/add-login.md", "existing");

        let issue = create_issue(
            Path::new("/repo"),
            &deps,
            IssueInput {
                title: "Add login".to_string(),
                description: String::new(),
            },
        )
        .unwrap();
        assert_eq!(issue.filename, "add-login-1.md");
    }

    #[test]
    fn create_issue_quotes_special_titles() {
        let (deps, fs) = mem_deps();
        init_config(&fs);

        create_issue(
            Path::new("/repo"),
            &deps,
            IssueInput {
                title: "fix: parser".to_string(),
                description: String::new(),
            },
        )
        .unwrap();
        let content = fs
            .read_to_string(Path::new("/repo/issues/fix-parser.md"))
            .unwrap();
        assert!(content.contains("title: \"fix: parser\""));
    }

    #[test]
    fn create_issue_requires_title() {
        let (deps, fs) = mem_deps();
        init_config(&fs);
        assert!(matches!(
            create_issue(Path::new("/repo"), &deps, IssueInput::default()),
            Err(MpError::InvalidInput(_))
        ));
    }
}
