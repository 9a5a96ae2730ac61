use std::io::{IsTerminal, Read};

use anyhow::Context;
use mp_core::git::Git;
use mp_core::issue::{create_issue, IssueInput};

use crate::output::print_json;

pub fn create(
    json: bool,
    title: Option<String>,
    description: Option<String>,
    schema: bool,
) -> anyhow::Result<()> {
    if schema {
        return print_json(&serde_json::json!({
            "title": "",
            "description": "",
        }));
    }

    let deps = super::make_deps(json);
    let work_dir = super::work_dir()?;
    let root = Git::new(deps.exec.clone())
        .repo_root(&work_dir)
        .unwrap_or(work_dir);

    let input = resolve_input(title, description)?;
    let issue = create_issue(&root, &deps, input).context("failed to create issue")?;
    print_json(&issue)
}

/// Thin input resolution: flags win, then JSON piped to stdin.
fn resolve_input(
    title: Option<String>,
    description: Option<String>,
) -> anyhow::Result<IssueInput> {
    if let Some(title) = title {
        return Ok(IssueInput {
            title,
            description: description.unwrap_or_default(),
        });
    }

    if !std::io::stdin().is_terminal() {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        if !raw.trim().is_empty() {
            let input: IssueInput =
                serde_json::from_str(&raw).context("invalid JSON on stdin")?;
            return Ok(input);
        }
    }

    anyhow::bail!("title is required: pass --title or pipe JSON to stdin (see --schema)")
}
