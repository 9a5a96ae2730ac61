use crate::output::print_json;
use anyhow::Context;
use mp_core::config::{init_project, InitInput};

pub fn run(
    json: bool,
    name: Option<String>,
    issue_provider: String,
    pr_provider: String,
) -> anyhow::Result<()> {
    let deps = super::make_deps(json);
    let root = super::work_dir()?;

    let name = match name {
        Some(n) => n,
        None => root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string()),
    };

    let cfg = init_project(
        &root,
        &deps,
        InitInput {
            name,
            issue_provider,
            pr_provider,
        },
    )
    .context("failed to initialize project")?;

    print_json(&cfg)
}
