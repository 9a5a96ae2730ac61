use super::MpTool;
use mp_core::git::Git;
use mp_core::issue::{create_issue, IssueInput};
use std::path::Path;

pub struct IssueCreateTool;

impl MpTool for IssueCreateTool {
    fn name(&self) -> &str {
        "issue_create"
    }

    fn description(&self) -> &str {
        "Create a markdown issue file with frontmatter (title, status: todo) in the configured issues directory."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Issue title"
                },
                "description": {
                    "type": "string",
                    "description": "Issue description"
                }
            },
            "required": ["title"]
        })
    }

    fn call(&self, args: serde_json::Value, work_dir: &Path) -> Result<serde_json::Value, String> {
        let title = super::arg_str(&args, "title")
            .ok_or_else(|| "missing required argument: title".to_string())?;
        let deps = super::make_deps();
        let root = Git::new(deps.exec.clone())
            .repo_root(work_dir)
            .unwrap_or_else(|_| work_dir.to_path_buf());

        let issue = create_issue(
            &root,
            &deps,
            IssueInput {
                title,
                description: super::arg_str(&args, "description").unwrap_or_default(),
            },
        )
        .map_err(|e| e.to_string())?;
        serde_json::to_value(issue).map_err(|e| e.to_string())
    }
}
