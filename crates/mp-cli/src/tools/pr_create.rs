use super::MpTool;
use mp_core::pr::{PrHandler, PrInput};
use std::path::Path;

pub struct PrCreateTool;

impl MpTool for PrCreateTool {
    fn name(&self) -> &str {
        "pr_create"
    }

    fn description(&self) -> &str {
        "Push the current piece's branch and create a GitHub pull request for it. Defaults the title to the linked issue's name."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "PR title (default: issue title or piece name)"
                },
                "body": {
                    "type": "string",
                    "description": "PR description"
                },
                "base": {
                    "type": "string",
                    "description": "Base branch (default: main)"
                }
            }
        })
    }

    fn call(&self, args: serde_json::Value, work_dir: &Path) -> Result<serde_json::Value, String> {
        let (deps, engine) = super::make_engine()?;
        let handler = PrHandler::new(deps, engine);
        let result = handler
            .create_pr(
                work_dir,
                PrInput {
                    title: super::arg_str(&args, "title").unwrap_or_default(),
                    body: super::arg_str(&args, "body").unwrap_or_default(),
                    base: super::arg_str(&args, "base").unwrap_or_default(),
                },
            )
            .map_err(|e| e.to_string())?;
        serde_json::to_value(result).map_err(|e| e.to_string())
    }
}
