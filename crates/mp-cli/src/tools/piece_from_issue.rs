use super::MpTool;
use std::path::Path;

pub struct PieceFromIssueTool;

impl MpTool for PieceFromIssueTool {
    fn name(&self) -> &str {
        "piece_from_issue"
    }

    fn description(&self) -> &str {
        "Create a piece from a markdown issue file: names the piece after the issue title, links them with a marker, and moves a todo issue to in-progress."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "issue_path": {
                    "type": "string",
                    "description": "Issue file path, absolute or relative to the repo root"
                }
            },
            "required": ["issue_path"]
        })
    }

    fn call(&self, args: serde_json::Value, work_dir: &Path) -> Result<serde_json::Value, String> {
        let issue_path = super::arg_str(&args, "issue_path")
            .ok_or_else(|| "missing required argument: issue_path".to_string())?;
        let (_, engine) = super::make_engine()?;
        let source_dir = crate::cmd::piece::find_source_dir(work_dir);
        let info = engine
            .create_piece_from_issue(work_dir, &source_dir, &issue_path)
            .map_err(|e| e.to_string())?;
        serde_json::to_value(info).map_err(|e| e.to_string())
    }
}
