use super::MpTool;
use std::path::Path;

pub struct PieceMergeTool;

impl MpTool for PieceMergeTool {
    fn name(&self) -> &str {
        "piece_merge"
    }

    fn description(&self) -> &str {
        "Squash-merge the current piece into the main branch as one commit. Fails while main has commits the piece has not merged in."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "main_branch": {
                    "type": "string",
                    "description": "Main branch name (default: main)"
                }
            }
        })
    }

    fn call(&self, args: serde_json::Value, work_dir: &Path) -> Result<serde_json::Value, String> {
        let main_branch =
            super::arg_str(&args, "main_branch").unwrap_or_else(|| "main".to_string());
        let (_, engine) = super::make_engine()?;
        engine
            .merge_piece(work_dir, &main_branch)
            .map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "merged": true, "main_branch": main_branch }))
    }
}
