use super::MpTool;
use std::path::Path;

pub struct PieceUpdateTool;

impl MpTool for PieceUpdateTool {
    fn name(&self) -> &str {
        "piece_update"
    }

    fn description(&self) -> &str {
        "Merge the main branch into the current piece. Runs the before/after-piece-update hooks."
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
            .update_piece(work_dir, &main_branch)
            .map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "updated": true, "main_branch": main_branch }))
    }
}
