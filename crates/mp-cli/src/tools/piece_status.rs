use super::MpTool;
use std::path::Path;

pub struct PieceStatusTool;

impl MpTool for PieceStatusTool {
    fn name(&self) -> &str {
        "piece_status"
    }

    fn description(&self) -> &str {
        "Report whether the working directory is inside a piece worktree, and resolve the piece name and main repository root."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    fn call(&self, _args: serde_json::Value, work_dir: &Path) -> Result<serde_json::Value, String> {
        let (_, engine) = super::make_engine()?;
        let status = engine.status(work_dir).map_err(|e| e.to_string())?;
        serde_json::to_value(status).map_err(|e| e.to_string())
    }
}
