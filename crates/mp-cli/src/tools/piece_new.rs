use super::MpTool;
use std::path::Path;

pub struct PieceNewTool;

impl MpTool for PieceNewTool {
    fn name(&self) -> &str {
        "piece_new"
    }

    fn description(&self) -> &str {
        "Create a new piece: a git worktree with its own branch and a detached tmux session. Runs the on-piece-create hook."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Piece name (omit to auto-generate)"
                }
            }
        })
    }

    fn call(&self, args: serde_json::Value, work_dir: &Path) -> Result<serde_json::Value, String> {
        let (_, engine) = super::make_engine()?;
        let name = super::arg_str(&args, "name");
        let source_dir = crate::cmd::piece::find_source_dir(work_dir);
        let info = engine
            .create_piece(work_dir, &source_dir, name.as_deref())
            .map_err(|e| e.to_string())?;
        serde_json::to_value(info).map_err(|e| e.to_string())
    }
}
