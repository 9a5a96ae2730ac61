use super::MpTool;
use mp_core::git::Git;
use mp_core::piece::CleanupOptions;
use std::path::Path;

pub struct PieceCleanupTool;

impl MpTool for PieceCleanupTool {
    fn name(&self) -> &str {
        "piece_cleanup"
    }

    fn description(&self) -> &str {
        "Find pieces whose branches are already merged and remove their worktrees and sessions, advancing linked issues to done."
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "dry_run": {
                    "type": "boolean",
                    "description": "Only report candidates, mutate nothing"
                },
                "main_branch": {
                    "type": "string",
                    "description": "Main branch name (default: main)"
                }
            }
        })
    }

    fn call(&self, args: serde_json::Value, work_dir: &Path) -> Result<serde_json::Value, String> {
        let (deps, engine) = super::make_engine()?;
        let repo_root = Git::new(deps.exec.clone())
            .main_repo_root(work_dir)
            .map_err(|_| "not in a git repository".to_string())?;

        let opts = CleanupOptions {
            dry_run: args.get("dry_run").and_then(|v| v.as_bool()).unwrap_or(false),
            force: false,
            main_branch: super::arg_str(&args, "main_branch").unwrap_or_else(|| "main".to_string()),
        };
        let results = engine
            .cleanup_merged_pieces(&repo_root, &opts)
            .map_err(|e| e.to_string())?;
        serde_json::to_value(results).map_err(|e| e.to_string())
    }
}
