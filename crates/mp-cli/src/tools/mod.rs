use std::path::Path;
use std::sync::Arc;

use mp_core::exec::SystemExec;
use mp_core::fsio::OsFs;
use mp_core::piece::PieceEngine;
use mp_core::report::TextReport;
use mp_core::Deps;

pub mod issue_create;
pub mod piece_cleanup;
pub mod piece_from_issue;
pub mod piece_merge;
pub mod piece_new;
pub mod piece_status;
pub mod piece_update;
pub mod pr_create;

pub trait MpTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> serde_json::Value;
    fn call(&self, args: serde_json::Value, work_dir: &Path) -> Result<serde_json::Value, String>;
}

pub fn all_tools() -> Vec<Box<dyn MpTool>> {
    vec![
        Box::new(piece_status::PieceStatusTool),
        Box::new(piece_new::PieceNewTool),
        Box::new(piece_from_issue::PieceFromIssueTool),
        Box::new(piece_update::PieceUpdateTool),
        Box::new(piece_merge::PieceMergeTool),
        Box::new(piece_cleanup::PieceCleanupTool),
        Box::new(issue_create::IssueCreateTool),
        Box::new(pr_create::PrCreateTool),
    ]
}

/// Real ports for a tool invocation. Progress messages go to stderr,
/// which MCP clients treat as the log channel.
pub(crate) fn make_deps() -> Deps {
    Deps::new(Arc::new(OsFs), Arc::new(SystemExec), Arc::new(TextReport))
}

pub(crate) fn make_engine() -> Result<(Deps, PieceEngine), String> {
    let deps = make_deps();
    let engine = PieceEngine::new(deps.clone()).map_err(|e| e.to_string())?;
    Ok((deps, engine))
}

pub(crate) fn arg_str(args: &serde_json::Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}
