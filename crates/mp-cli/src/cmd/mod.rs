use std::sync::Arc;

use mp_core::exec::SystemExec;
use mp_core::fsio::OsFs;
use mp_core::report::{JsonReport, Report, TextReport};
use mp_core::Deps;

pub mod init;
pub mod issue;
pub mod mcp;
pub mod piece;
pub mod pr;

/// Real capability ports for a CLI invocation.
pub fn make_deps(json: bool) -> Deps {
    let report: Arc<dyn Report> = if json {
        Arc::new(JsonReport)
    } else {
        Arc::new(TextReport)
    };
    Deps::new(Arc::new(OsFs), Arc::new(SystemExec), report)
}

pub fn work_dir() -> anyhow::Result<std::path::PathBuf> {
    Ok(std::env::current_dir()?)
}
