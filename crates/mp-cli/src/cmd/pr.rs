use anyhow::Context;
use mp_core::github::GitHub;
use mp_core::piece::PieceEngine;
use mp_core::pr::{PrHandler, PrInput};
use mp_core::report::{Message, Report};

use crate::output::print_json;

pub fn create(
    json: bool,
    title: Option<String>,
    body: Option<String>,
    base: String,
) -> anyhow::Result<()> {
    let deps = super::make_deps(json);
    let engine =
        PieceEngine::new(deps.clone()).context("failed to resolve pieces directory")?;
    let wd = super::work_dir()?;

    if !GitHub::is_available() {
        deps.report.emit(Message::warning(
            "gh not found in PATH; PR creation will fail".to_string(),
        ));
    }

    let handler = PrHandler::new(deps, engine);
    let result = handler.create_pr(
        &wd,
        PrInput {
            title: title.unwrap_or_default(),
            body: body.unwrap_or_default(),
            base,
        },
    )?;
    print_json(&result)
}
