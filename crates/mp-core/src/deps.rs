use std::sync::Arc;

use crate::exec::Exec;
use crate::fsio::Fs;
use crate::report::Report;

/// Injectable capability ports. Handlers receive one of these instead of
/// reaching for globals, so the same code runs against the real system
/// and against the deterministic fakes.
#[derive(Clone)]
pub struct Deps {
    pub fs: Arc<dyn Fs>,
    pub exec: Arc<dyn Exec>,
    pub report: Arc<dyn Report>,
}

impl Deps {
    pub fn new(fs: Arc<dyn Fs>, exec: Arc<dyn Exec>, report: Arc<dyn Report>) -> Self {
        Self { fs, exec, report }
    }
}
