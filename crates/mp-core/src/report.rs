//! Output sink for engine messages.
//!
//! Warnings are a side channel: they flow through `Report` and never
//! change a function's return value. The CLI installs a text or JSON
//! sink; tests install `BufferReport` and assert on captured messages.

use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Success => "success",
            Level::Warning => "warning",
            Level::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub level: Level,
    #[serde(rename = "message")]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Message {
    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Level::Info, text)
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(Level::Success, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(Level::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Level::Error, text)
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    fn new(level: Level, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            data: None,
        }
    }
}

pub trait Report: Send + Sync {
    fn emit(&self, msg: Message);
}

// ---------------------------------------------------------------------------
// TextReport
// ---------------------------------------------------------------------------

/// Human-readable sink: one prefixed line per message on stderr.
pub struct TextReport;

impl Report for TextReport {
    fn emit(&self, msg: Message) {
        let prefix = match msg.level {
            Level::Info => "",
            Level::Success => "✓ ",
            Level::Warning => "⚠ ",
            Level::Error => "✗ ",
        };
        let stderr = std::io::stderr();
        let mut out = stderr.lock();
        let _ = writeln!(out, "{prefix}{}", msg.text);
    }
}

// ---------------------------------------------------------------------------
// JsonReport
// ---------------------------------------------------------------------------

/// Structured sink: one JSON object per message on stderr, so stdout
/// stays reserved for operation results.
pub struct JsonReport;

impl Report for JsonReport {
    fn emit(&self, msg: Message) {
        if let Ok(line) = serde_json::to_string(&msg) {
            let stderr = std::io::stderr();
            let mut out = stderr.lock();
            let _ = writeln!(out, "{line}");
        }
    }
}

// ---------------------------------------------------------------------------
// BufferReport
// ---------------------------------------------------------------------------

/// Test sink that captures everything.
#[derive(Default)]
pub struct BufferReport {
    messages: Mutex<Vec<Message>>,
}

impl BufferReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    pub fn has_level(&self, level: Level) -> bool {
        self.messages.lock().unwrap().iter().any(|m| m.level == level)
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.level == level && m.text.contains(needle))
    }
}

impl Report for BufferReport {
    fn emit(&self, msg: Message) {
        self.messages.lock().unwrap().push(msg);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
