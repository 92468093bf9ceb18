//! Input safety layer: target scope enforcement and argument sanitization.
//!
//! Every caller-supplied value passes through here before any subprocess is
//! considered. Failures carry enough context to build a typed error output.

pub mod args;
pub mod target;

use std::collections::HashMap;

/// A rejected input. Carried up into `ToolOutput` as a `validation_error`.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
    pub recovery_suggestion: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, recovery: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            recovery_suggestion: recovery.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}
