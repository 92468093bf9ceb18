use thiserror::Error;

/// Typed error hierarchy for scangate.
///
/// Used at module boundaries (config validation, server startup, transport
/// setup). Internal/leaf functions continue using `anyhow::Result` — the
/// `Internal` variant allows seamless conversion via the `?` operator.
///
/// Tool-call failures never surface through this type: every execution path
/// yields a `ToolOutput` with `error_type` set instead.
#[derive(Debug, Error)]
pub enum ScangateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ScangateError {
    /// Process exit code for a fatal error, per the CLI contract:
    /// 2 for invalid configuration, 1 for anything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Startup(_) | Self::Transport(_) | Self::Internal(_) => 1,
        }
    }
}
