//! Crate-wide error types.

use thiserror::Error;

use crate::ExitOutcome;

pub type ProfResult<T> = Result<T, ProfError>;

#[derive(Debug, Error)]
pub enum ProfError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("time format error: {0}")]
    TimeFormat(#[from] time::error::Format),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("workload runner failed: {message}")]
    RunnerFailed { message: String, stderr_tail: String },

    #[error("trace not found: {0}")]
    TraceNotFound(String),

    #[error("profile conversion failed: {message}")]
    ProfilerFailed { message: String, stderr_tail: String },

    #[error("graph export failed: {message}")]
    ExportFailed { message: String, stderr_tail: String },

    #[error("required tool `{tool}` is missing: {detail}")]
    ToolMissing { tool: String, detail: String },
}

impl ProfError {
    pub fn outcome(&self) -> ExitOutcome {
        match self {
            Self::Config(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Toml(_)
            | Self::TimeFormat(_)
            | Self::InvalidArgument(_) => ExitOutcome::ArgumentError,
            Self::RunnerFailed { .. } => ExitOutcome::RunnerFailed,
            Self::TraceNotFound(_) => ExitOutcome::TraceNotFound,
            Self::ProfilerFailed { .. } => ExitOutcome::ProfilerFailed,
            Self::ExportFailed { .. } => ExitOutcome::ExportFailed,
            Self::ToolMissing { .. } => ExitOutcome::ToolMissing,
        }
    }

    /// Captured tail of the failing tool's stderr, when a tool produced one.
    pub fn stderr_tail(&self) -> Option<&str> {
        match self {
            Self::RunnerFailed { stderr_tail, .. }
            | Self::ProfilerFailed { stderr_tail, .. }
            | Self::ExportFailed { stderr_tail, .. } => {
                Some(stderr_tail.as_str()).filter(|s| !s.is_empty())
            }
            _ => None,
        }
    }
}
