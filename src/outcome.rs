//! Terminal outcomes and their process exit codes.

use serde::{Deserialize, Serialize};

/// Closed set of ways an invocation can end.
///
/// The integer bound to each variant is part of the CLI contract; scripts
/// branch on it, so the table never changes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitOutcome {
    Success,
    ArgumentError,
    RunnerFailed,
    TraceNotFound,
    ProfilerFailed,
    ExportFailed,
    ToolMissing,
}

impl ExitOutcome {
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::ArgumentError => 1,
            Self::RunnerFailed => 2,
            Self::TraceNotFound => 3,
            Self::ProfilerFailed => 4,
            Self::ExportFailed => 5,
            Self::ToolMissing => 6,
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ArgumentError => "argument-error",
            Self::RunnerFailed => "runner-failed",
            Self::TraceNotFound => "trace-not-found",
            Self::ProfilerFailed => "profiler-failed",
            Self::ExportFailed => "export-failed",
            Self::ToolMissing => "tool-missing",
        }
    }
}

impl From<ExitOutcome> for std::process::ExitCode {
    fn from(outcome: ExitOutcome) -> Self {
        std::process::ExitCode::from(outcome.code())
    }
}
