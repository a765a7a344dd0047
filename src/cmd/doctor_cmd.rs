//! `cairo-prof doctor`: which external tools resolve on this host.

use serde::{Deserialize, Serialize};

use std::path::PathBuf;

use crate::{Config, ProcessRunner};

pub const DOCTOR_SCHEMA_VERSION: &str = "cairo_prof.doctor.v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCheck {
    /// Role in the pipeline (`snforge`, `layout engine`, ...).
    pub name: String,
    pub program: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<PathBuf>,
    /// Needed by every profile run, not just one mode.
    pub required: bool,
}

impl ToolCheck {
    pub fn found(&self) -> bool {
        self.resolved.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorReport {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    pub tools: Vec<ToolCheck>,
    /// True when every required tool resolves and at least one runner does.
    pub ok: bool,
}

pub fn doctor_command(config: &Config, runner: &dyn ProcessRunner) -> DoctorReport {
    let tools = &config.tools;
    let wanted = [
        ("snforge", &tools.snforge, false),
        ("scarb", &tools.scarb, false),
        ("cairo-profiler", &tools.cairo_profiler, true),
        ("pprof", &tools.pprof, true),
        ("layout engine", &tools.dot, true),
        ("git", &tools.git, false),
    ];
    let checks: Vec<ToolCheck> = wanted
        .into_iter()
        .map(|(name, program, required)| {
            let resolved = runner.locate(program);
            if resolved.is_none() {
                tracing::debug!("{name}: `{program}` not found on PATH");
            }
            ToolCheck {
                name: name.to_string(),
                program: program.clone(),
                resolved,
                required,
            }
        })
        .collect();

    let required_ok = checks.iter().filter(|c| c.required).all(ToolCheck::found);
    let runner_ok = checks
        .iter()
        .any(|c| (c.name == "snforge" || c.name == "scarb") && c.found());

    DoctorReport {
        schema_version: DOCTOR_SCHEMA_VERSION.to_string(),
        tools: checks,
        ok: required_ok && runner_ok,
    }
}
