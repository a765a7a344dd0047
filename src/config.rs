//! `cairo-prof.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "cairo-prof.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Directory receiving `.pb.gz`/`.png` pairs when `--output` is not given.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub traces: TracesConfig,
}

/// Program names (or absolute paths) of the external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ToolsConfig {
    pub snforge: String,
    pub scarb: String,
    pub cairo_profiler: String,
    pub pprof: String,
    pub dot: String,
    pub git: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            snforge: "snforge".to_string(),
            scarb: "scarb".to_string(),
            cairo_profiler: "cairo-profiler".to_string(),
            pprof: "pprof".to_string(),
            dot: "dot".to_string(),
            git: "git".to_string(),
        }
    }
}

/// Per-stage wall-clock limits, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct TimeoutsConfig {
    pub runner_secs: u64,
    pub profiler_secs: u64,
    pub export_secs: u64,
    pub revision_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            runner_secs: 1800,
            profiler_secs: 300,
            export_secs: 120,
            revision_secs: 10,
        }
    }
}

impl TimeoutsConfig {
    pub fn runner(&self) -> Duration {
        Duration::from_secs(self.runner_secs.max(1))
    }

    pub fn profiler(&self) -> Duration {
        Duration::from_secs(self.profiler_secs.max(1))
    }

    pub fn export(&self) -> Duration {
        Duration::from_secs(self.export_secs.max(1))
    }

    pub fn revision(&self) -> Duration {
        Duration::from_secs(self.revision_secs.max(1))
    }
}

/// Where the workload runners drop their traces, relative to the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct TracesConfig {
    pub snforge_dir: PathBuf,
    /// Searched recursively under `<scarb_dir>/<package>`.
    pub scarb_dir: PathBuf,
}

impl Default for TracesConfig {
    fn default() -> Self {
        Self {
            snforge_dir: PathBuf::from("snfoundry_trace"),
            scarb_dir: PathBuf::from("target").join("execute"),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("profiles")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            tools: ToolsConfig::default(),
            timeouts: TimeoutsConfig::default(),
            traces: TracesConfig::default(),
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Strict variant used when the user names a config file explicitly.
    pub fn load(path: &Path) -> crate::ProfResult<Self> {
        let s = std::fs::read_to_string(path).map_err(|err| {
            crate::ProfError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        Ok(toml::from_str::<Config>(&s)?)
    }
}
