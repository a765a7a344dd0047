//! Profiling request resolution: CLI arguments to an immutable `RunRequest`.

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use crate::{Config, ProfError, ProfResult, ProfileArgs};

pub const DEFAULT_NODE_FRACTION: f64 = 0.005;
pub const DEFAULT_EDGE_FRACTION: f64 = 0.001;

pub const SAMPLE_STEPS: &str = "steps";
pub const SAMPLE_CALLS: &str = "calls";
pub const SAMPLE_RANGE_CHECK: &str = "range check builtin";
pub const SAMPLE_MEMORY_HOLES: &str = "memory holes";
pub const SAMPLE_CASM_SIZE: &str = "casm size";
pub const SAMPLE_SIERRA_GAS: &str = "sierra gas";
pub const SAMPLE_L2_GAS: &str = "l2 gas";

const STEPS_SAMPLES: &[&str] = &[
    SAMPLE_STEPS,
    SAMPLE_CALLS,
    SAMPLE_RANGE_CHECK,
    SAMPLE_MEMORY_HOLES,
    SAMPLE_CASM_SIZE,
];
const SIERRA_GAS_SAMPLES: &[&str] = &[SAMPLE_SIERRA_GAS, SAMPLE_CALLS, SAMPLE_CASM_SIZE];
const L2_GAS_SAMPLES: &[&str] = &[SAMPLE_L2_GAS];

/// Which workload runner produces the trace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// `snforge test`, filtered to matching tests.
    Snforge,
    /// `scarb execute` of a standalone executable.
    Scarb,
}

impl clap::ValueEnum for Mode {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Snforge, Self::Scarb]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Snforge => clap::builder::PossibleValue::new("snforge"),
            Self::Scarb => clap::builder::PossibleValue::new("scarb"),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Metric {
    Steps,
    /// Same trace and samples as `Steps`; only the rendered sample differs.
    Rc,
    SierraGas,
    L2Gas,
}

impl clap::ValueEnum for Metric {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Steps, Self::Rc, Self::SierraGas, Self::L2Gas]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

/// Resource the runner tracks while producing the trace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TrackedResource {
    CairoSteps,
    SierraGas,
}

impl TrackedResource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CairoSteps => "cairo-steps",
            Self::SierraGas => "sierra-gas",
        }
    }
}

impl Metric {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Steps => "steps",
            Self::Rc => "rc",
            Self::SierraGas => "sierra-gas",
            Self::L2Gas => "l2-gas",
        }
    }

    pub const fn tracked_resource(self) -> TrackedResource {
        match self {
            Self::Steps | Self::Rc => TrackedResource::CairoSteps,
            Self::SierraGas | Self::L2Gas => TrackedResource::SierraGas,
        }
    }

    /// Sample types present in a profile built for this metric.
    pub const fn samples(self) -> &'static [&'static str] {
        match self {
            Self::Steps | Self::Rc => STEPS_SAMPLES,
            Self::SierraGas => SIERRA_GAS_SAMPLES,
            Self::L2Gas => L2_GAS_SAMPLES,
        }
    }

    /// Sample the renderer weights nodes by.
    pub const fn sample_index(self) -> &'static str {
        match self {
            Self::Steps => SAMPLE_STEPS,
            Self::Rc => SAMPLE_RANGE_CHECK,
            Self::SierraGas => SAMPLE_SIERRA_GAS,
            Self::L2Gas => SAMPLE_L2_GAS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunMode {
    Test {
        filter: String,
    },
    Execution {
        executable: String,
        args_file: Option<PathBuf>,
    },
}

/// A validated profiling request. Built once per invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub package: String,
    pub label: String,
    pub metric: Metric,
    pub output_dir: PathBuf,
    pub node_fraction: f64,
    pub edge_fraction: f64,
    pub mode: RunMode,
}

impl RunRequest {
    /// Validate raw CLI arguments. Runs before any external tool is started.
    pub fn resolve(args: &ProfileArgs, config: &Config) -> ProfResult<Self> {
        let package = file_component("--package", &args.package)?;
        let label = file_component("--name", &args.name)?;

        let mode = match args.mode {
            Mode::Snforge => {
                if args.executable.is_some() || args.args_file.is_some() {
                    return Err(ProfError::InvalidArgument(
                        "--executable and --args-file are only valid with --mode scarb".to_string(),
                    ));
                }
                let filter = args
                    .test
                    .as_deref()
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| {
                        ProfError::InvalidArgument("--mode snforge requires --test <filter>".to_string())
                    })?;
                RunMode::Test {
                    filter: filter.to_string(),
                }
            }
            Mode::Scarb => {
                if args.test.is_some() {
                    return Err(ProfError::InvalidArgument(
                        "--test is only valid with --mode snforge".to_string(),
                    ));
                }
                if args.metric == Metric::L2Gas {
                    return Err(ProfError::InvalidArgument(
                        "--metric l2-gas needs a deployed-contract dispatch and is only available with --mode snforge"
                            .to_string(),
                    ));
                }
                let executable = args
                    .executable
                    .as_deref()
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .ok_or_else(|| {
                        ProfError::InvalidArgument(
                            "--mode scarb requires --executable <name>".to_string(),
                        )
                    })?;
                let args_file = args
                    .args_file
                    .as_deref()
                    .map(resolve_args_file)
                    .transpose()?;
                RunMode::Execution {
                    executable: executable.to_string(),
                    args_file,
                }
            }
        };

        let node_fraction = fraction("--nodefraction", args.node_fraction, DEFAULT_NODE_FRACTION)?;
        let edge_fraction = fraction("--edgefraction", args.edge_fraction, DEFAULT_EDGE_FRACTION)?;

        let output_dir = args.output.clone().unwrap_or_else(|| config.output_dir.clone());
        let output_dir = std::path::absolute(&output_dir)?;

        Ok(Self {
            package,
            label,
            metric: args.metric,
            output_dir,
            node_fraction,
            edge_fraction,
            mode,
        })
    }
}

fn fraction(flag: &str, value: Option<f64>, default: f64) -> ProfResult<f64> {
    let v = value.unwrap_or(default);
    if !v.is_finite() || v < 0.0 {
        return Err(ProfError::InvalidArgument(format!(
            "{flag} must be a non-negative number, got {v}"
        )));
    }
    Ok(v)
}

fn resolve_args_file(path: &Path) -> ProfResult<PathBuf> {
    if !path.is_file() {
        return Err(ProfError::InvalidArgument(format!(
            "--args-file {} does not exist",
            path.display()
        )));
    }
    // The runner executes inside the workspace, so hand it an absolute path.
    Ok(std::path::absolute(path)?)
}

/// Normalize a value that becomes part of an artifact file name.
fn file_component(flag: &str, raw: &str) -> ProfResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ProfError::InvalidArgument(format!("{flag} must not be empty")));
    }
    Ok(trimmed
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_whitespace() {
                '-'
            } else {
                c
            }
        })
        .collect())
}
