//! `cairo-prof profile`: one trace, one profile, one graph.

use clap::Args;

use std::path::{Path, PathBuf};

use crate::{
    Clock, Config, Metric, Mode, Pipeline, PipelineSettings, ProcessRunner, RunReport, RunRequest,
};

#[derive(Debug, Clone, Args)]
pub struct ProfileArgs {
    /// Workload runner that produces the trace.
    #[arg(long)]
    pub mode: Mode,
    /// Scarb package to run.
    #[arg(long)]
    pub package: String,
    /// Human label used in artifact names.
    #[arg(long)]
    pub name: String,
    /// Test-name filter (snforge mode).
    #[arg(long)]
    pub test: Option<String>,
    /// Executable target name (scarb mode).
    #[arg(long)]
    pub executable: Option<String>,
    /// Arguments file forwarded to `scarb execute` (scarb mode).
    #[arg(long = "args-file")]
    pub args_file: Option<PathBuf>,
    #[arg(long, default_value = "steps")]
    pub metric: Metric,
    /// Output directory for artifacts (defaults to `output_dir` from config).
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Hide graph nodes below this fraction of the total.
    #[arg(long = "nodefraction", allow_negative_numbers = true)]
    pub node_fraction: Option<f64>,
    /// Hide graph edges below this fraction of the total.
    #[arg(long = "edgefraction", allow_negative_numbers = true)]
    pub edge_fraction: Option<f64>,
}

pub fn profile_command(
    config: &Config,
    workspace: &Path,
    args: &ProfileArgs,
    runner: &dyn ProcessRunner,
    clock: &dyn Clock,
) -> RunReport {
    let request = match RunRequest::resolve(args, config) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!("rejected request: {err}");
            return RunReport::rejected(&err);
        }
    };
    tracing::debug!(?request, "resolved request");

    let settings = PipelineSettings::from_config(config, workspace);
    Pipeline::new(runner, clock, settings).run(&request)
}
