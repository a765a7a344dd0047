//! Trace to pprof profile conversion via `cairo-profiler`.

use std::path::{Path, PathBuf};

use crate::pipeline::{PipelineSettings, Stage, require_tool};
use crate::{ArtifactKind, ArtifactNamer, Invocation, Metric, ProcessRunner, ProfResult, Trace};

/// A finalized `.pb.gz` profile.
#[derive(Debug, Clone)]
pub struct Profile {
    path: PathBuf,
    metric: Metric,
}

impl Profile {
    #[cfg(test)]
    pub(crate) fn new_for_test(path: PathBuf, metric: Metric) -> Self {
        Self { path, metric }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Fixed by the metric alone.
    pub fn samples(&self) -> &'static [&'static str] {
        self.metric.samples()
    }
}

pub fn build(
    runner: &dyn ProcessRunner,
    settings: &PipelineSettings,
    trace: &Trace,
    namer: &ArtifactNamer,
    metric: Metric,
) -> ProfResult<Profile> {
    let tool = &settings.tools.cairo_profiler;
    require_tool(runner, tool)?;

    let staged = namer.stage(ArtifactKind::Profile);
    let inv = Invocation::new(tool, &settings.workspace, settings.timeouts.profiler())
        .arg("build-profile")
        .arg(trace.path().to_string_lossy())
        .arg("--output-path")
        .arg(staged.path().to_string_lossy())
        .arg("--show-libfuncs")
        .arg("--show-inlined-functions");

    tracing::info!(stage = "profile", "running {}", inv.command_line());
    let output = runner
        .run(&inv)
        .map_err(|err| Stage::Profiler.process_error(err))?;
    Stage::Profiler.check_exit(&inv, &output)?;

    if !staged.exists() {
        return Err(Stage::Profiler.failed(
            format!("`{tool}` exited 0 but wrote no profile"),
            output.stderr_tail(),
        ));
    }
    // The graph of an earlier run under this key would not match the new profile.
    namer.retire(ArtifactKind::Graph).map_err(|err| {
        Stage::Profiler.failed(format!("failed to remove superseded graph: {err}"), String::new())
    })?;
    let path = staged.finalize().map_err(|err| {
        Stage::Profiler.failed(format!("failed to finalize profile: {err}"), String::new())
    })?;
    tracing::info!(stage = "profile", "wrote {}", path.display());

    Ok(Profile { path, metric })
}
