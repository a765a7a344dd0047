//! Profile rendering via `pprof -png`.

use std::path::PathBuf;

use crate::pipeline::{PipelineSettings, Profile, Stage, require_tool};
use crate::{ArtifactKind, ArtifactNamer, Invocation, ProcessRunner, ProfError, ProfResult};

pub fn export(
    runner: &dyn ProcessRunner,
    settings: &PipelineSettings,
    profile: &Profile,
    namer: &ArtifactNamer,
    node_fraction: f64,
    edge_fraction: f64,
) -> ProfResult<PathBuf> {
    let tools = &settings.tools;
    require_tool(runner, &tools.pprof)?;
    // pprof shells out to graphviz for layout; catch its absence before rendering.
    require_tool(runner, &tools.dot)?;

    let staged = namer.stage(ArtifactKind::Graph);
    let inv = Invocation::new(&tools.pprof, &settings.workspace, settings.timeouts.export())
        .arg("-png")
        .arg(format!("-sample_index={}", profile.metric().sample_index()))
        .arg(format!("-nodefraction={node_fraction}"))
        .arg(format!("-edgefraction={edge_fraction}"))
        .arg("-output")
        .arg(staged.path().to_string_lossy())
        .arg(profile.path().to_string_lossy());

    tracing::info!(stage = "export", "running {}", inv.command_line());
    let output = runner
        .run(&inv)
        .map_err(|err| Stage::Export.process_error(err))?;
    if !output.success() && mentions_missing_layout_engine(&output.stderr) {
        return Err(ProfError::ToolMissing {
            tool: tools.dot.clone(),
            detail: output.stderr_tail(),
        });
    }
    Stage::Export.check_exit(&inv, &output)?;

    if !staged.exists() {
        return Err(Stage::Export.failed(
            format!("`{}` exited 0 but wrote no image", tools.pprof),
            output.stderr_tail(),
        ));
    }
    let path = staged.finalize().map_err(|err| {
        Stage::Export.failed(format!("failed to finalize graph: {err}"), String::new())
    })?;
    tracing::info!(stage = "export", "wrote {}", path.display());
    Ok(path)
}

fn mentions_missing_layout_engine(stderr: &str) -> bool {
    let s = stderr.to_ascii_lowercase();
    s.contains("could not execute dot")
        || s.contains("failed to execute dot")
        || (s.contains("dot") && s.contains("executable file not found"))
}
