//! Trace production: run the workload fresh and keep only what it just wrote.

use std::path::PathBuf;

use crate::pipeline::{PipelineSettings, Stage, require_tool};
use crate::{
    Invocation, ProcessRunner, ProfResult, RunMode, RunRequest, StalenessGuard, Trace, TraceScope,
    find_trace_candidates,
};

#[derive(Debug, Clone)]
pub struct ProducedTrace {
    pub trace: Trace,
    /// `scarb execute --print-resource-usage` output, execution mode only.
    pub resource_summary: Option<String>,
}

/// Command line for the runner plus where its trace will land.
#[derive(Debug, Clone)]
pub struct RunnerPlan {
    pub invocation: Invocation,
    pub trace_root: PathBuf,
    pub recursive: bool,
    pub scope: TraceScope,
}

pub fn plan(settings: &PipelineSettings, request: &RunRequest) -> RunnerPlan {
    let tools = &settings.tools;
    let timeout = settings.timeouts.runner();
    match &request.mode {
        RunMode::Test { filter } => RunnerPlan {
            invocation: Invocation::new(&tools.snforge, &settings.workspace, timeout)
                .arg("test")
                .arg(filter)
                .arg("--package")
                .arg(&request.package)
                .arg("--save-trace-data")
                .arg("--tracked-resource")
                .arg(request.metric.tracked_resource().as_str()),
            trace_root: settings.workspace.join(&settings.traces.snforge_dir),
            recursive: false,
            scope: TraceScope::Test {
                filter: filter.clone(),
            },
        },
        RunMode::Execution {
            executable,
            args_file,
        } => {
            let mut invocation = Invocation::new(&tools.scarb, &settings.workspace, timeout)
                .arg("execute")
                .arg("--package")
                .arg(&request.package)
                .arg("--executable-name")
                .arg(executable);
            if let Some(args_file) = args_file {
                invocation = invocation
                    .arg("--arguments-file")
                    .arg(args_file.to_string_lossy());
            }
            RunnerPlan {
                invocation: invocation
                    .arg("--save-profiler-trace-data")
                    .arg("--print-resource-usage"),
                trace_root: settings
                    .workspace
                    .join(&settings.traces.scarb_dir)
                    .join(&request.package),
                recursive: true,
                scope: TraceScope::Execution,
            }
        }
    }
}

pub fn produce(
    runner: &dyn ProcessRunner,
    settings: &PipelineSettings,
    request: &RunRequest,
) -> ProfResult<ProducedTrace> {
    let plan = plan(settings, request);
    require_tool(runner, &plan.invocation.program)?;

    let guard = StalenessGuard::arm();
    tracing::info!(stage = "trace", "running {}", plan.invocation.command_line());
    let output = runner
        .run(&plan.invocation)
        .map_err(|err| Stage::Runner.process_error(err))?;
    Stage::Runner.check_exit(&plan.invocation, &output)?;

    // Exit status zero is not proof of a trace: the freshness check always runs.
    let candidates = find_trace_candidates(&plan.trace_root, plan.recursive)?;
    let candidates = guard.scope(&plan.scope, &plan.trace_root, candidates);
    let trace = guard.select(&plan.trace_root, &candidates)?;
    tracing::info!(stage = "trace", "fresh trace {}", trace.path().display());

    let resource_summary = match request.mode {
        RunMode::Execution { .. } => Some(output.stdout.trim().to_string()).filter(|s| !s.is_empty()),
        RunMode::Test { .. } => None,
    };

    Ok(ProducedTrace {
        trace,
        resource_summary,
    })
}
