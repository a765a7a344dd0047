//! The profiling pipeline: trace, profile, name, render, report.
//!
//! Stages run strictly in order and each communicates failure as a
//! `ProfError`; only the binary turns the final outcome into an exit code.

mod export_stage;
mod profile_stage;
mod trace_stage;

pub use export_stage::export;
pub use profile_stage::{Profile, build};
pub use trace_stage::{ProducedTrace, RunnerPlan, plan, produce};

use serde::Serialize;

use std::path::{Path, PathBuf};

use crate::{
    ArtifactKey, ArtifactNamer, Clock, Config, ExitOutcome, Invocation, Metric,
    ProcessError, ProcessOutput, ProcessRunner, ProfError, ProfResult, RunRequest, TimeoutsConfig,
    ToolsConfig, TracesConfig, source_revision,
};

/// Everything the stages need besides the request itself.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Working directory of the Scarb project being profiled.
    pub workspace: PathBuf,
    pub tools: ToolsConfig,
    pub timeouts: TimeoutsConfig,
    pub traces: TracesConfig,
}

impl PipelineSettings {
    pub fn from_config(config: &Config, workspace: &Path) -> Self {
        Self {
            workspace: std::path::absolute(workspace).unwrap_or_else(|_| workspace.to_path_buf()),
            tools: config.tools.clone(),
            timeouts: config.timeouts.clone(),
            traces: config.traces.clone(),
        }
    }
}

/// Failure kind of the stage currently talking to a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Runner,
    Profiler,
    Export,
}

impl Stage {
    pub(crate) fn failed(self, message: String, stderr_tail: String) -> ProfError {
        match self {
            Self::Runner => ProfError::RunnerFailed {
                message,
                stderr_tail,
            },
            Self::Profiler => ProfError::ProfilerFailed {
                message,
                stderr_tail,
            },
            Self::Export => ProfError::ExportFailed {
                message,
                stderr_tail,
            },
        }
    }

    /// Spawn failures: a missing program is tool-missing, the rest (timeouts
    /// included) are this stage's ordinary failure.
    pub(crate) fn process_error(self, err: ProcessError) -> ProfError {
        match err {
            ProcessError::NotFound { program } => ProfError::ToolMissing {
                detail: format!("`{program}` could not be spawned"),
                tool: program,
            },
            other => self.failed(other.to_string(), String::new()),
        }
    }

    pub(crate) fn check_exit(self, inv: &Invocation, output: &ProcessOutput) -> ProfResult<()> {
        if output.success() {
            return Ok(());
        }
        if output.command_not_found() {
            return Err(ProfError::ToolMissing {
                tool: inv.program.clone(),
                detail: output.stderr_tail(),
            });
        }
        Err(self.failed(
            format!("`{}` failed with {}", inv.command_line(), output.status_text()),
            output.stderr_tail(),
        ))
    }
}

/// Pre-flight lookup of an external program.
pub(crate) fn require_tool(runner: &dyn ProcessRunner, program: &str) -> ProfResult<PathBuf> {
    runner.locate(program).ok_or_else(|| ProfError::ToolMissing {
        tool: program.to_string(),
        detail: "not found on PATH".to_string(),
    })
}

/// What one invocation did, success or not.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: ExitOutcome,
    pub code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "tracePath", skip_serializing_if = "Option::is_none")]
    pub trace_path: Option<PathBuf>,
    #[serde(rename = "profilePath", skip_serializing_if = "Option::is_none")]
    pub profile_path: Option<PathBuf>,
    #[serde(rename = "graphPath", skip_serializing_if = "Option::is_none")]
    pub graph_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<String>,
    #[serde(rename = "resourceSummary", skip_serializing_if = "Option::is_none")]
    pub resource_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "stderrTail", skip_serializing_if = "Option::is_none")]
    pub stderr_tail: Option<String>,
}

impl RunReport {
    fn pending(metric: Metric) -> Self {
        Self {
            outcome: ExitOutcome::Success,
            code: ExitOutcome::Success.code(),
            metric: Some(metric),
            key: None,
            trace_path: None,
            profile_path: None,
            graph_path: None,
            samples: Vec::new(),
            resource_summary: None,
            error: None,
            stderr_tail: None,
        }
    }

    /// Report for a request that never reached the pipeline.
    pub fn rejected(err: &ProfError) -> Self {
        let mut report = Self::pending(Metric::Steps);
        report.metric = None;
        report.record_failure(err);
        report
    }

    fn record_failure(&mut self, err: &ProfError) {
        self.outcome = err.outcome();
        self.code = self.outcome.code();
        self.error = Some(err.to_string());
        self.stderr_tail = err.stderr_tail().map(str::to_string);
    }
}

pub struct Pipeline<'a> {
    runner: &'a dyn ProcessRunner,
    clock: &'a dyn Clock,
    settings: PipelineSettings,
}

impl<'a> Pipeline<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, clock: &'a dyn Clock, settings: PipelineSettings) -> Self {
        Self {
            runner,
            clock,
            settings,
        }
    }

    pub fn run(&self, request: &RunRequest) -> RunReport {
        let mut report = RunReport::pending(request.metric);
        if let Err(err) = self.execute(request, &mut report) {
            tracing::warn!(outcome = err.outcome().label(), "{err}");
            report.record_failure(&err);
        }
        report
    }

    fn execute(&self, request: &RunRequest, report: &mut RunReport) -> ProfResult<()> {
        // A bad output directory is a configuration error; report it before
        // any tool has run.
        std::fs::create_dir_all(&request.output_dir).map_err(|err| {
            ProfError::Config(format!(
                "cannot create output directory {}: {err}",
                request.output_dir.display()
            ))
        })?;

        let produced = produce(self.runner, &self.settings, request)?;
        report.trace_path = Some(produced.trace.path().to_path_buf());
        report.resource_summary = produced.resource_summary.clone();

        // One key per invocation, fixed before anything is written.
        let revision = source_revision(
            self.runner,
            &self.settings.tools.git,
            &self.settings.workspace,
            self.settings.timeouts.revision(),
        );
        let key = ArtifactKey::new(
            self.clock.now_utc(),
            &request.package,
            &request.label,
            request.metric,
            &revision,
        )?;
        report.key = Some(key.to_string());
        let namer = ArtifactNamer::new(&request.output_dir, key);

        let profile = build(
            self.runner,
            &self.settings,
            &produced.trace,
            &namer,
            request.metric,
        )?;
        report.profile_path = Some(profile.path().to_path_buf());
        report.samples = profile.samples().iter().map(|s| s.to_string()).collect();

        let graph = export(
            self.runner,
            &self.settings,
            &profile,
            &namer,
            request.node_fraction,
            request.edge_fraction,
        )?;
        report.graph_path = Some(graph);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRunner, temp_dir, write_fresh, write_output_after, write_with_mtime};
    use crate::{RunMode, SystemClock};
    use std::cell::Cell;
    use std::time::{Duration, SystemTime};
    use time::OffsetDateTime;
    use time::macros::datetime;

    struct FixedClock(Cell<OffsetDateTime>);

    impl Clock for FixedClock {
        fn now_utc(&self) -> OffsetDateTime {
            self.0.get()
        }
    }

    fn request(ws: &Path, metric: Metric) -> RunRequest {
        RunRequest {
            package: "vault".to_string(),
            label: "deposit".to_string(),
            metric,
            output_dir: ws.join("profiles"),
            node_fraction: 0.005,
            edge_fraction: 0.001,
            mode: RunMode::Test {
                filter: "test_deposit".to_string(),
            },
        }
    }

    /// All four tools behave; snforge writes one passing test's trace.
    fn happy_runner(ws: &Path) -> FakeRunner {
        let trace = ws.join("snfoundry_trace").join("vault_test_deposit.json");
        FakeRunner::new()
            .on("snforge", move |_| {
                write_fresh(&trace, b"{}");
                FakeRunner::exit(0, "Tests: 1 passed", "")
            })
            .on("git", |_| FakeRunner::exit(0, "abc1234\n", ""))
            .on("cairo-profiler", |inv| {
                write_output_after(inv, "--output-path", b"\x1f\x8bprofile")
            })
            .on("pprof", |inv| write_output_after(inv, "-output", b"\x89PNG"))
            .install("dot")
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    #[test]
    fn single_passing_test_yields_one_artifact_pair() {
        let ws = temp_dir("pipeline-ok");
        let runner = happy_runner(&ws);
        let clock = FixedClock(Cell::new(datetime!(2026-10-15 09:42:10 UTC)));
        let pipeline = Pipeline::new(&runner, &clock, PipelineSettings::from_config(&Config::default(), &ws));

        let report = pipeline.run(&request(&ws, Metric::Steps));
        assert_eq!(report.outcome, ExitOutcome::Success, "{:?}", report.error);
        assert_eq!(report.code, 0);
        let key = "20261015-0942_vault_deposit_steps_abc1234";
        assert_eq!(report.key.as_deref(), Some(key));
        assert_eq!(
            listing(&ws.join("profiles")),
            vec![format!("{key}.pb.gz"), format!("{key}.png")]
        );
        assert_eq!(
            report.samples,
            vec!["steps", "calls", "range check builtin", "memory holes", "casm size"]
        );
    }

    #[test]
    fn sierra_gas_profile_exposes_gas_samples() {
        let ws = temp_dir("pipeline-gas");
        let runner = happy_runner(&ws);
        let pipeline = Pipeline::new(&runner, &SystemClock, PipelineSettings::from_config(&Config::default(), &ws));
        let report = pipeline.run(&request(&ws, Metric::SierraGas));
        assert_eq!(report.outcome, ExitOutcome::Success, "{:?}", report.error);
        assert_eq!(report.samples, vec!["sierra gas", "calls", "casm size"]);
        let calls = runner.calls_to("snforge");
        let snforge = calls.first().expect("snforge call");
        assert_eq!(snforge.arg_after("--tracked-resource"), Some("sierra-gas"));
    }

    #[test]
    fn zero_passing_tests_exit_3_and_write_nothing() {
        let ws = temp_dir("pipeline-none");
        let runner = FakeRunner::new()
            .on("snforge", |_| FakeRunner::exit(0, "Tests: 0 passed", ""))
            .on("git", |_| FakeRunner::exit(0, "abc1234\n", ""))
            .on("cairo-profiler", |_| FakeRunner::exit(0, "", ""))
            .on("pprof", |_| FakeRunner::exit(0, "", ""))
            .install("dot");
        let pipeline = Pipeline::new(&runner, &SystemClock, PipelineSettings::from_config(&Config::default(), &ws));
        let report = pipeline.run(&request(&ws, Metric::Steps));
        assert_eq!(report.outcome, ExitOutcome::TraceNotFound);
        assert_eq!(report.code, 3);
        assert!(listing(&ws.join("profiles")).is_empty());
        assert!(runner.calls_to("cairo-profiler").is_empty());
    }

    #[test]
    fn stale_trace_from_previous_run_is_not_profiled() {
        let ws = temp_dir("pipeline-stale");
        write_with_mtime(
            &ws.join("snfoundry_trace").join("vault_test_deposit.json"),
            b"{}",
            SystemTime::now() - Duration::from_secs(3600),
        );
        let runner = FakeRunner::new()
            .on("snforge", |_| FakeRunner::exit(0, "", ""))
            .on("cairo-profiler", |_| FakeRunner::exit(0, "", ""));
        let pipeline = Pipeline::new(&runner, &SystemClock, PipelineSettings::from_config(&Config::default(), &ws));
        let report = pipeline.run(&request(&ws, Metric::Steps));
        assert_eq!(report.outcome, ExitOutcome::TraceNotFound);
        assert!(runner.calls_to("cairo-profiler").is_empty());
    }

    #[test]
    fn runs_a_minute_apart_produce_two_pairs() {
        let ws = temp_dir("pipeline-buckets");
        let runner = happy_runner(&ws);
        let clock = FixedClock(Cell::new(datetime!(2026-10-15 09:42:10 UTC)));
        let pipeline = Pipeline::new(&runner, &clock, PipelineSettings::from_config(&Config::default(), &ws));
        let req = request(&ws, Metric::Steps);

        let first = pipeline.run(&req);
        clock.0.set(datetime!(2026-10-15 09:43:10 UTC));
        let second = pipeline.run(&req);

        assert_ne!(first.key, second.key);
        assert_eq!(listing(&ws.join("profiles")).len(), 4);
    }

    #[test]
    fn same_bucket_rerun_supersedes_without_partials() {
        let ws = temp_dir("pipeline-supersede");
        let runner = happy_runner(&ws);
        let clock = FixedClock(Cell::new(datetime!(2026-10-15 09:42:01 UTC)));
        let pipeline = Pipeline::new(&runner, &clock, PipelineSettings::from_config(&Config::default(), &ws));
        let req = request(&ws, Metric::Steps);

        let first = pipeline.run(&req);
        clock.0.set(datetime!(2026-10-15 09:42:59 UTC));
        let second = pipeline.run(&req);

        assert_eq!(first.key, second.key);
        let names = listing(&ws.join("profiles"));
        assert_eq!(names.len(), 2, "{names:?}");
        assert!(names.iter().all(|n| !n.ends_with(".partial")));
    }

    #[test]
    fn missing_layout_engine_keeps_profile_but_no_graph() {
        let ws = temp_dir("pipeline-nodot");
        let runner = happy_runner(&ws).uninstall("dot");
        let pipeline = Pipeline::new(&runner, &SystemClock, PipelineSettings::from_config(&Config::default(), &ws));
        let report = pipeline.run(&request(&ws, Metric::Steps));

        assert_eq!(report.outcome, ExitOutcome::ToolMissing);
        assert_eq!(report.code, 6);
        let profile = report.profile_path.expect("profile kept");
        assert!(profile.is_file());
        assert!(report.graph_path.is_none());
        let names = listing(&ws.join("profiles"));
        assert_eq!(names.len(), 1, "{names:?}");
        assert!(names.iter().all(|n| n.ends_with(".pb.gz")));
    }

    #[test]
    fn export_failure_keeps_profile() {
        let ws = temp_dir("pipeline-export-fail");
        let trace = ws.join("snfoundry_trace").join("vault_test_deposit.json");
        let runner = FakeRunner::new()
            .on("snforge", move |_| {
                write_fresh(&trace, b"{}");
                FakeRunner::exit(0, "", "")
            })
            .on("cairo-profiler", |inv| write_output_after(inv, "--output-path", b"p"))
            .on("pprof", |_| FakeRunner::exit(1, "", "parsing profile: unrecognized profile format"))
            .install("dot");
        let pipeline = Pipeline::new(&runner, &SystemClock, PipelineSettings::from_config(&Config::default(), &ws));
        let report = pipeline.run(&request(&ws, Metric::Steps));

        assert_eq!(report.outcome, ExitOutcome::ExportFailed);
        assert_eq!(
            report.stderr_tail.as_deref(),
            Some("parsing profile: unrecognized profile format")
        );
        assert!(report.profile_path.expect("profile").is_file());
        // git is unavailable in this fake, so the revision falls back.
        assert!(report.key.expect("key").ends_with("_norev"));
    }

    #[test]
    fn failing_filtered_test_is_runner_failed_and_stops() {
        let ws = temp_dir("pipeline-runner-fail");
        let runner = FakeRunner::new()
            .on("snforge", |_| FakeRunner::exit(1, "", "[FAIL] test_deposit"))
            .on("cairo-profiler", |_| FakeRunner::exit(0, "", ""));
        let pipeline = Pipeline::new(&runner, &SystemClock, PipelineSettings::from_config(&Config::default(), &ws));
        let report = pipeline.run(&request(&ws, Metric::Steps));
        assert_eq!(report.code, 2);
        assert_eq!(report.stderr_tail.as_deref(), Some("[FAIL] test_deposit"));
        assert!(runner.calls_to("cairo-profiler").is_empty());
        assert!(report.key.is_none());
    }

    #[test]
    fn report_serializes_camel_case_and_skips_empty_fields() {
        let report = RunReport::rejected(&ProfError::InvalidArgument("--test missing".to_string()));
        let v = serde_json::to_value(&report).expect("json");
        assert_eq!(v.get("outcome").and_then(|v| v.as_str()), Some("argument_error"));
        assert_eq!(v.get("code").and_then(|v| v.as_u64()), Some(1));
        assert!(v.get("profilePath").is_none());
        assert!(v.get("samples").is_none());
    }

    #[test]
    fn same_bucket_rerun_with_failed_export_drops_the_earlier_graph() {
        let ws = temp_dir("pipeline-rerun-export-fail");
        let trace = ws.join("snfoundry_trace").join("vault_test_deposit.json");
        let renders = Cell::new(0u32);
        let runner = FakeRunner::new()
            .on("snforge", move |_| {
                write_fresh(&trace, b"{}");
                FakeRunner::exit(0, "", "")
            })
            .on("git", |_| FakeRunner::exit(0, "abc1234\n", ""))
            .on("cairo-profiler", |inv| write_output_after(inv, "--output-path", b"profile"))
            .on("pprof", move |inv| {
                renders.set(renders.get() + 1);
                if renders.get() == 1 {
                    write_output_after(inv, "-output", b"png-run1")
                } else {
                    FakeRunner::exit(1, "", "pprof: render failed")
                }
            })
            .install("dot");
        let clock = FixedClock(Cell::new(datetime!(2026-10-15 09:42:05 UTC)));
        let pipeline = Pipeline::new(&runner, &clock, PipelineSettings::from_config(&Config::default(), &ws));
        let req = request(&ws, Metric::Steps);

        let first = pipeline.run(&req);
        assert_eq!(first.outcome, ExitOutcome::Success, "{:?}", first.error);
        clock.0.set(datetime!(2026-10-15 09:42:50 UTC));
        let second = pipeline.run(&req);

        assert_eq!(second.outcome, ExitOutcome::ExportFailed);
        assert_eq!(first.key, second.key);
        let names = listing(&ws.join("profiles"));
        assert_eq!(names.len(), 1, "{names:?}");
        assert!(names.iter().all(|n| n.ends_with(".pb.gz")));
    }

    #[test]
    fn unusable_output_dir_fails_before_any_tool_runs() {
        let ws = temp_dir("pipeline-bad-output");
        let blocker = ws.join("profiles");
        std::fs::write(&blocker, b"not a directory").expect("write");
        let runner = happy_runner(&ws);
        let pipeline = Pipeline::new(&runner, &SystemClock, PipelineSettings::from_config(&Config::default(), &ws));
        let report = pipeline.run(&request(&ws, Metric::Steps));

        assert_eq!(report.outcome, ExitOutcome::ArgumentError);
        assert_eq!(runner.call_count(), 0);
    }
}
