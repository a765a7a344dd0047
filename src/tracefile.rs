//! Execution traces left behind by the workload runners, and the freshness
//! check that keeps a previous run's trace from being profiled again.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::{ProfError, ProfResult};

/// `scarb execute` writes every run into a new `execution<N>` directory.
pub const EXECUTION_DIR_PREFIX: &str = "execution";

/// Which trace files in the runner's output directory this invocation owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceScope {
    /// snforge names each trace after the test that produced it, so the file
    /// stem contains the test filter.
    Test { filter: String },
    /// The trace must sit inside an execution directory created during this run.
    Execution,
}

/// A trace produced by the runner during this invocation.
#[derive(Debug, Clone)]
pub struct Trace {
    path: PathBuf,
    command_started_at: SystemTime,
    modified_at: SystemTime,
}

impl Trace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn command_started_at(&self) -> SystemTime {
        self.command_started_at
    }

    pub fn modified_at(&self) -> SystemTime {
        self.modified_at
    }
}

/// Remembers when the producing command started. Only trace files modified
/// strictly after that instant belong to this invocation.
#[derive(Debug, Clone, Copy)]
pub struct StalenessGuard {
    started_at: SystemTime,
}

impl StalenessGuard {
    /// Arm immediately before spawning the runner.
    pub fn arm() -> Self {
        Self {
            started_at: SystemTime::now(),
        }
    }

    pub fn armed_at(started_at: SystemTime) -> Self {
        Self { started_at }
    }

    pub fn is_fresh(&self, modified_at: SystemTime) -> bool {
        modified_at > self.started_at
    }

    /// Drop candidates that belong to some other invocation sharing the
    /// runner's trace directory.
    pub fn scope(&self, scope: &TraceScope, root: &Path, candidates: Vec<PathBuf>) -> Vec<PathBuf> {
        candidates
            .into_iter()
            .filter(|path| {
                let owned = match scope {
                    TraceScope::Test { filter } => path
                        .file_stem()
                        .is_some_and(|stem| stem.to_string_lossy().contains(filter.as_str())),
                    TraceScope::Execution => self.in_fresh_execution_dir(root, path),
                };
                if !owned {
                    tracing::debug!("ignoring foreign trace {}", path.display());
                }
                owned
            })
            .collect()
    }

    fn in_fresh_execution_dir(&self, root: &Path, path: &Path) -> bool {
        let Ok(rel) = path.strip_prefix(root) else {
            return false;
        };
        let mut components = rel.components();
        let (Some(dir), Some(_)) = (components.next(), components.next()) else {
            return false;
        };
        if !dir.as_os_str().to_string_lossy().starts_with(EXECUTION_DIR_PREFIX) {
            return false;
        }
        std::fs::metadata(root.join(dir))
            .and_then(|meta| meta.modified())
            .is_ok_and(|modified| self.is_fresh(modified))
    }

    /// Pick the newest fresh trace among `candidates`.
    ///
    /// `search_root` only feeds the error message.
    pub fn select(&self, search_root: &Path, candidates: &[PathBuf]) -> ProfResult<Trace> {
        let mut fresh: Vec<(SystemTime, &PathBuf)> = Vec::new();
        for path in candidates {
            let modified = std::fs::metadata(path)?.modified()?;
            if self.is_fresh(modified) {
                fresh.push((modified, path));
            } else {
                tracing::debug!("ignoring stale trace {}", path.display());
            }
        }

        if fresh.len() > 1 {
            tracing::warn!(
                "{} fresh traces under {}; profiling the newest",
                fresh.len(),
                search_root.display()
            );
        }

        let newest = fresh
            .into_iter()
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

        match newest {
            Some((modified_at, path)) => Ok(Trace {
                path: path.clone(),
                command_started_at: self.started_at,
                modified_at,
            }),
            None if candidates.is_empty() => Err(ProfError::TraceNotFound(format!(
                "the runner produced no trace under {} (no matching test passed?)",
                search_root.display()
            ))),
            None => Err(ProfError::TraceNotFound(format!(
                "{} trace file(s) under {} predate this run; the runner did not produce a new one",
                candidates.len(),
                search_root.display()
            ))),
        }
    }
}

/// List `*.json` trace files under `root`. A missing directory yields none.
pub fn find_trace_candidates(root: &Path, recursive: bool) -> ProfResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut out = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(max_depth).follow_links(false) {
        let entry = entry.map_err(|e| {
            let msg = e.to_string();
            ProfError::Io(e.into_io_error().unwrap_or_else(|| std::io::Error::other(msg)))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_json = entry
            .path()
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.eq_ignore_ascii_case("json"));
        if is_json {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{temp_dir, write_with_mtime};
    use std::time::Duration;

    #[test]
    fn finds_json_files_flat_or_recursive() {
        let dir = temp_dir("trace-find");
        std::fs::write(dir.join("a.json"), b"{}").expect("write");
        std::fs::write(dir.join("notes.txt"), b"x").expect("write");
        std::fs::create_dir_all(dir.join("execution1")).expect("mkdir");
        std::fs::write(dir.join("execution1").join("trace.json"), b"{}").expect("write");

        let flat = find_trace_candidates(&dir, false).expect("flat");
        assert_eq!(flat, vec![dir.join("a.json")]);

        let deep = find_trace_candidates(&dir, true).expect("deep");
        assert_eq!(deep.len(), 2);

        let missing = find_trace_candidates(&dir.join("nope"), true).expect("missing");
        assert!(missing.is_empty());
    }

    #[test]
    fn stale_traces_are_rejected() {
        let dir = temp_dir("trace-stale");
        let now = SystemTime::now();
        let old = dir.join("old.json");
        write_with_mtime(&old, b"{}", now - Duration::from_secs(3600));

        let guard = StalenessGuard::armed_at(now);
        let err = guard.select(&dir, &[old]).expect_err("must be stale");
        match err {
            ProfError::TraceNotFound(msg) => assert!(msg.contains("predate"), "{msg}"),
            other => panic!("expected trace-not-found, got {other:?}"),
        }
    }

    #[test]
    fn trace_with_same_mtime_as_start_is_stale() {
        let dir = temp_dir("trace-equal");
        let now = SystemTime::now();
        let p = dir.join("t.json");
        write_with_mtime(&p, b"{}", now);
        assert!(StalenessGuard::armed_at(now).select(&dir, &[p]).is_err());
    }

    #[test]
    fn no_candidates_is_trace_not_found() {
        let dir = temp_dir("trace-none");
        let err = StalenessGuard::arm().select(&dir, &[]).expect_err("must fail");
        assert_eq!(err.outcome(), crate::ExitOutcome::TraceNotFound);
        assert!(err.to_string().contains("no trace"), "{err}");
    }

    #[test]
    fn newest_fresh_trace_wins_over_stale_and_older_fresh() {
        let dir = temp_dir("trace-newest");
        let now = SystemTime::now();
        let stale = dir.join("stale.json");
        let fresh_a = dir.join("a.json");
        let fresh_b = dir.join("b.json");
        write_with_mtime(&stale, b"{}", now - Duration::from_secs(60));
        write_with_mtime(&fresh_a, b"{}", now + Duration::from_secs(1));
        write_with_mtime(&fresh_b, b"{}", now + Duration::from_secs(2));

        let guard = StalenessGuard::armed_at(now);
        let trace = guard
            .select(&dir, &[stale, fresh_a, fresh_b.clone()])
            .expect("fresh trace");
        assert_eq!(trace.path(), fresh_b.as_path());
        assert_eq!(trace.command_started_at(), now);
        assert!(trace.modified_at() > now);
    }

    #[test]
    fn test_scope_keeps_traces_named_after_the_filter() {
        let dir = temp_dir("trace-scope");
        let guard = StalenessGuard::arm();
        let kept = guard.scope(
            &TraceScope::Test {
                filter: "test_deposit".to_string(),
            },
            &dir,
            vec![
                dir.join("vault::tests::test_deposit.json"),
                dir.join("vault::tests::test_withdraw.json"),
                dir.join("vault::tests::test_deposit_twice.json"),
            ],
        );
        assert_eq!(
            kept,
            vec![
                dir.join("vault::tests::test_deposit.json"),
                dir.join("vault::tests::test_deposit_twice.json"),
            ]
        );
    }

    #[test]
    fn execution_scope_ignores_files_outside_execution_dirs() {
        let root = temp_dir("trace-scope-exec");
        let loose = root.join("trace.json");
        write_with_mtime(&loose, b"{}", SystemTime::now() + Duration::from_secs(5));
        let guard = StalenessGuard::arm();
        assert!(guard.scope(&TraceScope::Execution, &root, vec![loose]).is_empty());
    }
}
