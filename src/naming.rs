//! Artifact naming and atomic finalization.
//!
//! Every file written by one invocation shares a single key:
//! `<YYYYMMDD-HHMM>_<package>_<label>_<metric>_<revision>`. The key is fixed
//! before the first write, so a run that straddles a minute boundary still
//! names its profile and its graph identically.
//!
//! Files are produced under a hidden staging name in the output directory and
//! renamed onto their final name only once complete. Rename within one
//! directory is atomic, so a reader never sees a partial artifact, and a
//! second run with the same key simply replaces the first.

use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Invocation, Metric, ProcessRunner, ProfResult};

/// Used when the workspace has no resolvable git revision.
pub const UNKNOWN_REVISION: &str = "norev";

pub trait Clock {
    fn now_utc(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Profile,
    Graph,
}

impl ArtifactKind {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Profile => "pb.gz",
            Self::Graph => "png",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    pub fn new(
        at: OffsetDateTime,
        package: &str,
        label: &str,
        metric: Metric,
        revision: &str,
    ) -> ProfResult<Self> {
        let bucket = time_bucket(at)?;
        Ok(Self(format!(
            "{bucket}_{package}_{label}_{}_{revision}",
            metric.as_str()
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self, kind: ArtifactKind) -> String {
        format!("{}.{}", self.0, kind.extension())
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Minute-resolution UTC bucket, e.g. `20261015-0942`.
pub fn time_bucket(at: OffsetDateTime) -> ProfResult<String> {
    let utc = at.to_offset(time::UtcOffset::UTC);
    Ok(utc.format(format_description!("[year][month][day]-[hour][minute]"))?)
}

/// Short revision of the workspace's checked-out commit.
pub fn source_revision(
    runner: &dyn ProcessRunner,
    git: &str,
    workspace: &Path,
    timeout: Duration,
) -> String {
    let inv = Invocation::new(git, workspace, timeout)
        .arg("rev-parse")
        .arg("--short")
        .arg("HEAD");
    match runner.run(&inv) {
        Ok(out) if out.success() => {
            let rev = out.stdout.trim();
            if rev.is_empty() || !rev.chars().all(|c| c.is_ascii_alphanumeric()) {
                tracing::warn!("unexpected git revision output {rev:?}; using {UNKNOWN_REVISION}");
                UNKNOWN_REVISION.to_string()
            } else {
                rev.to_string()
            }
        }
        Ok(out) => {
            tracing::warn!(
                "git rev-parse failed ({}); using {UNKNOWN_REVISION}",
                out.status_text()
            );
            UNKNOWN_REVISION.to_string()
        }
        Err(err) => {
            tracing::warn!("{err}; using {UNKNOWN_REVISION}");
            UNKNOWN_REVISION.to_string()
        }
    }
}

/// Hands out staging files for one key in one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactNamer {
    output_dir: PathBuf,
    key: ArtifactKey,
}

impl ArtifactNamer {
    pub fn new(output_dir: &Path, key: ArtifactKey) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            key,
        }
    }

    pub fn final_path(&self, kind: ArtifactKind) -> PathBuf {
        self.output_dir.join(self.key.file_name(kind))
    }

    /// Remove a finalized artifact left under this key by an earlier run.
    pub fn retire(&self, kind: ArtifactKind) -> std::io::Result<()> {
        match std::fs::remove_file(self.final_path(kind)) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    pub fn stage(&self, kind: ArtifactKind) -> StagedFile {
        let staging = self.output_dir.join(format!(
            ".{}.{}.{}.partial",
            self.key,
            Uuid::new_v4().simple(),
            kind.extension()
        ));
        StagedFile {
            staging,
            target: self.final_path(kind),
            finalized: false,
        }
    }
}

/// A file being written under a temporary name. Removed on drop unless
/// finalized.
#[derive(Debug)]
pub struct StagedFile {
    staging: PathBuf,
    target: PathBuf,
    finalized: bool,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.staging
    }

    pub fn exists(&self) -> bool {
        self.staging.is_file()
    }

    /// Atomically move the staged file onto its final name.
    pub fn finalize(mut self) -> std::io::Result<PathBuf> {
        std::fs::rename(&self.staging, &self.target)?;
        self.finalized = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.finalized && self.staging.exists() {
            if let Err(err) = std::fs::remove_file(&self.staging) {
                tracing::warn!("failed to remove {}: {err}", self.staging.display());
            }
        }
    }
}
