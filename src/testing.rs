//! Fake process runner and fixtures shared by unit tests.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::{Invocation, ProcessError, ProcessOutput, ProcessRunner};

type Handler = Box<dyn Fn(&Invocation) -> Result<ProcessOutput, ProcessError>>;

/// Answers invocations from registered handlers and records every call.
///
/// A program with a handler is "installed" (visible to `locate`) unless
/// `uninstall` says otherwise; unknown programs fail to spawn.
pub(crate) struct FakeRunner {
    handlers: Vec<(String, Handler)>,
    installed: BTreeSet<String>,
    calls: RefCell<Vec<Invocation>>,
}

impl FakeRunner {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Vec::new(),
            installed: BTreeSet::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn on(
        mut self,
        program: &str,
        handler: impl Fn(&Invocation) -> Result<ProcessOutput, ProcessError> + 'static,
    ) -> Self {
        self.installed.insert(program.to_string());
        self.handlers.push((program.to_string(), Box::new(handler)));
        self
    }

    /// Make `program` resolvable without giving it behavior.
    pub(crate) fn install(mut self, program: &str) -> Self {
        self.installed.insert(program.to_string());
        self
    }

    pub(crate) fn uninstall(mut self, program: &str) -> Self {
        self.installed.remove(program);
        self
    }

    pub(crate) fn exit(code: i32, stdout: &str, stderr: &str) -> Result<ProcessOutput, ProcessError> {
        Ok(ProcessOutput {
            status: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        })
    }

    pub(crate) fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl ProcessRunner for FakeRunner {
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        self.calls.borrow_mut().push(invocation.clone());
        match self.handlers.iter().find(|(p, _)| *p == invocation.program) {
            Some((_, handler)) => handler(invocation),
            None => Err(ProcessError::NotFound {
                program: invocation.program.clone(),
            }),
        }
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        self.installed
            .contains(program)
            .then(|| PathBuf::from("/usr/local/bin").join(program))
    }
}

pub(crate) fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cairo-prof-{name}-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("mkdir");
    dir
}

/// Write `path` and pin its mtime, so freshness checks do not depend on
/// filesystem timestamp granularity.
pub(crate) fn write_with_mtime(path: &Path, body: &[u8], mtime: SystemTime) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(path, body).expect("write");
    std::fs::File::options()
        .write(true)
        .open(path)
        .expect("open")
        .set_modified(mtime)
        .expect("set mtime");
}

/// Pin a directory's mtime. Creating entries inside it afterwards moves it again.
pub(crate) fn pin_dir_mtime(dir: &Path, mtime: SystemTime) {
    std::fs::File::open(dir)
        .expect("open dir")
        .set_modified(mtime)
        .expect("set dir mtime");
}

/// A trace written "during" the runner call.
pub(crate) fn write_fresh(path: &Path, body: &[u8]) {
    write_with_mtime(path, body, SystemTime::now() + Duration::from_secs(5));
}

/// Writes `body` to the path following `flag` in the invocation.
pub(crate) fn write_output_after(
    inv: &Invocation,
    flag: &str,
    body: &[u8],
) -> Result<ProcessOutput, ProcessError> {
    let out = inv.arg_after(flag).expect("output flag");
    std::fs::write(out, body).expect("write tool output");
    FakeRunner::exit(0, "", "")
}
