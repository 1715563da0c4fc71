//! Test doubles and fixtures for exercising sweeps.

use crate::delete::{Deleter, FsDeleter, PhaseOutcome};
use crate::error::SweepError;
use crate::policy::RetentionPolicy;
use crate::report::Reporter;
use crate::scan::{DeletionBatch, Phase};
use crate::sweep::RunResult;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Reporter event, as observed by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RunStarted { max_age_days: u64, dry_run: bool },
    PhaseStarted(Phase),
    Matched { phase: Phase, paths: Vec<PathBuf> },
    NothingToDelete(Phase),
    Deleted { phase: Phase, deleted: usize, failures: usize },
    RunFailed(String),
    RunFinished { exit_code: i32 },
}

/// Records every reporter call in order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub events: Vec<Event>,
}

impl RecordingReporter {
    /// Paths listed for `phase`, in report order.
    pub fn matched(&self, phase: Phase) -> Vec<PathBuf> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Matched { phase: p, paths } if *p == phase => Some(paths.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn saw_phase(&self, phase: Phase) -> bool {
        self.events
            .iter()
            .any(|event| *event == Event::PhaseStarted(phase))
    }
}

impl Reporter for RecordingReporter {
    fn run_started(&mut self, policy: &RetentionPolicy, dry_run: bool) {
        self.events.push(Event::RunStarted {
            max_age_days: policy.max_age_days,
            dry_run,
        });
    }

    fn phase_started(&mut self, phase: Phase, _criteria: &str) {
        self.events.push(Event::PhaseStarted(phase));
    }

    fn matched(&mut self, batch: &DeletionBatch) {
        self.events.push(Event::Matched {
            phase: batch.phase,
            paths: batch.paths().map(Path::to_path_buf).collect(),
        });
    }

    fn nothing_to_delete(&mut self, phase: Phase) {
        self.events.push(Event::NothingToDelete(phase));
    }

    fn deleted(&mut self, outcome: &PhaseOutcome) {
        self.events.push(Event::Deleted {
            phase: outcome.phase,
            deleted: outcome.deleted,
            failures: outcome.failures.len(),
        });
    }

    fn run_failed(&mut self, error: &SweepError) {
        self.events.push(Event::RunFailed(error.to_string()));
    }

    fn run_finished(&mut self, result: &RunResult) {
        self.events.push(Event::RunFinished {
            exit_code: result.exit_status().code(),
        });
    }
}

/// Deletes through [`FsDeleter`] and records each successful removal.
/// Paths whose file name is listed in `fail_on` fail with `errno`.
#[derive(Debug, Clone, Default)]
pub struct RecordingDeleter {
    removed: Arc<Mutex<Vec<PathBuf>>>,
    fail_on: Vec<String>,
    errno: i32,
}

impl RecordingDeleter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, file_name: impl Into<String>, errno: i32) -> Self {
        self.fail_on.push(file_name.into());
        self.errno = errno;
        self
    }

    /// Paths removed so far, in deletion order.
    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn attempt(&self, path: &Path, remove: impl FnOnce(&Path) -> io::Result<()>) -> io::Result<()> {
        let scripted = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.fail_on.iter().any(|f| f == name));
        if scripted {
            return Err(io::Error::from_raw_os_error(self.errno));
        }

        remove(path)?;
        self.removed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.to_path_buf());
        Ok(())
    }
}

impl Deleter for RecordingDeleter {
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.attempt(path, |p| FsDeleter.remove_file(p))
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        self.attempt(path, |p| FsDeleter.remove_dir(p))
    }
}

/// Create `path` (and its parents) with a modification time `days` before `now`.
pub fn write_aged_file(path: &Path, now: DateTime<Utc>, days: i64) -> io::Result<()> {
    write_aged_file_at(path, now - chrono::Duration::days(days))
}

/// Create `path` (and its parents) with the given modification time.
pub fn write_aged_file_at(path: &Path, modified: DateTime<Utc>) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    file.set_modified(modified.into())
}
