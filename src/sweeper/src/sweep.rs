//! One sweep run: resolve, then scan-and-delete per phase.
//!
//! ```text
//! Resolving -> Scanning(Files) -> Deleting(Files)
//!           -> Scanning(EmptyDirs) -> Deleting(EmptyDirs) -> Done
//! ```
//!
//! A deletion failure moves straight to `Failed(code)` and skips every later
//! state. A phase that matches nothing skips its `Deleting` state.

use crate::delete::{Deleter, DryRunDeleter, FsDeleter, PhaseOutcome, delete_batch};
use crate::error::SweepError;
use crate::metrics::SweepMetrics;
use crate::policy::{ConfigProvider, Invocation, PolicyResolver, RetentionPolicy};
use crate::report::Reporter;
use crate::scan::{DeletionBatch, Phase, Scanner};
use chrono::{DateTime, Utc};
use common::config::{FailureMode, SweeperConfig};
use std::fmt;
use std::time::{Duration, Instant};

/// Phases in execution order.
pub const PHASES: [Phase; 2] = [Phase::Files, Phase::EmptyDirs];

/// Final status of a run, as handed to the invoking process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure(i32),
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure(code) => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Resolving,
    Scanning(Phase),
    Deleting(Phase),
    Done,
    Failed(i32),
}

impl SweepState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: SweepState) -> bool {
        use SweepState::*;
        matches!(
            (*self, next),
            (Resolving, Scanning(Phase::Files))
                | (Resolving, Failed(_))
                | (Scanning(Phase::Files), Deleting(Phase::Files))
                | (Scanning(Phase::Files), Scanning(Phase::EmptyDirs))
                | (Deleting(Phase::Files), Scanning(Phase::EmptyDirs))
                | (Scanning(Phase::EmptyDirs), Deleting(Phase::EmptyDirs))
                | (Scanning(Phase::EmptyDirs), Done)
                | (Deleting(Phase::EmptyDirs), Done)
                | (Deleting(_), Failed(_))
        )
    }

    fn advance(&mut self, next: SweepState) {
        debug_assert!(
            self.can_transition_to(next),
            "illegal sweep transition {self} -> {next}"
        );
        tracing::debug!(from = %self, to = %next, "Sweep state transition");
        *self = next;
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SweepState::Done | SweepState::Failed(_))
    }
}

impl fmt::Display for SweepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepState::Resolving => write!(f, "resolving"),
            SweepState::Scanning(phase) => write!(f, "scanning({phase})"),
            SweepState::Deleting(phase) => write!(f, "deleting({phase})"),
            SweepState::Done => write!(f, "done"),
            SweepState::Failed(code) => write!(f, "failed({code})"),
        }
    }
}

/// Outcome of one run.
#[derive(Debug)]
pub struct RunResult {
    /// Resolved policy; `None` when resolution failed.
    pub policy: Option<RetentionPolicy>,
    pub files_deleted: usize,
    pub dirs_deleted: usize,
    pub bytes_freed: u64,
    /// Last phase executed, if any.
    pub phase: Option<Phase>,
    pub state: SweepState,
    pub dry_run: bool,
    pub duration: Duration,
    /// Failure that ended the run. Further entry failures of the same phase
    /// (with [`FailureMode::Continue`]) are in `other_failures`.
    pub error: Option<SweepError>,
    pub other_failures: Vec<SweepError>,
}

impl RunResult {
    fn new(dry_run: bool) -> Self {
        Self {
            policy: None,
            files_deleted: 0,
            dirs_deleted: 0,
            bytes_freed: 0,
            phase: None,
            state: SweepState::Resolving,
            dry_run,
            duration: Duration::ZERO,
            error: None,
            other_failures: Vec::new(),
        }
    }

    pub fn deleted_count(&self) -> usize {
        self.files_deleted + self.dirs_deleted
    }

    /// Status of the last phase executed.
    pub fn exit_status(&self) -> ExitStatus {
        match self.state {
            SweepState::Failed(code) => ExitStatus::Failure(code),
            _ => ExitStatus::Success,
        }
    }

    fn record(&mut self, outcome: &PhaseOutcome) {
        match outcome.phase {
            Phase::Files => self.files_deleted += outcome.deleted,
            Phase::EmptyDirs => self.dirs_deleted += outcome.deleted,
        }
        self.bytes_freed += outcome.bytes_freed;
    }
}

/// Behaviour switches of a [`Sweeper`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOptions {
    pub dry_run: bool,
    pub failure_mode: FailureMode,
    pub cascade_empty_dirs: bool,
}

impl From<&SweeperConfig> for SweepOptions {
    fn from(config: &SweeperConfig) -> Self {
        Self {
            dry_run: config.dry_run,
            failure_mode: config.failure_mode,
            cascade_empty_dirs: config.cascade_empty_dirs,
        }
    }
}

/// Runs sweeps against the policy resolved from `P`.
pub struct Sweeper<P> {
    resolver: PolicyResolver<P>,
    deleter: Box<dyn Deleter + Send + Sync>,
    options: SweepOptions,
    metrics: Option<SweepMetrics>,
}

impl<P: ConfigProvider> Sweeper<P> {
    /// Uses [`FsDeleter`], or [`DryRunDeleter`] when `options.dry_run` is set.
    pub fn new(provider: P, options: SweepOptions) -> Self {
        let deleter: Box<dyn Deleter + Send + Sync> = if options.dry_run {
            Box::new(DryRunDeleter)
        } else {
            Box::new(FsDeleter)
        };

        Self {
            resolver: PolicyResolver::new(provider),
            deleter,
            options,
            metrics: None,
        }
    }

    pub fn with_deleter(mut self, deleter: impl Deleter + Send + Sync + 'static) -> Self {
        self.deleter = Box::new(deleter);
        self
    }

    pub fn with_metrics(mut self, metrics: SweepMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options(&self) -> &SweepOptions {
        &self.options
    }

    pub fn run(&self, invocation: &Invocation, reporter: &mut dyn Reporter) -> RunResult {
        self.run_at(invocation, reporter, Utc::now())
    }

    /// Run with an explicit reference time for age computation.
    pub fn run_at(
        &self,
        invocation: &Invocation,
        reporter: &mut dyn Reporter,
        now: DateTime<Utc>,
    ) -> RunResult {
        let started = Instant::now();
        let mut result = RunResult::new(self.options.dry_run);

        tracing::info!(dry_run = self.options.dry_run, "Getting configurations");

        match self.resolver.resolve(invocation) {
            Ok(policy) => {
                reporter.run_started(&policy, self.options.dry_run);
                tracing::info!(policy = %policy.display(), "Resolved retention policy");
                self.execute(&policy, reporter, now, &mut result);
                result.policy = Some(policy);
            }
            Err(err) => {
                tracing::error!(error = %err, "Cannot resolve retention policy");
                reporter.run_failed(&err);
                result.state.advance(SweepState::Failed(err.exit_code()));
                result.error = Some(err);
            }
        }

        result.duration = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_run(&result);
        }

        tracing::info!(
            state = %result.state,
            files_deleted = result.files_deleted,
            dirs_deleted = result.dirs_deleted,
            bytes_freed = result.bytes_freed,
            exit_code = result.exit_status().code(),
            duration_ms = result.duration.as_millis() as u64,
            "Finished running cleanup process"
        );
        reporter.run_finished(&result);
        result
    }

    fn execute(
        &self,
        policy: &RetentionPolicy,
        reporter: &mut dyn Reporter,
        now: DateTime<Utc>,
        result: &mut RunResult,
    ) {
        if !policy.target_directory.is_dir() {
            tracing::warn!(
                target_directory = %policy.target_directory.display(),
                "Target directory does not exist or is not a directory"
            );
        }

        let scanner = Scanner::new(policy, now);

        for phase in PHASES {
            result.state.advance(SweepState::Scanning(phase));
            result.phase = Some(phase);

            // Each phase scans afresh so directory emptiness reflects the
            // files phase that just ran.
            let (criteria, batch) = match phase {
                Phase::Files => (scanner.file_criteria(), scanner.files_batch()),
                Phase::EmptyDirs => {
                    let cascade = self.options.cascade_empty_dirs;
                    (scanner.dir_criteria(cascade), scanner.empty_dirs_batch(cascade))
                }
            };

            reporter.phase_started(phase, &criteria);
            tracing::info!(%phase, criteria = %criteria, "Executing find");

            self.report_matches(&batch, reporter);

            if batch.is_empty() {
                tracing::warn!(%phase, "No entries to delete");
                reporter.nothing_to_delete(phase);
                continue;
            }

            result.state.advance(SweepState::Deleting(phase));
            let outcome = delete_batch(
                self.deleter.as_ref(),
                &batch,
                self.options.failure_mode,
                self.options.cascade_empty_dirs,
            );
            result.record(&outcome);
            reporter.deleted(&outcome);

            if let Some(code) = outcome.failure_code() {
                tracing::error!(%phase, code, "Delete process failed, skipping remaining phases");
                result.state.advance(SweepState::Failed(code));
                let mut failures = outcome.failures.into_iter();
                result.error = failures.next();
                result.other_failures = failures.collect();
                return;
            }

            tracing::info!(
                %phase,
                deleted = outcome.deleted,
                vanished = outcome.vanished,
                bytes_freed = outcome.bytes_freed,
                "Phase complete"
            );
        }

        result.state.advance(SweepState::Done);
    }

    fn report_matches(&self, batch: &DeletionBatch, reporter: &mut dyn Reporter) {
        for entry in &batch.entries {
            tracing::info!(
                phase = %batch.phase,
                path = %entry.path.display(),
                modified_at = %entry.modified_at.to_rfc3339(),
                size_bytes = entry.size_bytes,
                "Marked for deletion"
            );
        }
        tracing::info!(phase = %batch.phase, count = batch.len(), "Entries marked for deletion");
        reporter.matched(batch);
    }
}
