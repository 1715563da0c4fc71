//! Run reporting.
//!
//! Per phase a [`Reporter`] receives, in order: the selection criteria, the
//! full matched batch, then either a nothing-to-delete warning or the
//! outcome of the delete step. The batch handed to [`Reporter::matched`] is
//! the same value the delete step consumes.

use crate::delete::PhaseOutcome;
use crate::error::SweepError;
use crate::policy::RetentionPolicy;
use crate::scan::{DeletionBatch, Phase};
use crate::sweep::RunResult;
use std::fmt;
use std::io::{self, Write};

pub trait Reporter {
    fn run_started(&mut self, policy: &RetentionPolicy, dry_run: bool);

    fn phase_started(&mut self, phase: Phase, criteria: &str);

    fn matched(&mut self, batch: &DeletionBatch);

    /// The phase matched nothing. A warning, not an error.
    fn nothing_to_delete(&mut self, phase: Phase);

    fn deleted(&mut self, outcome: &PhaseOutcome);

    /// The run failed before scanning (configuration errors).
    fn run_failed(&mut self, error: &SweepError);

    fn run_finished(&mut self, result: &RunResult);
}

/// Renders the textual run report to a writer.
pub struct TextReporter<W: Write> {
    out: W,
    dry_run: bool,
    write_failed: bool,
}

impl TextReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TextReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            dry_run: false,
            write_failed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        if let Err(err) = writeln!(self.out, "{args}") {
            // Only the first write failure is logged.
            if !self.write_failed {
                tracing::warn!(error = %err, "Failed to write run report");
                self.write_failed = true;
            }
        }
    }

    fn blank(&mut self) {
        self.line(format_args!(""));
    }
}

impl<W: Write> Reporter for TextReporter<W> {
    fn run_started(&mut self, policy: &RetentionPolicy, dry_run: bool) {
        self.dry_run = dry_run;
        self.line(format_args!("Configurations:"));
        self.line(format_args!(
            "TARGET_DIRECTORY:  '{}'",
            policy.target_directory.display()
        ));
        self.line(format_args!(
            "MAX_AGE_IN_DAYS:   '{}' ({})",
            policy.max_age_days, policy.source
        ));
        if dry_run {
            self.line(format_args!("DRY_RUN:           'true'"));
        }
        self.blank();
        self.line(format_args!("Running Cleanup Process..."));
    }

    fn phase_started(&mut self, phase: Phase, criteria: &str) {
        self.line(format_args!("== Phase: {phase} =="));
        self.line(format_args!("Selecting {criteria}"));
    }

    fn matched(&mut self, batch: &DeletionBatch) {
        let verb = if self.dry_run { "would delete" } else { "will be deleting" };
        self.line(format_args!("Process {verb} the following entries:"));
        for path in batch.paths() {
            self.line(format_args!("{}", path.display()));
        }
        self.line(format_args!("Process {verb} {} entries", batch.len()));
        self.blank();
    }

    fn nothing_to_delete(&mut self, phase: Phase) {
        self.line(format_args!("WARN: No entries to delete in {phase} phase"));
        self.blank();
    }

    fn deleted(&mut self, outcome: &PhaseOutcome) {
        let verb = if self.dry_run { "Would delete" } else { "Deleted" };
        self.line(format_args!(
            "{verb} {} of {} attempted entries ({} bytes)",
            outcome.deleted, outcome.attempted, outcome.bytes_freed
        ));
        if outcome.vanished > 0 {
            self.line(format_args!(
                "{} entries were already gone",
                outcome.vanished
            ));
        }
        for failure in &outcome.failures {
            self.line(format_args!("ERROR: {failure}"));
        }
        if let Some(code) = outcome.failure_code() {
            self.line(format_args!(
                "Delete process failed with exit code '{code}'"
            ));
        }
        self.blank();
    }

    fn run_failed(&mut self, error: &SweepError) {
        self.line(format_args!("ERROR: {error}"));
    }

    fn run_finished(&mut self, result: &RunResult) {
        self.line(format_args!(
            "Finished Running Cleanup Process: {} entries deleted ({} files, {} directories), exit status {}",
            result.deleted_count(),
            result.files_deleted,
            result.dirs_deleted,
            result.exit_status().code()
        ));
        if let Err(err) = self.out.flush() {
            tracing::warn!(error = %err, "Failed to flush run report");
        }
    }
}
