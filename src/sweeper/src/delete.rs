//! Batch deletion of selected entries.
//!
//! Deletion is not transactional: entries removed before a failure stay
//! removed. Directories are only ever removed with a non-forced
//! `remove_dir`, so a directory that gained content is left in place and
//! surfaces as a failure. An entry that vanished between scan and delete
//! counts as gone, not as a failure.

use crate::error::SweepError;
use crate::scan::{CandidateEntry, DeletionBatch, EntryKind, Phase};
use common::config::FailureMode;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Filesystem operations used by the delete step.
pub trait Deleter {
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove an empty directory. Must fail on a non-empty one.
    fn remove_dir(&self, path: &Path) -> io::Result<()>;
}

/// Deletes from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsDeleter;

impl Deleter for FsDeleter {
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }
}

/// Logs what would be deleted without touching the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunDeleter;

impl Deleter for DryRunDeleter {
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        tracing::info!(path = %path.display(), "[DRY-RUN] Would delete file");
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        tracing::info!(path = %path.display(), "[DRY-RUN] Would delete directory");
        Ok(())
    }
}

/// Result of the delete step of one phase.
#[derive(Debug)]
pub struct PhaseOutcome {
    pub phase: Phase,
    /// Entries of the batch submitted to the deleter.
    pub attempted: usize,
    /// Entries successfully deleted.
    pub deleted: usize,
    /// Entries already removed by someone else.
    pub vanished: usize,
    /// Bytes freed by deleted files.
    pub bytes_freed: u64,
    /// Entry failures, in the order they happened.
    pub failures: Vec<SweepError>,
}

impl PhaseOutcome {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            attempted: 0,
            deleted: 0,
            vanished: 0,
            bytes_freed: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Exit code of the first failure, if any.
    pub fn failure_code(&self) -> Option<i32> {
        self.failures.first().map(SweepError::exit_code)
    }
}

/// Delete every entry of `batch`.
///
/// With [`FailureMode::FailFast`] the phase stops at the first failing entry;
/// with [`FailureMode::Continue`] every entry is attempted. Either way, any
/// failure makes the phase fail.
pub fn delete_batch(
    deleter: &dyn Deleter,
    batch: &DeletionBatch,
    failure_mode: FailureMode,
    cascade: bool,
) -> PhaseOutcome {
    let mut outcome = PhaseOutcome::new(batch.phase);

    for entry in &batch.entries {
        outcome.attempted += 1;

        match delete_entry(deleter, entry, cascade) {
            Ok(()) => {
                tracing::debug!(
                    phase = %batch.phase,
                    path = %entry.path.display(),
                    size_bytes = entry.size_bytes,
                    "Deleted entry"
                );
                outcome.deleted += 1;
                outcome.bytes_freed += entry.size_bytes;
            }
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(
                    phase = %batch.phase,
                    path = %entry.path.display(),
                    "Entry already gone"
                );
                outcome.vanished += 1;
            }
            Err(source) => {
                let err = SweepError::deletion(batch.phase, &entry.path, source);
                tracing::error!(
                    phase = %batch.phase,
                    path = %entry.path.display(),
                    code = err.exit_code(),
                    error = %err,
                    "Failed to delete entry"
                );
                outcome.failures.push(err);

                if failure_mode == FailureMode::FailFast {
                    break;
                }
            }
        }
    }

    outcome
}

fn delete_entry(deleter: &dyn Deleter, entry: &CandidateEntry, cascade: bool) -> io::Result<()> {
    match entry.kind {
        EntryKind::File => deleter.remove_file(&entry.path),
        EntryKind::Directory if cascade => remove_empty_tree(deleter, &entry.path),
        EntryKind::Directory => deleter.remove_dir(&entry.path),
    }
}

/// Remove a directory and its nested directories bottom-up. Any non-directory
/// content makes `remove_dir` fail instead of being deleted.
fn remove_empty_tree(deleter: &dyn Deleter, root: &Path) -> io::Result<()> {
    for entry in WalkDir::new(root).follow_links(false).contents_first(true) {
        let entry = entry?;
        deleter.remove_dir(entry.path())?;
    }
    Ok(())
}
