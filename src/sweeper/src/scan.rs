//! Shallow scan and expiry classification.
//!
//! Files are looked up at exactly `file_depth` below the target directory and
//! empty directories at exactly `dir_depth`; nothing deeper is visited. Every
//! call performs a fresh walk, so a scan can be restarted at any time.

use crate::policy::RetentionPolicy;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::{DirEntry, WalkDir};

/// Seconds in one retention day.
const SECS_PER_DAY: i64 = 86_400;

/// The two sequential stages of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Expired files below the per-process directories.
    Files,
    /// Per-process directories left empty.
    EmptyDirs,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Files => "files",
            Phase::EmptyDirs => "empty-dirs",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// A filesystem object selected for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub modified_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl CandidateEntry {
    /// Whole days elapsed since the last modification.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        age_in_days(self.modified_at, now)
    }
}

/// Whole days between `modified_at` and `now`, truncated. Negative for
/// timestamps in the future.
pub fn age_in_days(modified_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - modified_at).num_seconds() / SECS_PER_DAY
}

/// An entry is expired iff its age in whole days is strictly greater than
/// `max_age_days`. An age equal to the threshold is kept.
pub fn is_expired(modified_at: DateTime<Utc>, now: DateTime<Utc>, max_age_days: u64) -> bool {
    let age = age_in_days(modified_at, now);
    age >= 0 && (age as u64) > max_age_days
}

/// Entries selected for removal in one phase, ordered by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionBatch {
    pub phase: Phase,
    pub entries: Vec<CandidateEntry>,
}

impl DeletionBatch {
    pub fn new(phase: Phase, mut entries: Vec<CandidateEntry>) -> Self {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Self { phase, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|e| e.path.as_path())
    }
}

/// Scans the target directory of a resolved policy.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    policy: &'a RetentionPolicy,
    now: DateTime<Utc>,
}

impl<'a> Scanner<'a> {
    /// `now` is the reference time for every age computed by this scanner.
    pub fn new(policy: &'a RetentionPolicy, now: DateTime<Utc>) -> Self {
        Self { policy, now }
    }

    /// Selection criteria of the files phase, for the run report.
    pub fn file_criteria(&self) -> String {
        format!(
            "regular files at depth {} under '{}' older than {} day(s)",
            self.policy.scope.file_depth,
            self.policy.target_directory.display(),
            self.policy.max_age_days
        )
    }

    /// Selection criteria of the empty-directory phase, for the run report.
    pub fn dir_criteria(&self, cascade: bool) -> String {
        let emptiness = if cascade {
            "empty or holding only empty directories"
        } else {
            "empty"
        };
        format!(
            "directories at depth {} under '{}' that are {}",
            self.policy.scope.dir_depth,
            self.policy.target_directory.display(),
            emptiness
        )
    }

    /// Lazily yields the expired files. Each call starts a new walk.
    pub fn expired_files(&self) -> ExpiredFiles {
        ExpiredFiles {
            walker: self.walk(self.policy.scope.file_depth),
            now: self.now,
            max_age_days: self.policy.max_age_days,
        }
    }

    /// Lazily yields the directories eligible for pruning, evaluated at the
    /// moment each one is visited.
    pub fn empty_dirs(&self, cascade: bool) -> EmptyDirs {
        EmptyDirs {
            walker: self.walk(self.policy.scope.dir_depth),
            cascade,
        }
    }

    pub fn files_batch(&self) -> DeletionBatch {
        DeletionBatch::new(Phase::Files, self.expired_files().collect())
    }

    pub fn empty_dirs_batch(&self, cascade: bool) -> DeletionBatch {
        DeletionBatch::new(Phase::EmptyDirs, self.empty_dirs(cascade).collect())
    }

    fn walk(&self, depth: usize) -> Walker {
        let include_hidden = self.policy.scope.include_hidden;
        let walker = WalkDir::new(&self.policy.target_directory)
            .min_depth(depth)
            .max_depth(depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| include_hidden || entry.depth() == 0 || !is_hidden(entry));
        Box::new(walker)
    }
}

type Walker = Box<dyn Iterator<Item = walkdir::Result<DirEntry>>>;

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Pulls the next readable entry, logging and skipping unreadable ones.
fn next_entry(walker: &mut Walker) -> Option<DirEntry> {
    loop {
        match walker.next()? {
            Ok(entry) => return Some(entry),
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                tracing::warn!(path = %path, error = %err, "Skipping unreadable entry");
            }
        }
    }
}

fn modified_at(entry: &DirEntry) -> Option<(DateTime<Utc>, u64)> {
    let metadata = entry.metadata().map_err(io::Error::from);
    let (modified, len) = match metadata.and_then(|m| Ok((m.modified()?, m.len()))) {
        Ok(read) => read,
        Err(err) => {
            tracing::warn!(
                path = %entry.path().display(),
                error = %err,
                "Cannot read modification time, skipping entry"
            );
            return None;
        }
    };

    match to_utc(modified) {
        Some(modified_at) => Some((modified_at, len)),
        None => {
            tracing::warn!(
                path = %entry.path().display(),
                modified = ?modified,
                "Modification time out of range, skipping entry"
            );
            None
        }
    }
}

/// Converts a filesystem timestamp, or `None` when chrono cannot represent it.
fn to_utc(time: SystemTime) -> Option<DateTime<Utc>> {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => {
            DateTime::from_timestamp(i64::try_from(since.as_secs()).ok()?, since.subsec_nanos())
        }
        Err(err) => {
            let before = err.duration();
            let secs = i64::try_from(before.as_secs()).ok()?;
            match before.subsec_nanos() {
                0 => DateTime::from_timestamp(secs.checked_neg()?, 0),
                // Nanoseconds are always a positive offset from the whole second.
                nanos => DateTime::from_timestamp(
                    secs.checked_add(1)?.checked_neg()?,
                    1_000_000_000 - nanos,
                ),
            }
        }
    }
}

/// Iterator over expired files. See [`Scanner::expired_files`].
pub struct ExpiredFiles {
    walker: Walker,
    now: DateTime<Utc>,
    max_age_days: u64,
}

impl Iterator for ExpiredFiles {
    type Item = CandidateEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = next_entry(&mut self.walker)?;

            // Symlinks report their own type here and are never matched.
            if !entry.file_type().is_file() {
                continue;
            }

            let Some((modified_at, size_bytes)) = modified_at(&entry) else {
                continue;
            };

            if !is_expired(modified_at, self.now, self.max_age_days) {
                tracing::trace!(
                    path = %entry.path().display(),
                    age_days = age_in_days(modified_at, self.now),
                    "Keeping file within retention"
                );
                continue;
            }

            return Some(CandidateEntry {
                path: entry.into_path(),
                kind: EntryKind::File,
                modified_at,
                size_bytes,
            });
        }
    }
}

/// Iterator over prunable directories. See [`Scanner::empty_dirs`].
pub struct EmptyDirs {
    walker: Walker,
    cascade: bool,
}

impl Iterator for EmptyDirs {
    type Item = CandidateEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = next_entry(&mut self.walker)?;

            if !entry.file_type().is_dir() {
                continue;
            }

            if !is_prunable(entry.path(), self.cascade) {
                continue;
            }

            let Some((modified_at, _)) = modified_at(&entry) else {
                continue;
            };

            return Some(CandidateEntry {
                path: entry.into_path(),
                kind: EntryKind::Directory,
                modified_at,
                size_bytes: 0,
            });
        }
    }
}

/// A directory is prunable when it has no entries. With `cascade`, a
/// directory whose entries are all prunable directories qualifies too.
/// Unreadable directories are never prunable.
pub fn is_prunable(dir: &Path, cascade: bool) -> bool {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(path = %dir.display(), error = %err, "Cannot read directory");
            return false;
        }
    };

    for entry in entries {
        let Ok(entry) = entry else {
            return false;
        };
        if !cascade {
            return false;
        }
        let is_real_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_real_dir || !is_prunable(&entry.path(), true) {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{PolicySource, ScanScope};
    use chrono::Duration;
    use std::fs::File;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn policy(root: &Path, max_age_days: u64) -> RetentionPolicy {
        RetentionPolicy {
            target_directory: root.to_path_buf(),
            max_age_days,
            source: PolicySource::Override,
            scope: ScanScope::default(),
        }
    }

    fn touch(path: &Path, modified: SystemTime) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = File::create(path).unwrap();
        file.set_modified(modified).unwrap();
    }

    fn days_ago(now: DateTime<Utc>, days: i64) -> SystemTime {
        (now - Duration::days(days)).into()
    }

    #[test]
    fn test_threshold_is_strict() {
        let now = Utc::now();
        assert!(!is_expired(now - Duration::days(14), now, 14));
        assert!(!is_expired(now - Duration::days(14) - Duration::hours(23), now, 14));
        assert!(is_expired(now - Duration::days(15), now, 14));
        assert!(!is_expired(now, now, 0));
        assert!(is_expired(now - Duration::days(1), now, 0));
    }

    #[test]
    fn test_future_timestamps_never_expire() {
        let now = Utc::now();
        assert!(age_in_days(now + Duration::days(3), now) < 0);
        assert!(!is_expired(now + Duration::days(30), now, 0));
    }

    #[test]
    fn test_expired_files_at_depth_two_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let now = Utc::now();

        touch(&root.join("sub1/fileA"), days_ago(now, 20));
        touch(&root.join("sub1/fileB"), days_ago(now, 5));
        touch(&root.join("top-level.log"), days_ago(now, 40));
        touch(&root.join("sub2/nested/deep.log"), days_ago(now, 40));

        let policy = policy(root, 14);
        let batch = Scanner::new(&policy, now).files_batch();

        let paths: Vec<_> = batch.paths().map(Path::to_path_buf).collect();
        assert_eq!(paths, vec![root.join("sub1/fileA")]);
        assert_eq!(batch.phase, Phase::Files);
        assert_eq!(batch.entries[0].kind, EntryKind::File);
        assert_eq!(batch.entries[0].age_days(now), 20);
    }

    #[test]
    fn test_configurable_file_depth() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let now = Utc::now();

        touch(&root.join("sub2/nested/deep.log"), days_ago(now, 40));
        touch(&root.join("sub1/fileA"), days_ago(now, 40));

        let mut policy = policy(root, 14);
        policy.scope.file_depth = 3;
        let batch = Scanner::new(&policy, now).files_batch();

        let paths: Vec<_> = batch.paths().map(Path::to_path_buf).collect();
        assert_eq!(paths, vec![root.join("sub2/nested/deep.log")]);
    }

    #[test]
    fn test_hidden_entries_are_skipped_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let now = Utc::now();

        touch(&root.join(".hidden/old.log"), days_ago(now, 40));
        touch(&root.join("sub1/.old.log"), days_ago(now, 40));
        touch(&root.join("sub1/old.log"), days_ago(now, 40));

        let mut policy = policy(root, 14);
        assert_eq!(Scanner::new(&policy, now).files_batch().len(), 1);

        policy.scope.include_hidden = true;
        assert_eq!(Scanner::new(&policy, now).files_batch().len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_matched() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let now = Utc::now();

        touch(&root.join("sub1/old.log"), days_ago(now, 40));
        std::os::unix::fs::symlink(root.join("sub1/old.log"), root.join("sub1/link.log")).unwrap();

        let policy = policy(root, 0);
        let batch = Scanner::new(&policy, now).files_batch();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.entries[0].path, root.join("sub1/old.log"));
    }

    #[test]
    fn test_scan_is_restartable() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let now = Utc::now();

        touch(&root.join("a/1.log"), days_ago(now, 30));
        touch(&root.join("b/2.log"), days_ago(now, 30));

        let policy = policy(root, 14);
        let scanner = Scanner::new(&policy, now);

        let mut first = scanner.expired_files();
        assert!(first.next().is_some());

        // A fresh walk starts from the beginning regardless of the first one.
        assert_eq!(scanner.expired_files().count(), 2);
    }

    #[test]
    fn test_missing_target_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let policy = policy(&dir.path().join("missing"), 14);
        let scanner = Scanner::new(&policy, Utc::now());

        assert!(scanner.files_batch().is_empty());
        assert!(scanner.empty_dirs_batch(false).is_empty());
    }

    #[test]
    fn test_empty_dirs_at_depth_one() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let now = Utc::now();

        fs::create_dir_all(root.join("empty")).unwrap();
        fs::create_dir_all(root.join("only-empty-child/child")).unwrap();
        touch(&root.join("busy/file.log"), days_ago(now, 1));

        let policy = policy(root, 14);
        let scanner = Scanner::new(&policy, now);

        let strict: Vec<_> = scanner
            .empty_dirs_batch(false)
            .paths()
            .map(Path::to_path_buf)
            .collect();
        assert_eq!(strict, vec![root.join("empty")]);

        let cascade: Vec<_> = scanner
            .empty_dirs_batch(true)
            .paths()
            .map(Path::to_path_buf)
            .collect();
        assert_eq!(cascade, vec![root.join("empty"), root.join("only-empty-child")]);
    }

    #[test]
    fn test_out_of_range_timestamps_do_not_convert() {
        let far_future = UNIX_EPOCH + std::time::Duration::from_secs(9_000_000_000_000);
        assert_eq!(to_utc(far_future), None);

        let far_past = UNIX_EPOCH - std::time::Duration::from_secs(9_000_000_000_000);
        assert_eq!(to_utc(far_past), None);
    }

    #[test]
    fn test_pre_epoch_timestamps_convert() {
        let before = UNIX_EPOCH - std::time::Duration::from_millis(1_500);
        let converted = to_utc(before).unwrap();
        assert_eq!(converted.timestamp(), -2);
        assert_eq!(converted.timestamp_subsec_millis(), 500);

        let whole = UNIX_EPOCH - std::time::Duration::from_secs(86_400);
        assert_eq!(to_utc(whole).unwrap().timestamp(), -86_400);
    }

    #[test]
    fn test_unrepresentable_mtime_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let now = Utc::now();

        touch(&root.join("job/old.log"), days_ago(now, 40));
        let weird = root.join("job/weird.log");
        let file = File::create(&weird).unwrap();
        // Some filesystems clamp or reject the value; either way the scan must
        // neither panic nor select the file.
        let _ = file.set_modified(UNIX_EPOCH + std::time::Duration::from_secs(9_000_000_000_000));

        let policy = policy(root, 14);
        let batch = Scanner::new(&policy, now).files_batch();

        let paths: Vec<_> = batch.paths().map(Path::to_path_buf).collect();
        assert_eq!(paths, vec![root.join("job/old.log")]);
    }

    #[test]
    fn test_batch_is_sorted_and_sized() {
        let now = Utc::now();
        let entry = |name: &str, size| CandidateEntry {
            path: PathBuf::from(name),
            kind: EntryKind::File,
            modified_at: now,
            size_bytes: size,
        };
        let batch = DeletionBatch::new(Phase::Files, vec![entry("/b", 10), entry("/a", 5)]);

        assert_eq!(batch.entries[0].path, PathBuf::from("/a"));
        assert_eq!(batch.total_bytes(), 15);
        assert_eq!(batch.len(), 2);
    }
}
