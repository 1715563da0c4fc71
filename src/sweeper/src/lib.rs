//! Log retention sweeper.
//!
//! Deletes files older than a retention threshold from a shallow directory
//! tree, then prunes the directories that were left empty. A run resolves a
//! [`RetentionPolicy`], then executes two phases in order (files, then empty
//! directories), reporting every matched entry before deleting it.
//!
//! The [`Sweeper`] performs one run; the [`Scheduler`] repeats runs on an
//! interval for the long-running service.

pub mod delete;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod report;
pub mod scan;
pub mod schedule;
pub mod sweep;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use delete::{Deleter, DryRunDeleter, FsDeleter, PhaseOutcome};
pub use error::SweepError;
pub use metrics::{MetricsSummary, SweepMetrics};
pub use policy::{
    ConfigProvider, FALLBACK_MAX_AGE_DAYS, Invocation, PolicyResolver, PolicySource,
    RetentionPolicy, ScanScope,
};
pub use report::{Reporter, TextReporter};
pub use scan::{CandidateEntry, DeletionBatch, EntryKind, Phase, Scanner};
pub use schedule::Scheduler;
pub use sweep::{ExitStatus, RunResult, SweepOptions, SweepState, Sweeper};
