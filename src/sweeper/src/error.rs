//! Failure taxonomy of a sweep run.

use crate::scan::Phase;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Exit status for configuration failures (sysexits `EX_CONFIG`).
pub const EX_CONFIG: i32 = 78;

/// Exit status for sweeps abandoned by the scheduler, as `timeout(1)` uses.
pub const EX_TIMEOUT: i32 = 124;

/// Errors that end a sweep run.
///
/// An empty match set is not an error; it is reported as a warning and the
/// run continues.
#[derive(Error, Debug)]
pub enum SweepError {
    /// The policy could not be resolved. Raised before any filesystem access.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Deleting an entry failed. Entries already removed stay removed.
    #[error(
        "Delete process failed with exit code {code} during {phase} phase at '{}': {source}",
        .path.display()
    )]
    Deletion {
        phase: Phase,
        path: PathBuf,
        code: i32,
        #[source]
        source: io::Error,
    },

    /// The scheduler stopped waiting for the run.
    #[error("Sweep did not finish within {0:?}")]
    Timeout(Duration),
}

impl SweepError {
    pub fn deletion(phase: Phase, path: impl Into<PathBuf>, source: io::Error) -> Self {
        SweepError::Deletion {
            phase,
            path: path.into(),
            code: os_exit_code(&source),
            source,
        }
    }

    /// Process exit status this error maps to. Never zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            SweepError::Configuration(_) => EX_CONFIG,
            SweepError::Deletion { code, .. } => *code,
            SweepError::Timeout(_) => EX_TIMEOUT,
        }
    }
}

/// The OS error number when it fits an exit status, else 1.
fn os_exit_code(err: &io::Error) -> i32 {
    match err.raw_os_error() {
        Some(code) if (1..=255).contains(&code) => code,
        _ => 1,
    }
}
