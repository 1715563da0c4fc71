use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "logsweep.toml";

/// Prefix for environment overrides, e.g. `LOGSWEEP__SWEEPER__TARGET_DIRECTORY`.
pub const ENV_PREFIX: &str = "LOGSWEEP__";

/// How a deletion phase reacts to a failing entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Stop the phase at the first entry that cannot be deleted.
    #[default]
    FailFast,
    /// Attempt every entry, then fail the phase if any entry failed.
    Continue,
}

/// Sweeper configuration: where to sweep and how.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Root directory holding the per-process log directories.
    ///
    /// Env: LOGSWEEP__SWEEPER__TARGET_DIRECTORY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_directory: Option<PathBuf>,

    /// Stored retention default in days, used when a run carries no override.
    ///
    /// Env: LOGSWEEP__SWEEPER__DEFAULT_MAX_AGE_DAYS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_age_days: Option<u64>,

    /// Depth below the root at which files are considered (2 = `root/*/*`).
    ///
    /// Env: LOGSWEEP__SWEEPER__FILE_DEPTH
    #[serde(default = "default_file_depth")]
    pub file_depth: usize,

    /// Depth below the root at which empty directories are pruned (1 = `root/*`).
    ///
    /// Env: LOGSWEEP__SWEEPER__DIR_DEPTH
    #[serde(default = "default_dir_depth")]
    pub dir_depth: usize,

    /// Consider entries whose name starts with a dot.
    ///
    /// Env: LOGSWEEP__SWEEPER__INCLUDE_HIDDEN
    #[serde(default)]
    pub include_hidden: bool,

    /// Treat a directory holding only empty directories as empty.
    ///
    /// Env: LOGSWEEP__SWEEPER__CASCADE_EMPTY_DIRS
    #[serde(default)]
    pub cascade_empty_dirs: bool,

    /// Report what would be deleted without deleting anything.
    ///
    /// Env: LOGSWEEP__SWEEPER__DRY_RUN
    #[serde(default)]
    pub dry_run: bool,

    /// Env: LOGSWEEP__SWEEPER__FAILURE_MODE
    #[serde(default)]
    pub failure_mode: FailureMode,
}

fn default_file_depth() -> usize {
    2
}

fn default_dir_depth() -> usize {
    1
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            target_directory: None,
            default_max_age_days: None,
            file_depth: default_file_depth(),
            dir_depth: default_dir_depth(),
            include_hidden: false,
            cascade_empty_dirs: false,
            dry_run: false,
            failure_mode: FailureMode::default(),
        }
    }
}

/// Built-in scheduler settings used by the `logsweep` service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Env: LOGSWEEP__SCHEDULE__ENABLED
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Interval between sweeps.
    ///
    /// Env: LOGSWEEP__SCHEDULE__INTERVAL
    #[serde(with = "humantime_serde", default = "default_interval")]
    pub interval: Duration,

    /// Run a sweep immediately on startup instead of waiting one interval.
    ///
    /// Env: LOGSWEEP__SCHEDULE__RUN_ON_START
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,

    /// Stop waiting for a sweep after this long and count it as failed.
    ///
    /// Env: LOGSWEEP__SCHEDULE__RUN_TIMEOUT
    #[serde(
        with = "humantime_serde",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub run_timeout: Option<Duration>,
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> Duration {
    Duration::from_secs(24 * 3600) // daily
}

fn default_run_on_start() -> bool {
    true
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval: default_interval(),
            run_on_start: default_run_on_start(),
            run_timeout: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Errors raised by [`Configuration::validate`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be at least 1, got {value}")]
    InvalidDepth { field: &'static str, value: usize },

    #[error("Invalid schedule interval: {0:?} must be positive")]
    InvalidInterval(Duration),

    #[error("Invalid run timeout: {0:?} must be positive")]
    InvalidRunTimeout(Duration),
}

impl Configuration {
    /// Layered sources: defaults, then the TOML file, then `LOGSWEEP__` env vars.
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(None).extract().map_err(Box::new)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(Some(path)).extract().map_err(Box::new)
    }

    /// Structural checks only. An unset target directory is reported per run
    /// by the sweeper, not here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweeper.file_depth == 0 {
            return Err(ConfigError::InvalidDepth {
                field: "file_depth",
                value: self.sweeper.file_depth,
            });
        }
        if self.sweeper.dir_depth == 0 {
            return Err(ConfigError::InvalidDepth {
                field: "dir_depth",
                value: self.sweeper.dir_depth,
            });
        }
        if self.schedule.interval.is_zero() {
            return Err(ConfigError::InvalidInterval(self.schedule.interval));
        }
        if let Some(timeout) = self.schedule.run_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidRunTimeout(timeout));
            }
        }
        Ok(())
    }
}
