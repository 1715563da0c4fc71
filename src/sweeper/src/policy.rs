//! Retention policy resolution.
//!
//! A run's effective policy is built once from the per-run [`Invocation`] and
//! an injected [`ConfigProvider`]. The retention threshold follows the
//! hierarchy:
//!
//! 1. Run-time override (e.g. `{"maxLogAgeInDays": 30}`)
//! 2. Stored default from configuration
//! 3. [`FALLBACK_MAX_AGE_DAYS`]
//!
//! The target directory is validated here, before anything is scanned.

use crate::error::SweepError;
use common::config::SweeperConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Retention threshold used when neither an override nor a stored default exist.
pub const FALLBACK_MAX_AGE_DAYS: u64 = 14;

/// Supplies the stored settings a policy is resolved against.
pub trait ConfigProvider {
    /// Configured target directory, if any.
    fn target_directory(&self) -> Option<PathBuf>;

    /// Stored retention default in days, if any.
    fn default_max_age_days(&self) -> Option<u64>;

    /// Depths and filters of the shallow scan.
    fn scan_scope(&self) -> ScanScope {
        ScanScope::default()
    }
}

impl ConfigProvider for SweeperConfig {
    fn target_directory(&self) -> Option<PathBuf> {
        self.target_directory.clone()
    }

    fn default_max_age_days(&self) -> Option<u64> {
        self.default_max_age_days
    }

    fn scan_scope(&self) -> ScanScope {
        ScanScope {
            file_depth: self.file_depth,
            dir_depth: self.dir_depth,
            include_hidden: self.include_hidden,
        }
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProvider for &T {
    fn target_directory(&self) -> Option<PathBuf> {
        (**self).target_directory()
    }

    fn default_max_age_days(&self) -> Option<u64> {
        (**self).default_max_age_days()
    }

    fn scan_scope(&self) -> ScanScope {
        (**self).scan_scope()
    }
}

/// Where the retention threshold of a policy came from (for auditing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicySource {
    /// Run-time override supplied with the invocation.
    Override,
    /// Stored default from configuration.
    StoredDefault,
    /// Built-in fallback constant.
    Fallback,
}

impl fmt::Display for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PolicySource::Override => "run override",
            PolicySource::StoredDefault => "stored default",
            PolicySource::Fallback => "built-in fallback",
        };
        f.write_str(label)
    }
}

/// Shape of the shallow scan below the target directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanScope {
    /// Files are considered at exactly this depth (2 = `root/*/*`).
    pub file_depth: usize,
    /// Empty directories are pruned at exactly this depth (1 = `root/*`).
    pub dir_depth: usize,
    /// Consider entries whose name starts with a dot.
    pub include_hidden: bool,
}

impl Default for ScanScope {
    fn default() -> Self {
        Self {
            file_depth: 2,
            dir_depth: 1,
            include_hidden: false,
        }
    }
}

/// Effective configuration of one run. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionPolicy {
    pub target_directory: PathBuf,
    pub max_age_days: u64,
    pub source: PolicySource,
    pub scope: ScanScope,
}

impl RetentionPolicy {
    /// Human-readable representation for logging.
    pub fn display(&self) -> String {
        format!(
            "target={}, max_age_days={}, source={}, file_depth={}, dir_depth={}",
            self.target_directory.display(),
            self.max_age_days,
            self.source,
            self.scope.file_depth,
            self.scope.dir_depth
        )
    }
}

/// Per-run input from the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Overrides the configured target directory.
    pub target_directory: Option<PathBuf>,
    /// Overrides the stored retention default.
    pub max_age_days_override: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunConf {
    #[serde(default)]
    max_log_age_in_days: Option<serde_json::Value>,
}

impl Invocation {
    pub fn with_max_age_days(mut self, days: u64) -> Self {
        self.max_age_days_override = Some(days);
        self
    }

    pub fn with_target_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_directory = Some(dir.into());
        self
    }

    /// Parse a run configuration such as `{"maxLogAgeInDays": 30}`.
    ///
    /// The value may be an integer or a numeric string. A missing key, `null`
    /// or an empty string leaves the override unset.
    pub fn from_run_conf(conf: &str) -> Result<Self, SweepError> {
        let parsed: RunConf = serde_json::from_str(conf).map_err(|e| {
            SweepError::Configuration(format!("Run configuration is not valid JSON: {e}"))
        })?;

        let max_age_days_override = match parsed.max_log_age_in_days {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Number(n)) => Some(n.as_u64().ok_or_else(|| {
                SweepError::Configuration(format!(
                    "maxLogAgeInDays must be a non-negative integer, got {n}"
                ))
            })?),
            Some(serde_json::Value::String(s)) if s.trim().is_empty() => None,
            Some(serde_json::Value::String(s)) => Some(s.trim().parse::<u64>().map_err(|_| {
                SweepError::Configuration(format!(
                    "maxLogAgeInDays must be a non-negative integer, got '{s}'"
                ))
            })?),
            Some(other) => {
                return Err(SweepError::Configuration(format!(
                    "maxLogAgeInDays must be a non-negative integer, got {other}"
                )));
            }
        };

        Ok(Self {
            target_directory: None,
            max_age_days_override,
        })
    }
}

/// Resolves the effective [`RetentionPolicy`] of a run.
#[derive(Debug)]
pub struct PolicyResolver<P> {
    provider: P,
}

impl<P: ConfigProvider> PolicyResolver<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Resolve the policy for one invocation.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::Configuration`] if:
    /// - The target directory is unset, empty or the filesystem root
    /// - A scan depth is zero
    pub fn resolve(&self, invocation: &Invocation) -> Result<RetentionPolicy, SweepError> {
        let target_directory = invocation
            .target_directory
            .clone()
            .or_else(|| self.provider.target_directory());
        let target_directory = validate_target_directory(target_directory)?;

        let scope = self.provider.scan_scope();
        if scope.file_depth == 0 || scope.dir_depth == 0 {
            return Err(SweepError::Configuration(format!(
                "Scan depths must be at least 1 (file_depth={}, dir_depth={})",
                scope.file_depth, scope.dir_depth
            )));
        }

        let (max_age_days, source) = self.resolve_max_age(invocation.max_age_days_override);

        Ok(RetentionPolicy {
            target_directory,
            max_age_days,
            source,
            scope,
        })
    }

    fn resolve_max_age(&self, max_age_override: Option<u64>) -> (u64, PolicySource) {
        if let Some(days) = max_age_override {
            return (days, PolicySource::Override);
        }

        if let Some(days) = self.provider.default_max_age_days() {
            return (days, PolicySource::StoredDefault);
        }

        (FALLBACK_MAX_AGE_DAYS, PolicySource::Fallback)
    }
}

fn validate_target_directory(target: Option<PathBuf>) -> Result<PathBuf, SweepError> {
    let Some(target) = target else {
        return Err(SweepError::Configuration(
            "Target directory is not set. Provide an appropriate directory path".to_string(),
        ));
    };

    if target.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(SweepError::Configuration(
            "Target directory is empty. Provide an appropriate directory path".to_string(),
        ));
    }

    if is_filesystem_root(&target) {
        return Err(SweepError::Configuration(format!(
            "Refusing to sweep the filesystem root '{}'",
            target.display()
        )));
    }

    Ok(target)
}

/// Whether `path` names the filesystem root, after resolving `..` and, when
/// the path exists, symlinks.
fn is_filesystem_root(path: &Path) -> bool {
    let is_root = |p: &Path| p.has_root() && p.parent().is_none();

    if is_root(&lexically_normalized(path)) {
        return true;
    }
    fs::canonicalize(path).is_ok_and(|resolved| is_root(&resolved))
}

/// Drops `.` and folds `..` into its parent without touching the filesystem.
/// `..` never climbs above the root.
fn lexically_normalized(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FixedProvider {
        target: Option<PathBuf>,
        default_days: Option<u64>,
    }

    impl ConfigProvider for FixedProvider {
        fn target_directory(&self) -> Option<PathBuf> {
            self.target.clone()
        }

        fn default_max_age_days(&self) -> Option<u64> {
            self.default_days
        }
    }

    fn provider(default_days: Option<u64>) -> FixedProvider {
        FixedProvider {
            target: Some(PathBuf::from("/var/log/scheduler")),
            default_days,
        }
    }

    #[test]
    fn test_fallback_when_nothing_is_set() {
        let resolver = PolicyResolver::new(provider(None));
        let policy = resolver.resolve(&Invocation::default()).unwrap();

        assert_eq!(policy.max_age_days, FALLBACK_MAX_AGE_DAYS);
        assert_eq!(policy.max_age_days, 14);
        assert_eq!(policy.source, PolicySource::Fallback);
        assert_eq!(policy.scope, ScanScope::default());
    }

    #[test]
    fn test_stored_default_beats_fallback() {
        let resolver = PolicyResolver::new(provider(Some(30)));
        let policy = resolver.resolve(&Invocation::default()).unwrap();

        assert_eq!(policy.max_age_days, 30);
        assert_eq!(policy.source, PolicySource::StoredDefault);
    }

    #[test]
    fn test_override_beats_stored_default() {
        let resolver = PolicyResolver::new(provider(Some(30)));
        let policy = resolver
            .resolve(&Invocation::default().with_max_age_days(3))
            .unwrap();

        assert_eq!(policy.max_age_days, 3);
        assert_eq!(policy.source, PolicySource::Override);
    }

    #[test]
    fn test_zero_override_is_allowed() {
        let resolver = PolicyResolver::new(provider(None));
        let policy = resolver
            .resolve(&Invocation::default().with_max_age_days(0))
            .unwrap();

        assert_eq!(policy.max_age_days, 0);
        assert_eq!(policy.source, PolicySource::Override);
    }

    #[test]
    fn test_unset_target_is_configuration_error() {
        let resolver = PolicyResolver::new(FixedProvider::default());
        let err = resolver.resolve(&Invocation::default()).unwrap_err();
        assert!(matches!(err, SweepError::Configuration(_)));
    }

    #[test]
    fn test_blank_target_is_configuration_error() {
        let resolver = PolicyResolver::new(FixedProvider {
            target: Some(PathBuf::from("   ")),
            default_days: None,
        });
        let err = resolver.resolve(&Invocation::default()).unwrap_err();
        assert!(matches!(err, SweepError::Configuration(_)));
    }

    #[test]
    fn test_filesystem_root_is_rejected() {
        let resolver = PolicyResolver::new(provider(None));
        let err = resolver
            .resolve(&Invocation::default().with_target_directory("/"))
            .unwrap_err();
        assert!(matches!(err, SweepError::Configuration(_)));
    }

    #[test]
    fn test_paths_resolving_to_root_are_rejected() {
        let resolver = PolicyResolver::new(provider(None));
        for target in ["/..", "/tmp/..", "/./", "/var/log/../../..", "//"] {
            let err = resolver
                .resolve(&Invocation::default().with_target_directory(target))
                .unwrap_err();
            assert!(
                matches!(err, SweepError::Configuration(_)),
                "expected {target} to be rejected"
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("root-link");
        std::os::unix::fs::symlink("/", &link).unwrap();

        let resolver = PolicyResolver::new(provider(None));
        let err = resolver
            .resolve(&Invocation::default().with_target_directory(&link))
            .unwrap_err();
        assert!(matches!(err, SweepError::Configuration(_)));
    }

    #[test]
    fn test_parent_components_below_root_are_allowed() {
        assert_eq!(
            lexically_normalized(Path::new("/var/log/../log/./jobs")),
            PathBuf::from("/var/log/jobs")
        );
        assert_eq!(
            lexically_normalized(Path::new("logs/../../x")),
            PathBuf::from("../x")
        );

        let resolver = PolicyResolver::new(provider(None));
        let policy = resolver
            .resolve(&Invocation::default().with_target_directory("/var/log/../log"))
            .unwrap();
        assert_eq!(policy.target_directory, PathBuf::from("/var/log/../log"));
    }

    #[test]
    fn test_invocation_target_wins() {
        let resolver = PolicyResolver::new(provider(None));
        let policy = resolver
            .resolve(&Invocation::default().with_target_directory("/tmp/other"))
            .unwrap();
        assert_eq!(policy.target_directory, PathBuf::from("/tmp/other"));
    }

    #[test]
    fn test_sweeper_config_provider() {
        let config = SweeperConfig {
            target_directory: Some(PathBuf::from("/logs")),
            default_max_age_days: Some(21),
            file_depth: 3,
            include_hidden: true,
            ..Default::default()
        };
        let resolver = PolicyResolver::new(&config);
        let policy = resolver.resolve(&Invocation::default()).unwrap();

        assert_eq!(policy.max_age_days, 21);
        assert_eq!(policy.scope.file_depth, 3);
        assert_eq!(policy.scope.dir_depth, 1);
        assert!(policy.scope.include_hidden);
    }

    #[test]
    fn test_zero_depth_is_configuration_error() {
        let config = SweeperConfig {
            target_directory: Some(PathBuf::from("/logs")),
            dir_depth: 0,
            ..Default::default()
        };
        let err = PolicyResolver::new(config)
            .resolve(&Invocation::default())
            .unwrap_err();
        assert!(matches!(err, SweepError::Configuration(_)));
    }

    #[test]
    fn test_run_conf_parsing() {
        let inv = Invocation::from_run_conf(r#"{"maxLogAgeInDays":30}"#).unwrap();
        assert_eq!(inv.max_age_days_override, Some(30));

        let inv = Invocation::from_run_conf(r#"{"maxLogAgeInDays":"7"}"#).unwrap();
        assert_eq!(inv.max_age_days_override, Some(7));

        let inv = Invocation::from_run_conf(r#"{"maxLogAgeInDays":""}"#).unwrap();
        assert_eq!(inv.max_age_days_override, None);

        let inv = Invocation::from_run_conf("{}").unwrap();
        assert_eq!(inv.max_age_days_override, None);

        let inv = Invocation::from_run_conf(r#"{"maxLogAgeInDays":null}"#).unwrap();
        assert_eq!(inv.max_age_days_override, None);
    }

    #[test]
    fn test_run_conf_rejects_invalid_values() {
        for conf in [
            r#"{"maxLogAgeInDays":-1}"#,
            r#"{"maxLogAgeInDays":1.5}"#,
            r#"{"maxLogAgeInDays":"soon"}"#,
            r#"{"maxLogAgeInDays":[1]}"#,
            "not json",
        ] {
            let err = Invocation::from_run_conf(conf).unwrap_err();
            assert!(
                matches!(err, SweepError::Configuration(_)),
                "expected configuration error for {conf}"
            );
        }
    }
}
