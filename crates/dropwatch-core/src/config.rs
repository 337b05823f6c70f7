//! Configuration module for dropwatch.
//!
//! Configuration is organised in named profiles of string key/value pairs.
//! A [`ConfigStore`] loads each profile lazily from `<dir>/<name>.yaml` and
//! caches it by name; components then build typed views ([`WatchConfig`],
//! [`LoggingConfig`]) from the profile they own. Handlers read their own
//! profiles independently; the core never interprets their keys.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::errors::ConfigError;

/// Name of the profile holding the core's own settings.
pub const MAIN_PROFILE: &str = "main";

/// Handler list used when `eventHandlerClasses` is absent.
pub const DEFAULT_EVENT_HANDLERS: &str = "printout";

/// Keys read from the main profile.
pub mod keys {
    pub const RECURSIVE: &str = "recursive";
    pub const DIR_TO_WATCH: &str = "dirToWatch";
    pub const EVENT_HANDLER_CLASSES: &str = "eventHandlerClasses";
    pub const MAX_WORKERS: &str = "maxEventHandlerWorkersNumber";
    pub const SHUTDOWN_TIMEOUT_SECS: &str = "shutdownTimeoutSecs";
    pub const LOG_LEVEL: &str = "logLevel";
    pub const LOG_FILE: &str = "logFile";
    pub const LOG_FORMAT: &str = "logFormat";
}

// ---------------------------------------------------------------------------
// ConfigProfile
// ---------------------------------------------------------------------------

/// A named set of string key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigProfile {
    name: String,
    values: BTreeMap<String, String>,
}

impl ConfigProfile {
    /// Build a profile from in-memory pairs.
    pub fn new<K, V>(name: impl Into<String>, values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse a flat YAML mapping. Scalars are stringified, `null` values are
    /// treated as absent, nested sequences or mappings are rejected.
    pub fn from_yaml_str(name: impl Into<String>, content: &str) -> Result<Self, ConfigError> {
        let name = name.into();
        let doc: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
                profile: name.clone(),
                message: e.to_string(),
            })?;

        let mapping = match doc {
            serde_yaml::Value::Null => return Ok(Self::new(name, Vec::<(String, String)>::new())),
            serde_yaml::Value::Mapping(m) => m,
            other => {
                return Err(ConfigError::Parse {
                    profile: name,
                    message: format!("expected a mapping at top level, found {other:?}"),
                })
            }
        };

        let mut values = BTreeMap::new();
        for (key, value) in mapping {
            let key = scalar_to_string(&key).ok_or_else(|| ConfigError::Parse {
                profile: name.clone(),
                message: format!("keys must be scalars, found {key:?}"),
            })?;
            if value.is_null() {
                continue;
            }
            let value = scalar_to_string(&value).ok_or_else(|| ConfigError::Parse {
                profile: name.clone(),
                message: format!("value of '{key}' must be a scalar"),
            })?;
            values.insert(key, value);
        }

        Ok(Self { name, values })
    }

    /// Profile name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Raw value for `key`, or `default` when absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Raw value for `key`; absence is a [`ConfigError::MissingKey`].
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                profile: self.name.clone(),
                key: key.to_string(),
            })
    }

    /// Parse `key` into `T`, falling back to `default` when absent.
    pub fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.parse_optional(key)?.unwrap_or(default))
    }

    /// Parse `key` into `T` if present.
    pub fn parse_optional<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue {
                    profile: self.name.clone(),
                    key: key.to_string(),
                    value: raw.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// Number of keys in the profile.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the profile has no keys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ConfigStore
// ---------------------------------------------------------------------------

/// Lazily loading, caching source of configuration profiles.
///
/// Constructed once at startup and shared (usually behind an `Arc`) with
/// every component that needs configuration.
#[derive(Debug, Default)]
pub struct ConfigStore {
    dir: Option<PathBuf>,
    profiles: DashMap<String, Arc<ConfigProfile>>,
}

impl ConfigStore {
    /// Store that reads profiles from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            profiles: DashMap::new(),
        }
    }

    /// Store with no backing directory; only inserted profiles are visible.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_profile(self, profile: ConfigProfile) -> Self {
        self.insert(profile);
        self
    }

    /// Insert or replace a profile.
    pub fn insert(&self, profile: ConfigProfile) {
        self.profiles
            .insert(profile.name().to_string(), Arc::new(profile));
    }

    /// Platform-appropriate default configuration directory.
    ///
    /// Typically `$XDG_CONFIG_HOME/dropwatch` on Linux.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("dropwatch")
    }

    /// Directory profiles are read from, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// File a profile would be loaded from.
    pub fn profile_path(&self, name: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{name}.yaml")))
    }

    /// Return the named profile, loading and caching it on first use.
    pub fn profile(&self, name: &str) -> Result<Arc<ConfigProfile>, ConfigError> {
        if let Some(cached) = self.profiles.get(name) {
            return Ok(Arc::clone(cached.value()));
        }

        let path = self.profile_path(name).ok_or_else(|| ConfigError::Load {
            profile: name.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no configuration directory and no in-memory profile",
            ),
        })?;

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Load {
            profile: name.to_string(),
            source,
        })?;
        let profile = ConfigProfile::from_yaml_str(name, &content)?;
        debug!(profile = name, path = %path.display(), keys = profile.len(), "Loaded config profile");

        // Two callers may race to load the same profile; the first insert wins.
        let entry = self
            .profiles
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(profile));
        Ok(Arc::clone(entry.value()))
    }

    /// Shorthand for the [`MAIN_PROFILE`].
    pub fn main(&self) -> Result<Arc<ConfigProfile>, ConfigError> {
        self.profile(MAIN_PROFILE)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Key of the offending setting, e.g. `"maxEventHandlerWorkersNumber"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logLevel`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// WatchConfig
// ---------------------------------------------------------------------------

/// Settings consumed by the watch engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    /// Root directory to watch.
    pub dir_to_watch: PathBuf,
    /// Whether subdirectories are registered at startup and on creation.
    pub recursive: bool,
    /// Handler identifiers, in configured order.
    pub event_handler_classes: Vec<String>,
    /// Worker pool capacity.
    pub max_event_handler_workers_number: usize,
    /// Upper bound on waiting for in-flight handlers at shutdown.
    pub shutdown_timeout_secs: u64,
}

impl WatchConfig {
    /// Build from the main profile, applying defaults for optional keys.
    pub fn from_profile(profile: &ConfigProfile) -> Result<Self, ConfigError> {
        let dir_to_watch = PathBuf::from(profile.require(keys::DIR_TO_WATCH)?.trim());
        let recursive = profile.parse(keys::RECURSIVE, true)?;
        let event_handler_classes = split_handler_ids(
            profile.get_or(keys::EVENT_HANDLER_CLASSES, DEFAULT_EVENT_HANDLERS),
        );
        let max_event_handler_workers_number = profile.parse(keys::MAX_WORKERS, 4usize)?;
        let shutdown_timeout_secs = profile.parse(keys::SHUTDOWN_TIMEOUT_SECS, 30u64)?;

        Ok(Self {
            dir_to_watch,
            recursive,
            event_handler_classes,
            max_event_handler_workers_number,
            shutdown_timeout_secs,
        })
    }

    /// Load the main profile from `store` and validate it.
    pub fn load(store: &ConfigStore) -> Result<Self, ConfigError> {
        let config = Self::from_profile(&*store.main()?)?;
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Shutdown wait as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.dir_to_watch.is_dir() {
            errors.push(ValidationError {
                field: keys::DIR_TO_WATCH.into(),
                message: format!("not a directory: {}", self.dir_to_watch.display()),
            });
        }
        if self.event_handler_classes.is_empty() {
            errors.push(ValidationError {
                field: keys::EVENT_HANDLER_CLASSES.into(),
                message: "at least one handler is required".into(),
            });
        }
        if self.max_event_handler_workers_number == 0 {
            errors.push(ValidationError {
                field: keys::MAX_WORKERS.into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.shutdown_timeout_secs == 0 {
            errors.push(ValidationError {
                field: keys::SHUTDOWN_TIMEOUT_SECS.into(),
                message: "must be greater than 0".into(),
            });
        }

        errors
    }
}

/// Split a comma-separated handler list, dropping blanks.
pub fn split_handler_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// LoggingConfig
// ---------------------------------------------------------------------------

/// Output encoding of log records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'; valid options: text, json")),
        }
    }
}

/// Logging sink settings, read from the main profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Default level filter when `RUST_LOG` is unset.
    pub level: String,
    /// Append log records here instead of stdout.
    pub file: Option<PathBuf>,
    /// Record encoding.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    /// Build from the main profile.
    pub fn from_profile(profile: &ConfigProfile) -> Result<Self, ConfigError> {
        Ok(Self {
            level: profile.get_or(keys::LOG_LEVEL, "info").trim().to_lowercase(),
            file: profile
                .get(keys::LOG_FILE)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            format: profile.parse(keys::LOG_FORMAT, LogFormat::Text)?,
        })
    }

    /// Validate the configuration and return all errors found.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if !VALID_LOG_LEVELS.contains(&self.level.as_str()) {
            errors.push(ValidationError {
                field: keys::LOG_LEVEL.into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        errors
    }
}

// ---------------------------------------------------------------------------
// WatchConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`WatchConfig`] programmatically.
///
/// # Example
///
/// ```rust,no_run
/// use dropwatch_core::config::WatchConfigBuilder;
///
/// let config = WatchConfigBuilder::new("/srv/dropbox")
///     .recursive(false)
///     .handlers("printout,upload")
///     .workers(2)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct WatchConfigBuilder {
    config: WatchConfig,
}

impl WatchConfigBuilder {
    /// Start from defaults with the given root.
    pub fn new(dir_to_watch: impl Into<PathBuf>) -> Self {
        Self {
            config: WatchConfig {
                dir_to_watch: dir_to_watch.into(),
                recursive: true,
                event_handler_classes: split_handler_ids(DEFAULT_EVENT_HANDLERS),
                max_event_handler_workers_number: 4,
                shutdown_timeout_secs: 30,
            },
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.config.recursive = recursive;
        self
    }

    pub fn handlers(mut self, ids: &str) -> Self {
        self.config.event_handler_classes = split_handler_ids(ids);
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.max_event_handler_workers_number = n;
        self
    }

    pub fn shutdown_timeout_secs(mut self, secs: u64) -> Self {
        self.config.shutdown_timeout_secs = secs;
        self
    }

    /// Consume the builder and return the finished [`WatchConfig`].
    pub fn build(self) -> WatchConfig {
        self.config
    }

    /// Build and validate in one step.
    pub fn build_validated(self) -> Result<WatchConfig, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}
