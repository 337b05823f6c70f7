//! Error types shared across dropwatch crates
//!
//! [`ConfigError`] covers everything that can go wrong before the watcher is
//! running; all of its variants are fatal at startup. [`HandlerError`] is the
//! outcome a handler reports for a single file and drives the retry policy.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ValidationError;

/// Errors raised while loading configuration or assembling the watcher
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A profile file could not be read
    #[error("Failed to load config profile '{profile}': {source}")]
    Load {
        /// Name of the profile being loaded
        profile: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A profile file is not a flat YAML mapping of scalars
    #[error("Failed to parse config profile '{profile}': {message}")]
    Parse {
        /// Name of the profile being parsed
        profile: String,
        /// What was wrong with the document
        message: String,
    },

    /// A required key is absent
    #[error("Missing required key '{key}' in profile '{profile}'")]
    MissingKey {
        /// Profile that was consulted
        profile: String,
        /// The missing key
        key: String,
    },

    /// A key is present but cannot be interpreted
    #[error("Invalid value '{value}' for key '{key}' in profile '{profile}': {message}")]
    InvalidValue {
        /// Profile that was consulted
        profile: String,
        /// Offending key
        key: String,
        /// Raw value as found in the profile
        value: String,
        /// Why it was rejected
        message: String,
    },

    /// Validation of a typed configuration failed
    #[error("Invalid configuration: {}", join_validation(.0))]
    Invalid(Vec<ValidationError>),

    /// A handler identifier is not known to the registry
    #[error("Unknown event handler '{0}'")]
    UnknownHandler(String),

    /// A handler was found but its constructor failed
    #[error("Failed to instantiate event handler '{id}': {source:#}")]
    HandlerInit {
        /// Handler identifier
        id: String,
        /// Constructor failure
        #[source]
        source: anyhow::Error,
    },

    /// The configured root directory could not be watched at all
    #[error("Cannot watch root directory {path}: {reason}")]
    RootNotWatchable {
        /// The configured root
        path: PathBuf,
        /// Description of the registration failure
        reason: String,
    },
}

fn join_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Outcome of a failed handler invocation
///
/// The classification decides whether a [`RetryPolicy`](crate::retry::RetryPolicy)
/// tries again: only [`HandlerError::Transient`] is retried.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A failure that may succeed on a later attempt (network, file race)
    #[error("Transient failure: {0}")]
    Transient(String),

    /// A failure that will not go away by retrying (authorization, bad config)
    #[error("Fatal failure: {0}")]
    Fatal(String),

    /// Every allowed attempt failed transiently
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Total number of attempts made, including the initial one
        attempts: u32,
        /// The error reported by the final attempt
        last: Box<HandlerError>,
    },
}

impl HandlerError {
    /// Convenience constructor for a transient failure
    pub fn transient(message: impl Into<String>) -> Self {
        HandlerError::Transient(message.into())
    }

    /// Convenience constructor for a fatal failure
    pub fn fatal(message: impl Into<String>) -> Self {
        HandlerError::Fatal(message.into())
    }

    /// Returns true if retrying could help
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }
}
