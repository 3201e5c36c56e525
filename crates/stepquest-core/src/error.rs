//! Core error types for stepquest-core.
//!
//! This module defines the error hierarchy using thiserror. Sensor and
//! permission errors propagate to the caller for display; generation and
//! persistence errors are usually absorbed by the component that hit them
//! and only logged.

use std::path::PathBuf;
use thiserror::Error;

use crate::mission::MissionState;

/// Core error type for stepquest-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persistence-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pedometer or location sensor errors
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// Text generation errors
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Mission lifecycle errors
    #[error("Mission error: {0}")]
    Mission(#[from] MissionError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pedometer and location sensor errors.
///
/// `Unavailable` and `PermissionDenied` are terminal for a session: the
/// component that hit them stops trying until the next launch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// The sensor hardware or platform API is absent
    #[error("sensor is not available on this device")]
    Unavailable,

    /// The user declined the motion/location permission
    #[error("sensor permission denied")]
    PermissionDenied,

    /// A historical step query failed
    #[error("step query failed: {0}")]
    QueryFailed(String),

    /// Starting a live subscription failed
    #[error("failed to subscribe to live updates: {0}")]
    SubscribeFailed(String),
}

impl SensorError {
    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            SensorError::Unavailable => "sensor_unavailable",
            SensorError::PermissionDenied => "permission_denied",
            SensorError::QueryFailed(_) => "query_failed",
            SensorError::SubscribeFailed(_) => "subscribe_failed",
        }
    }

    /// Banner text shown to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            SensorError::Unavailable => {
                "Pedometer is not available on this device. Steps will not be tracked."
            }
            SensorError::PermissionDenied => {
                "Motion permission denied. Please enable it in settings."
            }
            SensorError::QueryFailed(_) | SensorError::SubscribeFailed(_) => {
                "Failed to initialize pedometer"
            }
        }
    }
}

/// Text generation collaborator errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The request did not complete in time
    #[error("text generation timed out")]
    Timeout,

    /// Transport-level failure
    #[error("text generation request failed: {0}")]
    Request(String),

    /// The endpoint answered with a non-success status
    #[error("text generation returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The endpoint answered with no usable text
    #[error("text generation returned an empty response")]
    Empty,
}

/// Persistence errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A stored value could not be decoded
    #[error("Corrupt value under '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backing store refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Mission lifecycle errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MissionError {
    /// The requested action is not valid in the current state
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: MissionState,
        action: &'static str,
    },

    /// No offered mission has the given id
    #[error("unknown mission: {0}")]
    UnknownMission(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_errors_have_distinct_messages() {
        assert_ne!(
            SensorError::Unavailable.user_message(),
            SensorError::PermissionDenied.user_message()
        );
        assert_eq!(SensorError::Unavailable.code(), "sensor_unavailable");
        assert_eq!(SensorError::PermissionDenied.code(), "permission_denied");
    }

    #[test]
    fn invalid_transition_names_state_and_action() {
        let err = MissionError::InvalidTransition {
            state: MissionState::Active,
            action: "scan",
        };
        assert_eq!(err.to_string(), "cannot scan while active");
    }

    #[test]
    fn locked_sqlite_maps_to_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        // SQLITE_BUSY maps to DatabaseBusy, not DatabaseLocked.
        assert!(matches!(StorageError::from(err), StorageError::QueryFailed(_)));

        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            None,
        );
        assert!(matches!(StorageError::from(err), StorageError::Locked));
    }
}
