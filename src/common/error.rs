//! Error types for the bench sequencer
//!
//! Errors are split by the boundary they belong to. Step, registry and
//! operation errors are contained by the runner at the step boundary;
//! connection and sequence-load errors abort before or at run start.

use std::io;
use thiserror::Error;

use crate::registry::Arity;
use crate::report::ResultLog;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the bench sequencer
#[derive(Error, Debug)]
pub enum Error {
    // === Session Errors ===
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Every test ran, but the session did not close cleanly
    #[error("Session failed to close after {} results: {source}", .results.len())]
    CloseFailed {
        #[source]
        source: ConnectionError,
        results: ResultLog,
    },

    // === Sequence Errors ===
    #[error(transparent)]
    SequenceLoad(#[from] SequenceLoadError),

    #[error("Test {id} not found in sequence")]
    TestNotFound { id: i64 },

    #[error("Test id {id} is already used in this sequence")]
    DuplicateTestId { id: i64 },

    #[error("Test {id}: min {min} is greater than max {max}")]
    InvalidLimits { id: i64, min: f64, max: f64 },

    #[error("No free test id after {max}")]
    NoFreeTestId { max: i64 },

    #[error("{failed} of {total} tests did not pass")]
    TestsFailed { failed: usize, total: usize },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A step expression that could not be turned into a command call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("Malformed step '{0}': expected name(arg, ...)")]
    Malformed(String),

    #[error("Invalid parameter '{param}' in step '{step}': expected an integer")]
    Parameter { step: String, param: String },
}

/// Command lookup and registration failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Command '{name}' is already registered by driver '{owner}'")]
    DuplicateCommand { name: String, owner: String },
}

/// Failure raised while invoking a driver operation or acquiring a value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationError {
    #[error("Parameter mismatch for '{command}': expected {expected} parameter(s), got {got}")]
    ArityMismatch {
        command: String,
        expected: Arity,
        got: usize,
    },

    #[error("Driver '{0}' is not connected")]
    NotConnected(String),

    #[error("Invalid argument for '{command}': {message}")]
    InvalidArgument { command: String, message: String },

    #[error("Driver '{driver}' failed: {message}")]
    Driver { driver: String, message: String },
}

impl OperationError {
    /// Create an invalid argument error
    pub fn invalid_argument(command: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            command: command.to_string(),
            message: message.into(),
        }
    }

    /// Create a driver-internal failure
    pub fn driver(driver: &str, message: impl Into<String>) -> Self {
        Self::Driver {
            driver: driver.to_string(),
            message: message.into(),
        }
    }
}

/// Any failure contained at the step boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepExecutionError {
    #[error(transparent)]
    Parse(#[from] StepError),

    #[error(transparent)]
    Resolve(#[from] RegistryError),

    #[error(transparent)]
    Operation(#[from] OperationError),
}

/// Opening or closing an instrument connection failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Failed to open '{resource}' for driver '{driver}': {reason}")]
    OpenFailed {
        driver: String,
        resource: String,
        reason: String,
    },

    #[error("Driver '{driver}' is already connected to '{resource}'")]
    AlreadyOpen { driver: String, resource: String },

    #[error("Failed to close driver '{driver}': {reason}")]
    CloseFailed { driver: String, reason: String },
}

impl ConnectionError {
    /// Create an open failure for a driver and resource
    pub fn open_failed(driver: &str, resource: &str, reason: impl Into<String>) -> Self {
        Self::OpenFailed {
            driver: driver.to_string(),
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }
}

/// A sequence file could not be loaded or failed validation
#[derive(Error, Debug)]
pub enum SequenceLoadError {
    #[error("Failed to read sequence file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse sequence file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid sequence: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_mismatch_message() {
        let err = OperationError::ArityMismatch {
            command: "setup_voltage".to_string(),
            expected: Arity::Exact(2),
            got: 1,
        };
        assert_eq!(
            err.to_string(),
            "Parameter mismatch for 'setup_voltage': expected 2 parameter(s), got 1"
        );
    }

    #[test]
    fn test_invalid_sequence_joins_issues() {
        let err = SequenceLoadError::Invalid(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Invalid sequence: a; b");
    }

    #[test]
    fn test_close_failure_keeps_results() {
        let err = Error::CloseFailed {
            source: ConnectionError::CloseFailed {
                driver: "psu".to_string(),
                reason: "bus reset".to_string(),
            },
            results: ResultLog::new(),
        };
        assert_eq!(
            err.to_string(),
            "Session failed to close after 0 results: Failed to close driver 'psu': bus reset"
        );
    }

    #[test]
    fn test_connection_error_converts() {
        let err: Error = ConnectionError::open_failed("psu", "GPIB::1", "no listener").into();
        assert!(matches!(err, Error::Connection(_)));
        assert!(err.to_string().contains("GPIB::1"));
    }
}
