//! Error types and error code constants for eventlens.
//!
//! This module provides a unified error type (`EventlensError`) that bridges
//! domain-specific errors from different subsystems (indexing, resolution,
//! configuration) into a common format suitable for JSON output.
//!
//! ## Error Code Mapping
//!
//! Exit codes:
//! - `2`: Invalid arguments or configuration (bad input from caller)
//! - `3`: Resolution errors (unit not found, circular reference)
//! - `4`: Parse errors (a source file could not be parsed)
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! ## Design
//!
//! - **Unified type**: `EventlensError` is the single error type for CLI output
//! - **Bridging**: `impl From<X> for EventlensError` bridges domain errors
//! - **Code mapping**: `OutputErrorCode` provides stable integer codes for JSON

use std::fmt;

use thiserror::Error;

use crate::filter::CriterionError;
use crate::workspace::WorkspaceError;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output.
///
/// These codes map to CLI exit codes and appear in JSON error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments or configuration from caller.
    InvalidArguments = 2,
    /// Resolution errors (unit not found, circular reference).
    ResolutionError = 3,
    /// Source files that could not be parsed.
    ParseError = 4,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
///
/// All subsystem errors are converted to this type before being rendered as
/// JSON output.
#[derive(Debug, Error)]
pub enum EventlensError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Invalid collector or component configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// No unit is indexed under the requested name.
    #[error("unit not found: {fqn}")]
    UnitNotFound { fqn: String },

    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// Resolution failed.
    #[error("resolution error: {message}")]
    ResolutionError { message: String },

    /// Resolution re-entered a node it was already resolving.
    #[error("circular reference: {}", .chain.join(" -> "))]
    CircularReference { chain: Vec<String> },

    /// A source file could not be parsed.
    #[error("parse error in {file}: {message}")]
    ParseError { file: String, message: String },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&EventlensError> for OutputErrorCode {
    fn from(err: &EventlensError) -> Self {
        match err {
            EventlensError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            EventlensError::InvalidConfig { .. } => OutputErrorCode::InvalidArguments,
            EventlensError::UnitNotFound { .. } => OutputErrorCode::ResolutionError,
            EventlensError::FileNotFound { .. } => OutputErrorCode::ResolutionError,
            EventlensError::ResolutionError { .. } => OutputErrorCode::ResolutionError,
            EventlensError::CircularReference { .. } => OutputErrorCode::ResolutionError,
            EventlensError::ParseError { .. } => OutputErrorCode::ParseError,
            EventlensError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<EventlensError> for OutputErrorCode {
    fn from(err: EventlensError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Bridge: CriterionError -> EventlensError
// ============================================================================

impl From<CriterionError> for EventlensError {
    fn from(err: CriterionError) -> Self {
        EventlensError::InvalidConfig {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Bridge: WorkspaceError -> EventlensError
// ============================================================================

impl From<WorkspaceError> for EventlensError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::RootNotFound { path } => EventlensError::FileNotFound {
                path: path.to_string_lossy().into_owned(),
            },
            WorkspaceError::InvalidGlob { pattern, message } => EventlensError::InvalidArguments {
                message: format!("invalid exclude pattern '{}': {}", pattern, message),
                details: None,
            },
            WorkspaceError::Io(io_err) => EventlensError::InternalError {
                message: format!("IO error: {}", io_err),
            },
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl EventlensError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        EventlensError::InvalidArguments {
            message: message.into(),
            details: None,
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        EventlensError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a unit not found error.
    pub fn unit_not_found(fqn: impl Into<String>) -> Self {
        EventlensError::UnitNotFound { fqn: fqn.into() }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        EventlensError::FileNotFound { path: path.into() }
    }

    /// Create a parse error.
    pub fn parse_error(file: impl Into<String>, message: impl Into<String>) -> Self {
        EventlensError::ParseError {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        EventlensError::InternalError {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod error_code_mapping {
        use super::*;

        #[test]
        fn unit_not_found_maps_to_resolution_error() {
            let err = EventlensError::unit_not_found("App\\Missing");
            assert_eq!(
                OutputErrorCode::from(&err),
                OutputErrorCode::ResolutionError
            );
            assert_eq!(err.error_code().code(), 3);
        }

        #[test]
        fn invalid_config_maps_to_invalid_arguments() {
            let err = EventlensError::invalid_config("unknown collector 'x'");
            assert_eq!(err.error_code(), OutputErrorCode::InvalidArguments);
            assert_eq!(err.error_code().code(), 2);
        }

        #[test]
        fn parse_error_maps_to_parse_error() {
            let err = EventlensError::parse_error("src/Broken.php", "syntax error");
            assert_eq!(err.error_code().code(), 4);
        }

        #[test]
        fn circular_reference_maps_to_resolution_error() {
            let err = EventlensError::CircularReference {
                chain: vec!["node_1".to_string(), "node_2".to_string()],
            };
            assert_eq!(err.error_code(), OutputErrorCode::ResolutionError);
        }

        #[test]
        fn internal_error_maps_to_internal_error() {
            let err = EventlensError::internal("unexpected state");
            assert_eq!(err.error_code().code(), 10);
        }

        #[test]
        fn criterion_error_bridges_to_invalid_config() {
            let err: EventlensError = CriterionError::UnknownCollector {
                name: "controller".to_string(),
            }
            .into();
            assert!(matches!(err, EventlensError::InvalidConfig { .. }));
            assert_eq!(
                err.to_string(),
                "invalid configuration: unknown collector 'controller'"
            );
        }
    }

    mod error_display {
        use super::*;

        #[test]
        fn circular_reference_display() {
            let err = EventlensError::CircularReference {
                chain: vec!["node_1".to_string(), "node_2".to_string(), "node_1".to_string()],
            };
            assert_eq!(
                err.to_string(),
                "circular reference: node_1 -> node_2 -> node_1"
            );
        }

        #[test]
        fn invalid_arguments_display() {
            let err = EventlensError::invalid_args("missing field");
            assert_eq!(err.to_string(), "invalid arguments: missing field");
        }
    }

    #[test]
    fn code_values_are_stable() {
        assert_eq!(OutputErrorCode::InvalidArguments.code(), 2);
        assert_eq!(OutputErrorCode::ResolutionError.code(), 3);
        assert_eq!(OutputErrorCode::ParseError.code(), 4);
        assert_eq!(OutputErrorCode::InternalError.code(), 10);
        assert_eq!(format!("{}", OutputErrorCode::InternalError), "10");
    }
}
