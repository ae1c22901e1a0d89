//! Error types for ctimap
//!
//! Provides structured error types with context for better debugging
//! and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

use crate::mapping::{CompileError, SchemaError};
use crate::plan::Phase;

/// The main error type for ctimap operations
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Mapping Errors
    // ==========================================================================
    #[error("Mapping schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Failed to compile document '{origin}': {source}")]
    Compile {
        origin: String,
        #[source]
        source: CompileError,
    },

    #[error("No mapping registered for document type '{type_name}'")]
    UnknownType { type_name: String },

    // ==========================================================================
    // Execution Errors
    // ==========================================================================
    #[error("Statement group '{origin}' matched nothing: a referenced object is not committed yet")]
    UnresolvedReference { origin: String },

    #[error("Transaction failed: {message}")]
    Transaction { message: String },

    #[error("Phase '{phase}' incomplete: {failed} batch(es) failed, {cancelled} batch(es) not submitted")]
    PhaseIncomplete {
        phase: Phase,
        failed: usize,
        cancelled: usize,
    },

    // ==========================================================================
    // Store Errors
    // ==========================================================================
    #[error("Failed to reach store at '{address}': {message}")]
    Connection {
        address: String,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Store rejected request: {message}")]
    Store { message: String },

    #[error("Query parse error: {message}")]
    QueryParse { message: String },

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    // ==========================================================================
    // IO Errors
    // ==========================================================================
    #[error("Failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ==========================================================================
    // Serialization Errors
    // ==========================================================================
    #[error("Failed to parse YAML: {message}")]
    YamlParseError { message: String },

    #[error("Failed to parse JSON: {message}")]
    JsonParseError { message: String },

    // ==========================================================================
    // Catch-all
    // ==========================================================================
    #[error("{0}")]
    Other(String),
}

/// Result type alias for ctimap operations
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Conversions from external error types
// =============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::YamlParseError {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonParseError {
            message: err.to_string(),
        }
    }
}

impl From<tql::ParseError> for Error {
    fn from(err: tql::ParseError) -> Self {
        Error::QueryParse {
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Error Display Helpers
// =============================================================================

impl Error {
    /// Returns a user-friendly suggestion for fixing the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::UnresolvedReference { .. } => {
                Some("Load the referenced objects in an earlier phase, or include them in the bundle")
            }
            Error::UnknownType { .. } => {
                Some("Register a mapping for the type, or remove the document from the bundle")
            }
            Error::PhaseIncomplete { .. } => {
                Some("Inspect the failed batches above; later phases were not started")
            }
            Error::Connection { .. } => Some("Check the store address and that the server is running"),
            Error::Config { .. } => Some("Check the configuration file and command-line flags"),
            _ => None,
        }
    }

    /// Returns true if the run can continue past this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Compile { .. } | Error::UnknownType { .. } | Error::UnresolvedReference { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownType {
            type_name: "x-custom".to_string(),
        };
        assert_eq!(err.to_string(), "No mapping registered for document type 'x-custom'");
    }

    #[test]
    fn test_error_suggestion() {
        let err = Error::UnresolvedReference {
            origin: "relationship--1".to_string(),
        };
        assert!(err.suggestion().is_some());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_phase_incomplete_is_fatal() {
        let err = Error::PhaseIncomplete {
            phase: Phase::Entities,
            failed: 2,
            cancelled: 0,
        };
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("entities"));
    }
}
