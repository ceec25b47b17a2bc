//! Midigen Core - event grammar codec and constrained decoder
//!
//! This crate turns structured music events into fixed-width rows of
//! vocabulary symbols and back, and drives a row-by-row generation loop
//! against an external scoring oracle, masking every sub-token to the
//! choices the grammar allows at that position.

// Module declarations
pub mod codec;
pub mod finalize;
pub mod generation;
pub mod grammar;
pub mod mask;
pub mod oracle;
pub mod prompt;
pub mod sampling;
pub mod score;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A value outside a parameter's declared range, or the wrong number of values
    #[error("Domain error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Domain {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        parameter_name: Option<String>,
        value: Option<u64>,
    },

    /// Masking and sampling disagree about what is legal
    #[error("Policy violation [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    PolicyViolation {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
    },

    /// Failure reported by the external scoring oracle
    #[error("Oracle error [{code}]: {message}\nContext: {context}")]
    Oracle {
        code: &'static str,
        message: String,
        context: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Input validation and parameter errors
    #[error("Invalid input [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    InvalidInput {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        parameter_name: Option<String>,
        value: Option<String>,
        valid_range: Option<String>,
    },

    /// Grammar schema or configuration file errors
    #[error("Configuration error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Configuration {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        config_path: Option<std::path::PathBuf>,
    },

    /// File system and I/O errors
    #[error("IO error [{code}]: {message}\nPath: {path:?}\nSuggestion: {suggestion}")]
    Io {
        code: &'static str,
        message: String,
        path: Option<std::path::PathBuf>,
        suggestion: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding of rows, events and scores
    #[error("Serialization error [{code}]: {message}")]
    Serialization {
        code: &'static str,
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a domain error for an out-of-range value
    pub fn domain<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Domain {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            parameter_name: None,
            value: None,
        }
    }

    /// Create a domain error naming the offending parameter and value
    pub fn domain_value<S1, S2, S3, S4>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        param_name: S4,
        value: u64,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        S4: Into<String>,
    {
        Self::Domain {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            parameter_name: Some(param_name.into()),
            value: Some(value),
        }
    }

    /// Create a policy violation error
    pub fn policy<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::PolicyViolation {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Wrap an opaque oracle failure
    pub fn oracle<S>(context: S, source: anyhow::Error) -> Self
    where
        S: Into<String>,
    {
        Self::Oracle {
            code: "ORACLE_FAILED",
            message: source.to_string(),
            context: context.into(),
            source: Some(source),
        }
    }

    /// Create an invalid input error with parameter validation details
    pub fn invalid_parameter<S1, S2, S3, S4, S5, S6>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        param_name: S4,
        value: S5,
        valid_range: S6,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        S4: Into<String>,
        S5: Into<String>,
        S6: Into<String>,
    {
        Self::InvalidInput {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            parameter_name: Some(param_name.into()),
            value: Some(value.into()),
            valid_range: Some(valid_range.into()),
        }
    }

    /// Create a configuration error
    pub fn configuration<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Configuration {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            config_path: None,
        }
    }

    /// Convert an I/O error and record the path it concerns
    pub fn io_at<P>(err: std::io::Error, path: P) -> Self
    where
        P: Into<std::path::PathBuf>,
    {
        match Self::from(err) {
            Self::Io {
                code,
                message,
                suggestion,
                source,
                ..
            } => Self::Io {
                code,
                message,
                path: Some(path.into()),
                suggestion,
                source,
            },
            other => other,
        }
    }

    /// Get the error code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            Self::Domain { code, .. } => code,
            Self::PolicyViolation { code, .. } => code,
            Self::Oracle { code, .. } => code,
            Self::InvalidInput { code, .. } => code,
            Self::Configuration { code, .. } => code,
            Self::Io { code, .. } => code,
            Self::Serialization { code, .. } => code,
        }
    }

    /// Whether the error indicates a registry/masking bug rather than bad input
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Self::PolicyViolation { .. })
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        let (code, suggestion) = match err.kind() {
            std::io::ErrorKind::NotFound => (
                "IO_FILE_NOT_FOUND",
                "Check that the file path is correct and the file exists",
            ),
            std::io::ErrorKind::PermissionDenied => (
                "IO_PERMISSION_DENIED",
                "Check file permissions or run with appropriate privileges",
            ),
            std::io::ErrorKind::InvalidData => (
                "IO_INVALID_DATA",
                "The file may be corrupted or in an unexpected format",
            ),
            _ => (
                "IO_UNKNOWN",
                "Check the file system and try the operation again",
            ),
        };

        Self::Io {
            code,
            message: err.to_string(),
            path: None,
            suggestion: suggestion.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            code: "JSON_INVALID",
            message: err.to_string(),
            source: err,
        }
    }
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        codec::{Event, EventCodec, Row, TimeCursor, TimedEvent},
        finalize::{Finalized, StreamFinalizer},
        generation::{
            DecodeState, EmittedRow, FinishReason, GenerationConfig, GenerationStats, Generator,
        },
        grammar::{
            midi::{MidiEvent, MidiParam},
            EventSchema, ParamRange, ParamSchema, Registry, Symbol, SymbolKind,
        },
        mask::{LegalSet, MaskPolicy, Slot},
        oracle::{HistogramOracle, ScoringOracle},
        prompt::{instrument_prompt, patch_from_name, score_prompt},
        sampling::{Sampler, SamplingParams},
        score::{detokenize, tokenize_score, Score, ScoreEvent},
        CoreError, Result,
    };
}

// Re-export key types at the crate root
pub use codec::{Event, EventCodec, Row};
pub use generation::{GenerationConfig, Generator};
pub use grammar::{Registry, Symbol};

pub mod error {
    pub use super::{CoreError, Result};
}
