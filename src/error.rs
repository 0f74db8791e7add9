//! Error types and exit codes for scanbridge.
//!
//! Only structural problems surface as [`Error`]. Per-file diagnostics and
//! engine faults are absorbed into the result document as processing errors
//! (see [`crate::result::ProcessingError`]).

use thiserror::Error;

/// Errors that abort a whole batch.
#[derive(Error, Debug)]
pub enum Error {
    #[error("The \"{field}\" field was not set.")]
    MissingField { field: &'static str },

    #[error("The \"runDataPerLanguage\" field didn't have any languages listed with files to scan.")]
    NoLanguages,

    #[error("The \"minimumTokens\" field was not set to a positive number for language: {language}")]
    NonPositiveThreshold { language: String },

    #[error("The language \"{language}\" is not recognized. Supported languages: {supported}")]
    UnknownLanguage { language: String, supported: String },

    #[error(
        "Failed to load the custom rule-set \"{reference}\". Make sure the resource is a valid \
         rule-set file on disk or a standard rule-set reference.\n{reason}"
    )]
    RuleSetLoad { reference: String, reason: String },

    #[error("Unexpected error while resolving rules: {0}")]
    RuleResolution(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Could not read \"{path}\": {source}")]
    ReadInput {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse \"{path}\": {source}")]
    ParseInput {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Exit code reported by the command line tool:
    /// - 2: structural, configuration, or rule-set errors
    /// - 3: IO and document (de)serialization errors
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ReadInput { .. } | Self::ParseInput { .. } | Self::Io(_) | Self::Json(_) => 3,
            _ => 2,
        }
    }
}

/// Result type alias for scanbridge operations.
pub type Result<T> = std::result::Result<T, Error>;
