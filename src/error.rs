//! Error types for the phsp-cutter library.

use crate::pipeline::RunResult;
use crate::stream::SizeMismatch;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum PhspError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Header parse error: {0}")]
    HeaderParse(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Cannot open input source {path:?}: {source}")]
    OpenSource {
        path: PathBuf,
        #[source]
        source: Box<PhspError>,
    },

    #[error("Cannot create output source {path:?}: {source}")]
    CreateSink {
        path: PathBuf,
        #[source]
        source: Box<PhspError>,
    },

    #[error("Input file size or byte order mismatch (code {}): {0}", .0.code())]
    SizeCheck(SizeMismatch),

    #[error("Error copying header from input source: {0}")]
    CopyHeader(String),

    #[error("Error reading particle at byte offset {offset}: {reason}")]
    ReadFailure { offset: u64, reason: String },

    #[error("Error writing accepted record {index}: {source}")]
    RecordWrite {
        index: i64,
        #[source]
        source: Box<PhspError>,
    },

    #[error("Error updating output header after {} accepted records: {source}", .result.accepted)]
    Finalize {
        result: RunResult,
        #[source]
        source: Box<PhspError>,
    },

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, PhspError>;
