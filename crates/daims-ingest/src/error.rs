//! Error types for submitted file ingest.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading and staging a submitted file.
#[derive(Debug, Error)]
pub enum IngestError {
    // === File system errors ===
    /// Submitted file not found.
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Failed to read the submitted file.
    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Submitted file is over the size ceiling.
    #[error("file {path} is {size} bytes, over the {max_size} byte limit")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// File is not UTF-8 encoded.
    #[error("unsupported encoding in {path}: {encoding} (UTF-8 required)")]
    UnsupportedEncoding {
        path: PathBuf,
        encoding: &'static str,
    },

    // === CSV parsing errors ===
    /// Failed to parse CSV with Polars.
    #[error("failed to parse CSV {path}: {message}")]
    CsvParse { path: PathBuf, message: String },

    /// CSV file is empty.
    #[error("CSV file is empty: {path}")]
    EmptyCsv { path: PathBuf },

    /// Failed to detect a header row.
    #[error("could not detect header row in {path}")]
    NoHeaderDetected { path: PathBuf },

    /// A header cell is blank.
    #[error("blank column name in {path}")]
    EmptyColumnName { path: PathBuf },

    // === Layout errors ===
    /// Required columns absent from the submitted header row.
    #[error("file {file} at {path} is missing required columns: {}", columns.join(", "))]
    MissingColumns {
        file: &'static str,
        path: PathBuf,
        columns: Vec<String>,
    },

    /// Two submitted headers resolve onto the same staging column.
    #[error("header '{duplicate}' in {path} duplicates '{original}': both map to {staging}")]
    DuplicateColumn {
        path: PathBuf,
        duplicate: String,
        original: String,
        staging: &'static str,
    },

    // === DataFrame errors ===
    /// Failed DataFrame operation.
    #[error("DataFrame operation failed: {message}")]
    DataFrame { message: String },
}

impl From<polars::prelude::PolarsError> for IngestError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        IngestError::DataFrame {
            message: err.to_string(),
        }
    }
}

/// Result type alias for ingest operations.
pub type Result<T> = std::result::Result<T, IngestError>;
