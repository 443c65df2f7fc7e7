use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error("validation run cancelled")]
    Cancelled,

    #[error("failed to write report {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write run summary {path}: {source}")]
    SummaryWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ValidateError>;
