#![deny(unsafe_code)]

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML manifest {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize {what}: {message}")]
    Serialize { what: String, message: String },

    #[error("invalid manifest: {message}")]
    InvalidManifest { message: String },

    #[error("duplicate dimension in manifest: {name}")]
    DuplicateDimension { name: String },

    #[error("invalid sha256 for {path}: {message}")]
    InvalidSha256 { path: PathBuf, message: String },

    #[error("invalid manifest path {path}: {message}")]
    InvalidPath { path: PathBuf, message: String },

    #[error("missing file listed in manifest: {path}")]
    MissingFile { path: PathBuf },

    #[error("unexpected file present under the snapshot dir: {path}")]
    UnexpectedFile { path: PathBuf },

    #[error("sha256 mismatch for {path} (expected {expected}, got {actual})")]
    Sha256Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("failed to parse CSV {path}: {message}")]
    Csv { path: PathBuf, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("feed {feed} is already being loaded")]
    FeedLocked { feed: String },

    #[error("artifact {artifact} failed: {message}")]
    ArtifactFailed { artifact: String, message: String },

    #[error("upstream feed unavailable: {message}")]
    UpstreamUnavailable { message: String },

    #[error("upstream reports no such file: {name}")]
    UpstreamMissing { name: String },

    #[error("upstream rejected the request (status {status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    #[error("gave up after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("load cancelled")]
    Cancelled,
}

impl ReferenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Transient faults worth retrying. Missing-file payloads and non-429
    /// rejections are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamUnavailable { .. } => true,
            Self::UpstreamRejected { status, .. } => *status == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReferenceError>;
