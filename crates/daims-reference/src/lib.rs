#![deny(unsafe_code)]

//! Reference-data backbone for the broker: the in-memory dimension store,
//! the feed load pipeline that mutates it, and the verified snapshot
//! format that persists it between runs.

pub mod diff;
pub mod error;
pub mod exports;
pub mod hash;
pub mod loader;
pub mod locks;
pub mod snapshot;
pub mod stamps;
pub mod store;
pub mod swap;
pub mod tables;
pub mod throttle;

pub use diff::{DiffCounts, RefRow, RowDiff, diff_rows};
pub use error::{ReferenceError, Result};
pub use loader::{
    ArtifactRef, ArtifactSource, FeedLoader, FetchedArtifact, LoadOptions, LoadOutcome,
    LoadRunner, LocalDirSource,
};
pub use locks::{FeedGuard, FeedLocks};
pub use snapshot::{
    MANIFEST_FILE, MANIFEST_SCHEMA, MANIFEST_SCHEMA_VERSION, Manifest, ManifestFile,
    VerifiedSnapshot, verify_and_load, write_snapshot,
};
pub use stamps::{FeedStamp, LoadStamps, LoadWindow};
pub use store::{Dimension, ReferenceStore, SamIndex, Sf133Tables, ZipTables};
pub use swap::rebuild_and_swap;
pub use throttle::{
    Clock, RetryPolicy, RollingWindowLimiter, SAM_DAILY_REQUEST_LIMIT, SystemClock,
};
