//! Ingest for submitted award files.
//!
//! Reads agency CSV uploads through Polars with every column typed as text,
//! resolves the published DAIMS header names onto staging columns, and
//! produces the typed staging rows the validation engine consumes.

pub mod error;
pub mod layout;
pub mod read;
pub mod stage;

pub use error::{IngestError, Result};
pub use layout::{ColumnSpec, layout_for, resolve_columns};
pub use read::{MAX_FILE_SIZE_BYTES, STREAMING_THRESHOLD_BYTES, read_submitted_csv};
pub use stage::{
    ingest_file, stage_appropriations, stage_assistance, stage_award_financial,
    stage_program_balances,
};
