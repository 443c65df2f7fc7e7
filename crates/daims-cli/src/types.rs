//! Result payloads the commands hand back for summary printing.

use std::path::PathBuf;

use daims_model::{Submission, SubmissionFile};
use daims_reference::LoadOutcome;
use daims_validate::ValidationRun;

/// What one `validate` run staged, found, and wrote.
pub struct ValidateResult {
    pub submission: Submission,
    /// Files staged, in catalog order, with their row counts.
    pub staged_counts: Vec<(SubmissionFile, usize)>,
    pub run: ValidationRun,
    pub error_report: PathBuf,
    pub warning_report: PathBuf,
    pub run_summary: PathBuf,
}

/// What one `load` run applied and where the snapshot landed.
pub struct LoadResult {
    pub outcome: LoadOutcome,
    pub snapshot: PathBuf,
    /// Entries in the rewritten snapshot manifest.
    pub files_pinned: usize,
}
