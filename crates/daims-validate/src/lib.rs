//! Validation engine for staged broker submissions.
//!
//! The crate joins the three inputs a run needs: the rule catalog from
//! `daims-rules`, the staged rows and published history from `daims-model`,
//! and the reference dimensions from `daims-reference`. [`validate`] runs
//! the whole catalog and returns a [`ValidationRun`]: issues ordered by
//! rule id then row number, per-rule summaries, and the rules skipped
//! because a reference dimension was not loaded. Cross-file and
//! cross-submission lookups are memoized per run by [`Resolver`], so a rule
//! never re-reads the published store or re-aggregates File B.

pub mod engine;
pub mod error;
pub mod resolver;
pub mod sink;

pub use engine::{RuleEngine, validate};
pub use error::{Result, ValidateError};
pub use resolver::{PublishedAwards, Resolver};
pub use sink::{ErrorSink, ValidationRun, write_report_csv, write_run_json};
