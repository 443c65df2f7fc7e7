//! Catalog construction errors.

use thiserror::Error;

/// Errors raised while building the rule catalog. The catalog is static
/// data, so any of these is a defect in a rule record, not a runtime
/// condition.
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("invalid rule id '{id}'")]
    InvalidRuleId { id: String },

    #[error("duplicate rule id '{id}'")]
    DuplicateRule { id: String },

    #[error("rule '{id}' carries an invalid date '{date}'")]
    InvalidDate { id: String, date: String },
}

pub type Result<T> = std::result::Result<T, RulesError>;
