//! Declarative validation rules for submitted award files.
//!
//! Every check the broker runs is a data record: a rule id, a target file,
//! a severity, and a fully parameterized predicate drawn from a closed kind
//! set. The engine in `daims-validate` interprets the records; nothing in
//! this crate evaluates anything. Changing what the broker enforces means
//! editing a record in one of the per-file modules, not writing code.

pub mod catalog;
pub mod condition;
pub mod error;
mod fabs;
mod file_a;
mod file_b;
mod file_c;
pub mod predicate;
pub mod rule;

pub use catalog::RuleCatalog;
pub use condition::Condition;
pub use error::{Result, RulesError};
pub use predicate::{
    Addend, FormatKind, Predicate, RecipientIdentifier, ReferenceCheck, StateSource,
    parse_iso_date,
};
pub use rule::Rule;
