//! When-clauses gating a predicate to a subset of rows.

use daims_model::codes::{is_blank, normalize_code};
use daims_model::staging::StagedRow;
use serde::Serialize;

/// Row filter carried on conditional rules. Conditions look only at text
/// fields; matching is trimmed and case-insensitive, the same as code
/// comparisons everywhere else in the engine.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Applies to every row.
    Always,
    /// The field's value is one of the listed codes.
    FieldIn {
        field: &'static str,
        values: &'static [&'static str],
    },
    /// The field's value is none of the listed codes (blank counts as "not
    /// in" unless blank is listed).
    FieldNotIn {
        field: &'static str,
        values: &'static [&'static str],
    },
    /// The field is blank.
    FieldBlank { field: &'static str },
    /// The field is non-blank.
    FieldPresent { field: &'static str },
}

impl Condition {
    /// Whether the predicate applies to this row.
    pub fn matches(&self, row: &dyn StagedRow) -> bool {
        match self {
            Condition::Always => true,
            Condition::FieldIn { field, values } => {
                let value = normalize_code(row.text(field).unwrap_or(""));
                values.iter().any(|v| normalize_code(v) == value)
            }
            Condition::FieldNotIn { field, values } => {
                let value = normalize_code(row.text(field).unwrap_or(""));
                !values.iter().any(|v| normalize_code(v) == value)
            }
            Condition::FieldBlank { field } => is_blank(row.text(field).unwrap_or("")),
            Condition::FieldPresent { field } => !is_blank(row.text(field).unwrap_or("")),
        }
    }

    /// Field name the condition reads, if any, for catalog validation.
    pub fn field(&self) -> Option<&'static str> {
        match *self {
            Condition::Always => None,
            Condition::FieldIn { field, .. }
            | Condition::FieldNotIn { field, .. }
            | Condition::FieldBlank { field }
            | Condition::FieldPresent { field } => Some(field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daims_model::staging::AssistanceRow;

    fn row(record_type: &str, uri: &str) -> AssistanceRow {
        AssistanceRow {
            record_type: record_type.to_string(),
            uri: uri.to_string(),
            ..AssistanceRow::default()
        }
    }

    #[test]
    fn field_in_is_case_insensitive_and_trimmed() {
        let cond = Condition::FieldIn {
            field: "record_type",
            values: &["1"],
        };
        assert!(cond.matches(&row(" 1 ", "")));
        assert!(!cond.matches(&row("2", "")));
        assert!(!cond.matches(&row("", "")));
    }

    #[test]
    fn field_not_in_treats_blank_as_outside_the_set() {
        let cond = Condition::FieldNotIn {
            field: "record_type",
            values: &["1"],
        };
        assert!(!cond.matches(&row("1", "")));
        assert!(cond.matches(&row("3", "")));
        assert!(cond.matches(&row("", "")));
    }

    #[test]
    fn blank_and_present_agree_on_whitespace() {
        let blank = Condition::FieldBlank { field: "uri" };
        let present = Condition::FieldPresent { field: "uri" };
        assert!(blank.matches(&row("1", "  ")));
        assert!(!present.matches(&row("1", "  ")));
        assert!(present.matches(&row("1", "URI-1")));
    }

    #[test]
    fn unknown_fields_read_as_blank() {
        let cond = Condition::FieldPresent {
            field: "no_such_column",
        };
        assert!(!cond.matches(&row("1", "x")));
    }
}
