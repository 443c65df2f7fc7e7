//! Error records produced by a validation run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rule_id::RuleId;
use crate::staging::SubmissionFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fatal,
    Warning,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rule violation on one row.
///
/// `row_number` is `None` for violations about rows that should exist but do
/// not (missing SF-133 coverage, dropped carry-forward tuples). `unique_id`
/// is the rule's natural-key columns rendered as `col: value` pairs, used to
/// collapse thousands of repeats of the same fault into one grouped line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub rule_id: RuleId,
    pub severity: Severity,
    pub file: SubmissionFile,
    pub row_number: Option<u32>,
    pub field_values: Vec<(String, String)>,
    pub message: String,
    pub unique_id: String,
}

impl ValidationIssue {
    /// Report ordering: rule id, then row number with missing-row issues
    /// last, then unique id for a total order.
    pub fn sort_key(&self) -> (RuleId, u32, String) {
        (
            self.rule_id.clone(),
            self.row_number.unwrap_or(u32::MAX),
            self.unique_id.clone(),
        )
    }
}

/// End-of-run roll-up for one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub rule_id: RuleId,
    pub severity: Severity,
    pub file: SubmissionFile,
    pub violations: usize,
    /// Distinct unique-id strings among the violations.
    pub unique_id_count: usize,
}

/// A rule the engine had to skip because a dimension it joins against was
/// not loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRule {
    pub rule_id: RuleId,
    pub missing: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(rule: &str, row: Option<u32>) -> ValidationIssue {
        ValidationIssue {
            rule_id: rule.parse().unwrap(),
            severity: Severity::Fatal,
            file: SubmissionFile::A,
            row_number: row,
            field_values: vec![],
            message: String::new(),
            unique_id: String::new(),
        }
    }

    #[test]
    fn missing_row_issues_sort_after_numbered_rows() {
        let mut issues = vec![issue("A10", Some(1)), issue("A3", None), issue("A3", Some(40))];
        issues.sort_by_key(ValidationIssue::sort_key);
        let order: Vec<_> = issues.iter().map(|i| (i.rule_id.to_string(), i.row_number)).collect();
        assert_eq!(
            order,
            [
                ("A3".to_string(), Some(40)),
                ("A3".to_string(), None),
                ("A10".to_string(), Some(1)),
            ]
        );
    }
}
