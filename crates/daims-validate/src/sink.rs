//! Collection, ordering, and reporting of validation issues.
//!
//! The sink de-duplicates as rules push: a rule reports at most one issue
//! per staged row, and issues about rows that do not exist (missing SF-133
//! coverage, dropped carry-forward groups) de-duplicate on their unique id
//! instead. Reading back is always ordered by rule id, then row number with
//! missing-row issues last, so two runs over the same submission produce
//! byte-identical reports.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};

use daims_model::issue::{RuleSummary, Severity, SkippedRule, ValidationIssue};
use daims_model::rule_id::RuleId;
use daims_model::staging::SubmissionFile;

use crate::error::{Result, ValidateError};

#[derive(Debug, Default)]
pub struct ErrorSink {
    issues: Vec<ValidationIssue>,
    seen: BTreeSet<(RuleId, Option<u32>, String)>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the issue unless the same rule already reported this row.
    /// Issues with no row number are keyed by unique id, so each missing
    /// group or TAS is still reported exactly once.
    pub fn push(&mut self, issue: ValidationIssue) {
        let tag = if issue.row_number.is_none() {
            issue.unique_id.clone()
        } else {
            String::new()
        };
        if self.seen.insert((issue.rule_id.clone(), issue.row_number, tag)) {
            self.issues.push(issue);
        }
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Finishes the run: sorts the issues into report order and rolls up
    /// the per-rule summaries.
    pub fn into_run(self, skipped: Vec<SkippedRule>) -> ValidationRun {
        let mut issues = self.issues;
        issues.sort_by_key(ValidationIssue::sort_key);

        let mut by_rule: BTreeMap<RuleId, RollingSummary> = BTreeMap::new();
        for issue in &issues {
            let entry = by_rule
                .entry(issue.rule_id.clone())
                .or_insert_with(|| RollingSummary {
                    severity: issue.severity,
                    file: issue.file,
                    violations: 0,
                    unique_ids: BTreeSet::new(),
                });
            entry.violations += 1;
            entry.unique_ids.insert(issue.unique_id.clone());
        }
        let summaries = by_rule
            .into_iter()
            .map(|(rule_id, rolling)| RuleSummary {
                rule_id,
                severity: rolling.severity,
                file: rolling.file,
                violations: rolling.violations,
                unique_id_count: rolling.unique_ids.len(),
            })
            .collect();

        ValidationRun {
            issues,
            summaries,
            skipped,
        }
    }
}

struct RollingSummary {
    severity: Severity,
    file: SubmissionFile,
    violations: usize,
    unique_ids: BTreeSet<String>,
}

/// Everything one validation pass produced: ordered issues, per-rule
/// summaries, and the rules skipped for missing reference dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRun {
    pub issues: Vec<ValidationIssue>,
    pub summaries: Vec<RuleSummary>,
    pub skipped: Vec<SkippedRule>,
}

impl ValidationRun {
    pub fn fatal_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Fatal)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Warning)
            .count()
    }

    pub fn has_fatal(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.severity == Severity::Fatal)
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Writes the issue report as CSV with a stable column order. Passing a
/// severity writes only that severity, which is how the separate error and
/// warning reports are produced.
pub fn write_report_csv(
    path: &Path,
    issues: &[ValidationIssue],
    severity: Option<Severity>,
) -> Result<()> {
    let report_err = |source: csv::Error| ValidateError::ReportWrite {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(report_err)?;
    writer
        .write_record([
            "file",
            "rule_id",
            "severity",
            "row_number",
            "unique_id",
            "fields",
            "message",
        ])
        .map_err(report_err)?;
    for issue in issues {
        if severity.is_some_and(|wanted| issue.severity != wanted) {
            continue;
        }
        let fields = issue
            .field_values
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("; ");
        writer
            .write_record([
                issue.file.as_str(),
                &issue.rule_id.to_string(),
                issue.severity.as_str(),
                &issue
                    .row_number
                    .map(|row| row.to_string())
                    .unwrap_or_default(),
                &issue.unique_id,
                &fields,
                &issue.message,
            ])
            .map_err(report_err)?;
    }
    writer
        .flush()
        .map_err(|source| report_err(csv::Error::from(source)))?;
    Ok(())
}

/// Serializes the whole run (issues, summaries, skipped rules) as pretty
/// JSON for downstream tooling.
pub fn write_run_json(path: &Path, run: &ValidationRun) -> Result<()> {
    let summary_err = |source: serde_json::Error| ValidateError::SummaryWrite {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(|source| summary_err(serde_json::Error::io(source)))?;
    serde_json::to_writer_pretty(BufWriter::new(file), run).map_err(summary_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(rule: &str, row: Option<u32>, unique: &str, severity: Severity) -> ValidationIssue {
        ValidationIssue {
            rule_id: rule.parse().unwrap(),
            severity,
            file: SubmissionFile::A,
            row_number: row,
            field_values: vec![("tas".to_string(), unique.to_string())],
            message: format!("{rule} failed"),
            unique_id: unique.to_string(),
        }
    }

    #[test]
    fn a_rule_reports_each_row_once() {
        let mut sink = ErrorSink::new();
        sink.push(issue("A3", Some(4), "tas: X", Severity::Fatal));
        sink.push(issue("A3", Some(4), "tas: X", Severity::Fatal));
        sink.push(issue("A3", Some(5), "tas: X", Severity::Fatal));
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn missing_row_issues_are_keyed_by_unique_id() {
        let mut sink = ErrorSink::new();
        sink.push(issue("A33", None, "tas: 001", Severity::Fatal));
        sink.push(issue("A33", None, "tas: 002", Severity::Fatal));
        sink.push(issue("A33", None, "tas: 001", Severity::Fatal));
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn run_is_ordered_by_rule_then_row_with_missing_rows_last() {
        let mut sink = ErrorSink::new();
        sink.push(issue("A10", Some(2), "tas: A", Severity::Fatal));
        sink.push(issue("A9", Some(5), "tas: B", Severity::Fatal));
        sink.push(issue("A9", None, "tas: C", Severity::Fatal));
        sink.push(issue("A9", Some(1), "tas: D", Severity::Fatal));

        let run = sink.into_run(Vec::new());
        let order: Vec<(String, Option<u32>)> = run
            .issues
            .iter()
            .map(|issue| (issue.rule_id.to_string(), issue.row_number))
            .collect();
        assert_eq!(
            order,
            vec![
                ("A9".to_string(), Some(1)),
                ("A9".to_string(), Some(5)),
                ("A9".to_string(), None),
                ("A10".to_string(), Some(2)),
            ]
        );
    }

    #[test]
    fn summaries_count_violations_and_distinct_unique_ids() {
        let mut sink = ErrorSink::new();
        sink.push(issue("C23.1", Some(1), "fain: F1", Severity::Warning));
        sink.push(issue("C23.1", Some(2), "fain: F1", Severity::Warning));
        sink.push(issue("C23.1", Some(3), "fain: F2", Severity::Warning));
        sink.push(issue("A3", Some(1), "tas: T", Severity::Fatal));

        let run = sink.into_run(Vec::new());
        assert_eq!(run.summaries.len(), 2);
        assert_eq!(run.summaries[0].rule_id.to_string(), "A3");
        assert_eq!(run.summaries[1].rule_id.to_string(), "C23.1");
        assert_eq!(run.summaries[1].violations, 3);
        assert_eq!(run.summaries[1].unique_id_count, 2);
        assert_eq!(run.fatal_count(), 1);
        assert_eq!(run.warning_count(), 3);
        assert!(run.has_fatal());
        assert!(!run.is_clean());
    }

    #[test]
    fn csv_report_has_stable_columns_and_honors_the_severity_filter() {
        let mut sink = ErrorSink::new();
        sink.push(issue("A3", Some(1), "tas: T", Severity::Fatal));
        sink.push(issue("C8", Some(2), "fain: F", Severity::Warning));
        let run = sink.into_run(Vec::new());

        let dir = tempfile::tempdir().unwrap();
        let all = dir.path().join("report.csv");
        write_report_csv(&all, &run.issues, None).unwrap();
        let text = std::fs::read_to_string(&all).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "file,rule_id,severity,row_number,unique_id,fields,message"
        );
        assert_eq!(lines.count(), 2);

        let warnings = dir.path().join("warnings.csv");
        write_report_csv(&warnings, &run.issues, Some(Severity::Warning)).unwrap();
        let text = std::fs::read_to_string(&warnings).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("C8"));
        assert!(!text.contains("A3"));
    }

    #[test]
    fn run_json_round_trips() {
        let mut sink = ErrorSink::new();
        sink.push(issue("A3", Some(1), "tas: T", Severity::Fatal));
        let run = sink.into_run(vec![SkippedRule {
            rule_id: "A9".parse().unwrap(),
            missing: "sf133".to_string(),
        }]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        write_run_json(&path, &run).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let round: ValidationRun = serde_json::from_str(&text).unwrap();
        assert_eq!(round.issues, run.issues);
        assert_eq!(round.summaries, run.summaries);
        assert_eq!(round.skipped, run.skipped);
    }
}
