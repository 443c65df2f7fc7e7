//! One validation rule as a data record.

use serde::Serialize;

use daims_model::issue::Severity;
use daims_model::rule_id::RuleId;
use daims_model::staging::SubmissionFile;

use crate::error::{Result, RulesError};
use crate::predicate::Predicate;

/// A fully parameterized rule. Everything the engine, the report, and the
/// catalog listing need lives on the record; no rule carries code of its
/// own.
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    pub id: RuleId,
    pub file: SubmissionFile,
    pub severity: Severity,
    pub predicate: Predicate,
    /// Columns surfaced next to each violation in the report.
    pub fields: &'static [&'static str],
    /// Columns whose values group repeated violations of this rule.
    pub unique_key: &'static [&'static str],
    /// Message template; `{name}` substitutes the row's value for `name`.
    pub message: &'static str,
    /// FABS deletion rows are skipped unless the rule opts in.
    pub applies_to_deletes: bool,
}

impl Rule {
    pub fn new(
        id: &str,
        file: SubmissionFile,
        severity: Severity,
        predicate: Predicate,
    ) -> Result<Self> {
        let id = id.parse::<RuleId>().map_err(|_| RulesError::InvalidRuleId {
            id: id.to_string(),
        })?;
        Ok(Rule {
            id,
            file,
            severity,
            predicate,
            fields: &[],
            unique_key: &[],
            message: "",
            applies_to_deletes: false,
        })
    }

    pub fn fields(mut self, fields: &'static [&'static str]) -> Self {
        self.fields = fields;
        self
    }

    pub fn unique_key(mut self, unique_key: &'static [&'static str]) -> Self {
        self.unique_key = unique_key;
        self
    }

    pub fn message(mut self, message: &'static str) -> Self {
        self.message = message;
        self
    }

    pub fn applies_to_deletes(mut self) -> Self {
        self.applies_to_deletes = true;
        self
    }

    /// Render the message template against the values surfaced for one
    /// violation. Placeholders with no matching value are left intact so a
    /// template mistake shows up in the report rather than vanishing.
    pub fn render_message(&self, values: &[(String, String)]) -> String {
        let mut rendered = String::with_capacity(self.message.len());
        let mut rest = self.message;
        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                rendered.push('{');
                rest = after;
                continue;
            };
            let name = &after[..end];
            match values.iter().find(|(key, _)| key == name) {
                Some((_, value)) => rendered.push_str(value),
                None => {
                    rendered.push('{');
                    rendered.push_str(name);
                    rendered.push('}');
                }
            }
            rest = &after[end + 1..];
        }
        rendered.push_str(rest);
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rule() -> Rule {
        Rule::new(
            "A2",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::Unenforced,
        )
        .unwrap()
        .fields(&["tas"])
        .unique_key(&["tas"])
        .message("TotalBudgetaryResources_CPE {total_budgetary_resources_cpe} does not match")
    }

    #[test]
    fn new_rejects_malformed_ids() {
        let err = Rule::new(
            "not a rule id",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::Unenforced,
        )
        .unwrap_err();
        assert!(matches!(err, RulesError::InvalidRuleId { .. }));
    }

    #[test]
    fn render_substitutes_matching_values() {
        let rule = sample_rule();
        let values = vec![(
            "total_budgetary_resources_cpe".to_string(),
            "100.00".to_string(),
        )];
        assert_eq!(
            rule.render_message(&values),
            "TotalBudgetaryResources_CPE 100.00 does not match"
        );
    }

    #[test]
    fn render_leaves_unknown_placeholders_intact() {
        let rule = sample_rule();
        assert_eq!(
            rule.render_message(&[]),
            "TotalBudgetaryResources_CPE {total_budgetary_resources_cpe} does not match"
        );
    }

    #[test]
    fn render_tolerates_unclosed_brace() {
        let rule = Rule::new(
            "A2",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::Unenforced,
        )
        .unwrap()
        .message("dangling {brace");
        assert_eq!(rule.render_message(&[]), "dangling {brace");
    }
}
