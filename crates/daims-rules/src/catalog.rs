//! Assembly and lookup for the shipped rule catalog.

use daims_model::rule_id::RuleId;
use daims_model::staging::SubmissionFile;

use crate::error::{Result, RulesError};
use crate::predicate::{Predicate, parse_iso_date};
use crate::rule::Rule;
use crate::{fabs, file_a, file_b, file_c};

/// The rule set a validation run evaluates, sorted by rule id.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    rules: Vec<Rule>,
}

impl RuleCatalog {
    /// The full catalog shipped with the broker.
    pub fn standard() -> Result<Self> {
        let mut rules = file_a::rules()?;
        rules.extend(file_b::rules()?);
        rules.extend(file_c::rules()?);
        rules.extend(fabs::rules()?);
        Self::from_rules(rules)
    }

    /// Build a catalog from explicit records. Duplicate ids and rules
    /// carrying unparseable dates are rejected here, so the engine never
    /// has to revalidate a record it pulls from the catalog.
    pub fn from_rules(mut rules: Vec<Rule>) -> Result<Self> {
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(pair) = rules.windows(2).find(|pair| pair[0].id == pair[1].id) {
            return Err(RulesError::DuplicateRule {
                id: pair[0].id.to_string(),
            });
        }
        for rule in &rules {
            check_window_dates(rule)?;
        }
        Ok(RuleCatalog { rules })
    }

    /// All rules in id order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rules targeting one submitted file, in id order.
    pub fn for_file(&self, file: SubmissionFile) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |rule| rule.file == file)
    }

    pub fn get(&self, id: &RuleId) -> Option<&Rule> {
        self.rules
            .binary_search_by(|rule| rule.id.cmp(id))
            .ok()
            .map(|index| &self.rules[index])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn check_window_dates(rule: &Rule) -> Result<()> {
    if let Predicate::RecipientRegistered {
        window_start,
        window_end,
        ..
    } = rule.predicate
    {
        for raw in [Some(window_start), window_end].into_iter().flatten() {
            if parse_iso_date(raw).is_none() {
                return Err(RulesError::InvalidDate {
                    id: rule.id.to_string(),
                    date: raw.to_string(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use daims_model::issue::Severity;
    use daims_model::staging::{
        AppropriationRow, AssistanceRow, AwardFinancialRow, ProgramBalancesRow, StagedRow,
    };
    use crate::predicate::RecipientIdentifier;

    #[test]
    fn standard_catalog_has_the_expected_shape() {
        let catalog = RuleCatalog::standard().unwrap();
        assert_eq!(catalog.len(), 69);
        assert_eq!(catalog.for_file(SubmissionFile::A).count(), 14);
        assert_eq!(catalog.for_file(SubmissionFile::B).count(), 11);
        assert_eq!(catalog.for_file(SubmissionFile::C).count(), 11);
        assert_eq!(catalog.for_file(SubmissionFile::Fabs).count(), 33);
    }

    #[test]
    fn rules_are_sorted_and_unique() {
        let catalog = RuleCatalog::standard().unwrap();
        for pair in catalog.rules().windows(2) {
            assert!(pair[0].id < pair[1].id, "{} before {}", pair[0].id, pair[1].id);
        }
    }

    #[test]
    fn lookup_by_id() {
        let catalog = RuleCatalog::standard().unwrap();
        let a2: RuleId = "A2".parse().unwrap();
        assert!(catalog.get(&a2).is_some());
        let absent: RuleId = "A99".parse().unwrap();
        assert!(catalog.get(&absent).is_none());
    }

    /// Every column a rule reads, surfaces, or keys on must resolve on the
    /// staging type for the rule's file. A typo in a rule record would
    /// otherwise surface as a silently-blank column at runtime.
    #[test]
    fn every_rule_column_resolves_on_its_staging_type() {
        let catalog = RuleCatalog::standard().unwrap();
        for rule in catalog.rules() {
            let row: Box<dyn StagedRow> = match rule.file {
                SubmissionFile::A => Box::new(AppropriationRow::default()),
                SubmissionFile::B => Box::new(ProgramBalancesRow::default()),
                SubmissionFile::C => Box::new(AwardFinancialRow::default()),
                SubmissionFile::Fabs => Box::new(AssistanceRow::default()),
            };
            let mut columns = rule.predicate.referenced_fields();
            columns.extend_from_slice(rule.fields);
            columns.extend_from_slice(rule.unique_key);
            for column in columns {
                assert!(
                    row.field(column).is_some(),
                    "rule {} references unknown column {column}",
                    rule.id
                );
            }
        }
    }

    #[test]
    fn every_rule_carries_a_message_and_unique_key() {
        let catalog = RuleCatalog::standard().unwrap();
        for rule in catalog.rules() {
            assert!(!rule.message.is_empty(), "rule {} has no message", rule.id);
            assert!(
                !rule.unique_key.is_empty(),
                "rule {} has no unique key",
                rule.id
            );
        }
    }

    #[test]
    fn only_the_deletion_rules_opt_in_to_deletes() {
        let catalog = RuleCatalog::standard().unwrap();
        let opted: Vec<String> = catalog
            .rules()
            .iter()
            .filter(|rule| rule.applies_to_deletes)
            .map(|rule| rule.id.to_string())
            .collect();
        assert_eq!(opted, vec!["FABS1", "FABS2.2"]);
    }

    #[test]
    fn warning_rules_match_the_published_severities() {
        let catalog = RuleCatalog::standard().unwrap();
        let warnings: Vec<String> = catalog
            .rules()
            .iter()
            .filter(|rule| rule.severity == Severity::Warning)
            .map(|rule| rule.id.to_string())
            .collect();
        assert_eq!(
            warnings,
            vec![
                "B9", "C8", "C11", "C20", "C23.1", "C23.2", "C27", "FABS10", "FABS13",
                "FABS31.2", "FABS31.4.2", "FABS31.4.3", "FABS33.1", "FABS33.2", "FABS41",
                "FABS43", "FABS44", "FABS46",
            ]
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let rule = || {
            Rule::new(
                "A2",
                SubmissionFile::A,
                Severity::Fatal,
                Predicate::Unenforced,
            )
            .unwrap()
        };
        let err = RuleCatalog::from_rules(vec![rule(), rule()]).unwrap_err();
        assert!(matches!(err, RulesError::DuplicateRule { .. }));
    }

    #[test]
    fn malformed_window_dates_are_rejected() {
        let rule = Rule::new(
            "FABS99",
            SubmissionFile::Fabs,
            Severity::Warning,
            Predicate::RecipientRegistered {
                assistance_types: &["06"],
                window_start: "04/04/2022",
                window_end: None,
                identifier: RecipientIdentifier::UeiOnly,
            },
        )
        .unwrap();
        let err = RuleCatalog::from_rules(vec![rule]).unwrap_err();
        assert!(matches!(err, RulesError::InvalidDate { .. }));
    }
}
