//! Rule evaluation over a staged submission.
//!
//! Rules run in catalog (rule id) order against the staged rows of their
//! file, so two runs over the same submission produce identical issue sets.
//! Grouped and cross-file checks build one aggregation per rule and join
//! resolver views instead of issuing per-row lookups. A rule whose
//! reference dimension is not ready is skipped with one engine warning and
//! recorded on the run; it never fails the run. Cancellation is checked
//! between rules and aborts with no partial error set.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use daims_model::cancel::CancelToken;
use daims_model::codes::{is_blank, normalize_code, pad_left_zero};
use daims_model::issue::{SkippedRule, ValidationIssue};
use daims_model::money::{Money, MoneyCell};
use daims_model::reference::MULTIPLE_DISTRICTS;
use daims_model::staging::{
    AssistanceRow, AwardFinancialRow, StagedRow, StagedSubmission, SubmissionFile,
};
use daims_reference::store::Dimension;
use daims_rules::catalog::RuleCatalog;
use daims_rules::condition::Condition;
use daims_rules::predicate::{
    Addend, FormatKind, Predicate, RecipientIdentifier, ReferenceCheck, StateSource,
    parse_iso_date,
};
use daims_rules::rule::Rule;

use crate::error::{Result, ValidateError};
use crate::resolver::{Resolver, combo_key};
use crate::sink::{ErrorSink, ValidationRun};

/// Runs the catalog against one staged submission and returns the finished
/// run. Convenience over [`RuleEngine::run`] for hosts that validate in one
/// call.
pub fn validate<'a>(
    catalog: &RuleCatalog,
    staged: &'a StagedSubmission,
    resolver: &'a Resolver<'a>,
    cancel: &CancelToken,
) -> Result<ValidationRun> {
    RuleEngine::new(staged, resolver).run(catalog, cancel)
}

/// Interprets rule records against staged rows. The engine owns no rule
/// logic of its own: every check is parameterized by its predicate, and
/// adding a rule to the catalog adds no code here.
pub struct RuleEngine<'a> {
    staged: &'a StagedSubmission,
    resolver: &'a Resolver<'a>,
}

impl<'a> RuleEngine<'a> {
    pub fn new(staged: &'a StagedSubmission, resolver: &'a Resolver<'a>) -> Self {
        Self { staged, resolver }
    }

    /// Evaluates every rule in the catalog. Rules whose file has no staged
    /// rows are no-ops; rules whose reference dimension is not ready are
    /// each skipped with one engine warning and recorded on the run.
    pub fn run(&self, catalog: &RuleCatalog, cancel: &CancelToken) -> Result<ValidationRun> {
        let mut sink = ErrorSink::new();
        let mut skipped = Vec::new();
        for rule in catalog.rules() {
            if cancel.is_cancelled() {
                return Err(ValidateError::Cancelled);
            }
            if self.staged.row_count(rule.file) == 0 {
                continue;
            }
            if let Some(dimension) = required_dimension(&rule.predicate)
                && !self.resolver.dimension_ready(dimension)
            {
                warn!(
                    rule = %rule.id,
                    dimension = dimension.as_str(),
                    "reference dimension not available; rule skipped"
                );
                skipped.push(SkippedRule {
                    rule_id: rule.id.clone(),
                    missing: dimension.as_str().to_string(),
                });
                continue;
            }
            self.apply_rule(rule, &mut sink);
        }
        Ok(sink.into_run(skipped))
    }

    fn apply_rule(&self, rule: &Rule, sink: &mut ErrorSink) {
        match rule.predicate {
            Predicate::SumEquals { target, addends } => {
                self.check_sum_equals(rule, target, addends, sink);
            }
            Predicate::GroupSumEquals {
                group_by,
                target,
                addends,
            } => self.check_group_sum_equals(rule, group_by, target, addends, sink),
            Predicate::FieldsEqual { left, right } => {
                self.check_fields_equal(rule, left, right, sink);
            }
            Predicate::DomainCheck {
                field,
                allowed,
                allow_blank,
            } => self.check_domain(rule, field, allowed, allow_blank, sink),
            Predicate::FormatCheck { field, kind } => self.check_format(rule, field, kind, sink),
            Predicate::RequireWhen { field, when } => {
                self.check_require_when(rule, field, when, sink);
            }
            Predicate::ForbidWhen { field, when } => {
                self.check_forbid_when(rule, field, when, sink);
            }
            Predicate::MustBeZeroWhen { field, when } => {
                self.check_must_be_zero_when(rule, field, when, sink);
            }
            Predicate::AnyFieldPresent { fields, when } => {
                self.check_any_field_present(rule, fields, when, sink);
            }
            Predicate::UniqueKey { fields } => self.check_unique_key(rule, fields, sink),
            Predicate::TasAvailabilityCoversYear => self.check_tas_availability(rule, sink),
            Predicate::ReferenceExists(check) => self.check_reference_exists(rule, check, sink),
            Predicate::CountryNotTerritory { field } => {
                self.check_country_not_territory(rule, field, sink);
            }
            Predicate::CfdaActiveOnActionDate { when } => self.check_cfda_active(rule, when, sink),
            Predicate::RecipientRegistered {
                assistance_types,
                window_start,
                window_end,
                identifier,
            } => self.check_recipient_registered(
                rule,
                assistance_types,
                window_start,
                window_end,
                identifier,
                sink,
            ),
            Predicate::CongressionalDistrictMatchesZip {
                district_field,
                zip_field,
                state,
            } => self.check_congressional_district(rule, district_field, zip_field, state, sink),
            Predicate::Sf133SumMatches { field, lines } => {
                self.check_sf133_sum(rule, field, lines, sink);
            }
            Predicate::TasInSf133 => self.check_tas_in_sf133(rule, sink),
            Predicate::CrossFileCombosExist { fields } => {
                self.check_cross_file_combos(rule, fields, sink);
            }
            Predicate::CrossFileSums { key_field } => {
                self.check_cross_file_sums(rule, key_field, sink);
            }
            Predicate::FabsAwardExists { key_field, when } => {
                self.check_fabs_award_exists(rule, key_field, when, sink);
            }
            Predicate::CarryForward {
                group_by,
                outlay_field,
                exempt_when_blank,
                prior_when,
            } => self.check_carry_forward(
                rule,
                group_by,
                outlay_field,
                exempt_when_blank,
                prior_when,
                sink,
            ),
            Predicate::CorrectionMatchesPrior { key_field } => {
                self.check_prior_reference(rule, key_field, false, sink);
            }
            Predicate::DeleteMatchesPrior { key_field } => {
                self.check_prior_reference(rule, key_field, true, sink);
            }
            Predicate::Unenforced => {}
        }
    }

    // ------------------------------------------------------------------
    // Row access
    // ------------------------------------------------------------------

    /// Staged rows the rule applies to. FABS deletion rows are excluded
    /// unless the rule opts in.
    fn rows(&self, rule: &Rule) -> Vec<&'a dyn StagedRow> {
        match rule.file {
            SubmissionFile::A => dyn_rows(&self.staged.appropriations),
            SubmissionFile::B => dyn_rows(&self.staged.program_balances),
            SubmissionFile::C => dyn_rows(&self.staged.award_financial),
            SubmissionFile::Fabs => self
                .assistance_rows(rule.applies_to_deletes)
                .map(|row| row as &dyn StagedRow)
                .collect(),
        }
    }

    fn assistance_rows(
        &self,
        include_deletes: bool,
    ) -> impl Iterator<Item = &'a AssistanceRow> {
        self.staged
            .assistance
            .iter()
            .filter(move |row| include_deletes || !row.cdi.is_delete())
    }

    // ------------------------------------------------------------------
    // Issue construction
    // ------------------------------------------------------------------

    /// Builds the issue record: the unique id from the rule's key columns
    /// and the message rendered against the surfaced values plus the key
    /// values.
    fn build_issue(
        &self,
        rule: &Rule,
        row_number: Option<u32>,
        field_values: Vec<(String, String)>,
        key_values: Vec<(String, String)>,
    ) -> ValidationIssue {
        let unique_id = render_unique_id(&key_values);
        let mut template = field_values.clone();
        for pair in key_values {
            if !template.iter().any(|(name, _)| *name == pair.0) {
                template.push(pair);
            }
        }
        let message = rule.render_message(&template);
        ValidationIssue {
            rule_id: rule.id.clone(),
            severity: rule.severity,
            file: rule.file,
            row_number,
            field_values,
            message,
            unique_id,
        }
    }

    /// Issue on one staged row: the rule's surfaced columns rendered from
    /// the row, plus any computed values (expected totals and the like).
    fn row_issue(
        &self,
        rule: &Rule,
        row: &dyn StagedRow,
        extra: Vec<(String, String)>,
    ) -> ValidationIssue {
        let mut values: Vec<(String, String)> = rule
            .fields
            .iter()
            .map(|field| ((*field).to_string(), render_field(row, field)))
            .collect();
        values.extend(extra);
        self.build_issue(rule, Some(row.row_number()), values, key_values(rule, row))
    }

    /// Synthetic per-row format error for an unreadable monetary cell. The
    /// owning rule keeps evaluating the rest of the file.
    fn not_numeric_issue(
        &self,
        rule: &Rule,
        row: &dyn StagedRow,
        field: &str,
        raw: &str,
    ) -> ValidationIssue {
        ValidationIssue {
            rule_id: rule.id.clone(),
            severity: rule.severity,
            file: rule.file,
            row_number: Some(row.row_number()),
            field_values: vec![(field.to_string(), raw.to_string())],
            message: format!("Value for {field} is not numeric: {raw}"),
            unique_id: render_unique_id(&key_values(rule, row)),
        }
    }

    // ------------------------------------------------------------------
    // Monetary terms
    // ------------------------------------------------------------------

    /// One summed term: blank reads as zero, unreadable text reports a
    /// synthetic format error and yields `None`.
    fn sum_term(
        &self,
        rule: &Rule,
        row: &dyn StagedRow,
        field: &str,
        sink: &mut ErrorSink,
    ) -> Option<Money> {
        let Some(cell) = row.money(field) else {
            return Some(Money::ZERO);
        };
        match cell.for_sum() {
            Ok(amount) => Some(amount),
            Err(_) => {
                sink.push(self.not_numeric_issue(rule, row, field, &cell.display_value()));
                None
            }
        }
    }

    fn signed_sum(
        &self,
        rule: &Rule,
        row: &dyn StagedRow,
        addends: &[Addend],
        sink: &mut ErrorSink,
    ) -> Option<Money> {
        let mut total = Money::ZERO;
        for addend in addends {
            let amount = self.sum_term(rule, row, addend.field, sink)?;
            if addend.negated {
                total -= amount;
            } else {
                total += amount;
            }
        }
        Some(total)
    }

    // ------------------------------------------------------------------
    // Row-local checks
    // ------------------------------------------------------------------

    fn check_sum_equals(
        &self,
        rule: &Rule,
        target: &'static str,
        addends: &[Addend],
        sink: &mut ErrorSink,
    ) {
        for row in self.rows(rule) {
            let Some(reported) = self.sum_term(rule, row, target, sink) else {
                continue;
            };
            let Some(expected) = self.signed_sum(rule, row, addends, sink) else {
                continue;
            };
            if !reported.eq_rounded(expected) {
                sink.push(self.row_issue(
                    rule,
                    row,
                    vec![("expected_value".to_string(), expected.to_string())],
                ));
            }
        }
    }

    /// Summed per reporting combination; a combination containing any
    /// unreadable cell reports only the synthetic format errors, never a
    /// mismatch built on a partial total. The issue lands on the
    /// combination's first staged row.
    fn check_group_sum_equals(
        &self,
        rule: &Rule,
        group_by: &'static [&'static str],
        target: &'static str,
        addends: &[Addend],
        sink: &mut ErrorSink,
    ) {
        let mut groups: BTreeMap<Vec<String>, GroupTotals<'a>> = BTreeMap::new();
        for row in self.rows(rule) {
            let reported = self.sum_term(rule, row, target, sink);
            let expected = self.signed_sum(rule, row, addends, sink);
            let group = groups
                .entry(combo_key(row, group_by))
                .or_insert_with(|| GroupTotals {
                    first_row: row,
                    reported: Money::ZERO,
                    expected: Money::ZERO,
                    unreadable: false,
                });
            match reported.zip(expected) {
                Some((reported, expected)) => {
                    group.reported += reported;
                    group.expected += expected;
                }
                None => group.unreadable = true,
            }
        }
        for group in groups.values() {
            if group.unreadable || group.reported.eq_rounded(group.expected) {
                continue;
            }
            sink.push(self.row_issue(
                rule,
                group.first_row,
                vec![
                    ("reported_total".to_string(), group.reported.to_string()),
                    ("expected_total".to_string(), group.expected.to_string()),
                ],
            ));
        }
    }

    fn check_fields_equal(
        &self,
        rule: &Rule,
        left: &'static str,
        right: &'static str,
        sink: &mut ErrorSink,
    ) {
        for row in self.rows(rule) {
            let Some(left_value) = self.sum_term(rule, row, left, sink) else {
                continue;
            };
            let Some(right_value) = self.sum_term(rule, row, right, sink) else {
                continue;
            };
            if !left_value.eq_rounded(right_value) {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    fn check_domain(
        &self,
        rule: &Rule,
        field: &'static str,
        allowed: &[&str],
        allow_blank: bool,
        sink: &mut ErrorSink,
    ) {
        for row in self.rows(rule) {
            let raw = row.text(field).unwrap_or("");
            if is_blank(raw) {
                if !allow_blank {
                    sink.push(self.row_issue(rule, row, Vec::new()));
                }
                continue;
            }
            let value = normalize_code(raw);
            if !allowed.iter().any(|code| normalize_code(code) == value) {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    fn check_format(&self, rule: &Rule, field: &'static str, kind: FormatKind, sink: &mut ErrorSink) {
        for row in self.rows(rule) {
            if !kind.matches(row.text(field).unwrap_or("")) {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    fn check_require_when(
        &self,
        rule: &Rule,
        field: &'static str,
        when: Condition,
        sink: &mut ErrorSink,
    ) {
        for row in self.rows(rule) {
            if when.matches(row) && field_is_blank(row, field) {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    fn check_forbid_when(
        &self,
        rule: &Rule,
        field: &'static str,
        when: Condition,
        sink: &mut ErrorSink,
    ) {
        for row in self.rows(rule) {
            if when.matches(row) && !field_is_blank(row, field) {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    fn check_must_be_zero_when(
        &self,
        rule: &Rule,
        field: &'static str,
        when: Condition,
        sink: &mut ErrorSink,
    ) {
        for row in self.rows(rule) {
            if !when.matches(row) {
                continue;
            }
            match row.money(field) {
                Some(MoneyCell::Value(amount)) if !amount.is_zero() => {
                    sink.push(self.row_issue(rule, row, Vec::new()));
                }
                Some(MoneyCell::Invalid(raw)) => {
                    sink.push(self.not_numeric_issue(rule, row, field, raw));
                }
                _ => {}
            }
        }
    }

    fn check_any_field_present(
        &self,
        rule: &Rule,
        fields: &[&str],
        when: Condition,
        sink: &mut ErrorSink,
    ) {
        for row in self.rows(rule) {
            if when.matches(row) && fields.iter().all(|field| field_is_blank(row, field)) {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    /// Every row carrying a duplicated key is flagged, not just the second
    /// and later occurrences.
    fn check_unique_key(&self, rule: &Rule, fields: &[&str], sink: &mut ErrorSink) {
        let rows = self.rows(rule);
        let mut counts: BTreeMap<Vec<String>, u32> = BTreeMap::new();
        for row in &rows {
            *counts.entry(text_key(*row, fields)).or_insert(0) += 1;
        }
        for row in rows {
            let duplicated = counts
                .get(&text_key(row, fields))
                .is_some_and(|count| *count > 1);
            if duplicated {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    /// The TAS must exist in the account dimension and, unless it is a
    /// no-year account, its submitted availability window must cover the
    /// submission fiscal year.
    fn check_tas_availability(&self, rule: &Rule, sink: &mut ErrorSink) {
        let reference = self.resolver.reference();
        let fiscal_year = self.staged.submission.fiscal_year.0;
        for row in self.rows(rule) {
            if !reference.tas_exists(row.text("tas").unwrap_or("")) {
                sink.push(self.row_issue(rule, row, Vec::new()));
                continue;
            }
            if normalize_code(row.text("availability_type_code").unwrap_or("")) == "X" {
                continue;
            }
            let begin = parse_year(row.text("beginning_period_of_availa").unwrap_or(""));
            let end = parse_year(row.text("ending_period_of_availabil").unwrap_or(""));
            let covered = matches!(
                (begin, end),
                (Some(begin), Some(end)) if begin <= fiscal_year && fiscal_year <= end
            );
            if !covered {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    // ------------------------------------------------------------------
    // Reference joins
    // ------------------------------------------------------------------

    /// Blank values fail the lookup like any other unknown code; rules
    /// tolerating blanks gate themselves with a `FieldPresent` condition.
    fn check_reference_exists(&self, rule: &Rule, check: ReferenceCheck, sink: &mut ErrorSink) {
        let reference = self.resolver.reference();
        let first = check.fields.first().copied().unwrap_or("");
        for row in self.rows(rule) {
            if !check.when.matches(row) {
                continue;
            }
            let value = normalize_code(row.text(first).unwrap_or(""));
            let resolves = match check.dimension {
                Dimension::ProgramActivity => reference.has_program_activity(
                    self.staged.submission.fiscal_year.0,
                    row.text("agency_identifier").unwrap_or(""),
                    row.text(first).unwrap_or(""),
                    row.text(check.fields.get(1).copied().unwrap_or(""))
                        .unwrap_or(""),
                ),
                Dimension::ObjectClasses => reference.object_class_exists(&value),
                Dimension::Defc => reference.defc(&value).is_some_and(|code| code.is_valid),
                Dimension::Countries => match reference.country(&value) {
                    Some(country) => !(check.reject_territories && country.territory_free_state),
                    None => false,
                },
                Dimension::Agencies => reference.sub_tier(&value).is_some(),
                Dimension::AssistanceListings => reference.assistance_listing(&value).is_some(),
                Dimension::Zips => reference.zip().zip_exists(&value),
                _ => true,
            };
            if !resolves {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    fn check_country_not_territory(&self, rule: &Rule, field: &'static str, sink: &mut ErrorSink) {
        let reference = self.resolver.reference();
        for row in self.rows(rule) {
            let raw = row.text(field).unwrap_or("");
            if is_blank(raw) {
                continue;
            }
            let territory = reference
                .country(&normalize_code(raw))
                .is_some_and(|country| country.territory_free_state);
            if territory {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    /// Unknown listings are left to the existence rule; this one only
    /// judges the activity window of listings that resolve, on rows whose
    /// action date parsed.
    fn check_cfda_active(&self, rule: &Rule, when: Condition, sink: &mut ErrorSink) {
        let reference = self.resolver.reference();
        for row in self.assistance_rows(rule.applies_to_deletes) {
            if !when.matches(row) {
                continue;
            }
            let Some(action_date) = row.action_date_parsed else {
                continue;
            };
            let Some(listing) = reference.assistance_listing(&row.cfda_number) else {
                continue;
            };
            if !listing.is_active_on(action_date) {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    fn check_recipient_registered(
        &self,
        rule: &Rule,
        assistance_types: &[&str],
        window_start: &str,
        window_end: Option<&str>,
        identifier: RecipientIdentifier,
        sink: &mut ErrorSink,
    ) {
        let Some(start) = parse_iso_date(window_start) else {
            return;
        };
        let end = window_end.and_then(parse_iso_date);
        for row in self.assistance_rows(rule.applies_to_deletes) {
            let assistance_type = normalize_code(&row.assistance_type);
            if !assistance_types
                .iter()
                .any(|code| normalize_code(code) == assistance_type)
            {
                continue;
            }
            let Some(action_date) = row.action_date_parsed else {
                continue;
            };
            if action_date < start || end.is_some_and(|end| action_date >= end) {
                continue;
            }
            let duns = match identifier {
                RecipientIdentifier::UeiOrDuns => row.awardee_or_recipient_uniqu.as_str(),
                RecipientIdentifier::UeiOnly => "",
            };
            if is_blank(&row.uei) && is_blank(duns) {
                continue;
            }
            if !self.resolver.sam_registered(&row.uei, duns) {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    /// District "90" (spread across districts) is accepted when the state
    /// has more than one district or the ZIP itself rolls up to "90". A ZIP
    /// that does not resolve falls back to "any district in the state".
    fn check_congressional_district(
        &self,
        rule: &Rule,
        district_field: &'static str,
        zip_field: &'static str,
        state: StateSource,
        sink: &mut ErrorSink,
    ) {
        let zip_tables = self.resolver.reference().zip();
        for row in self.rows(rule) {
            let raw_district = row.text(district_field).unwrap_or("");
            if is_blank(raw_district) {
                continue;
            }
            let district = pad_left_zero(raw_district, 2);
            let state_code = match state {
                StateSource::Field(field) => normalize_code(row.text(field).unwrap_or("")),
                StateSource::PlacePerformanceCodePrefix => {
                    let code = normalize_code(row.text("place_of_performance_code").unwrap_or(""));
                    if code.len() < 2 || !code[..2].bytes().all(|b| b.is_ascii_alphabetic()) {
                        continue;
                    }
                    code[..2].to_string()
                }
            };
            if state_code.is_empty() {
                continue;
            }
            let Some(districts) = zip_tables.state_districts(&state_code) else {
                continue;
            };
            let zip_district = zip5_of(row.text(zip_field).unwrap_or(""))
                .and_then(|zip| zip_tables.district_for_zip(&zip, &state_code));
            let ok = if district == MULTIPLE_DISTRICTS {
                districts.len() > 1 || zip_district == Some(MULTIPLE_DISTRICTS)
            } else {
                match zip_district {
                    Some(MULTIPLE_DISTRICTS) | None => districts.contains(&district),
                    Some(found) => found == district,
                }
            };
            if !ok {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    fn check_sf133_sum(
        &self,
        rule: &Rule,
        field: &'static str,
        lines: &'static [u32],
        sink: &mut ErrorSink,
    ) {
        let totals = self.resolver.sf133_line_totals(lines);
        for row in self.rows(rule) {
            let Some(reported) = self.sum_term(rule, row, field, sink) else {
                continue;
            };
            let tas = row.text("tas").unwrap_or("").trim();
            let expected = totals.get(tas).copied().unwrap_or(Money::ZERO);
            if !reported.eq_rounded(expected) {
                sink.push(self.row_issue(
                    rule,
                    row,
                    vec![("expected_value".to_string(), expected.to_string())],
                ));
            }
        }
    }

    /// Coverage runs the other way: every SF-133 TAS the agency owns must
    /// be reported in File A. The missing account has no staged row, so the
    /// issue carries no row number.
    fn check_tas_in_sf133(&self, rule: &Rule, sink: &mut ErrorSink) {
        let reported: BTreeSet<&str> = self
            .staged
            .appropriations
            .iter()
            .map(|row| row.tas.trim())
            .collect();
        for tas in self.resolver.sf133_agency_tas() {
            if reported.contains(tas.trim()) {
                continue;
            }
            let values = vec![("tas".to_string(), tas.to_string())];
            sink.push(self.build_issue(rule, None, values.clone(), values));
        }
    }

    // ------------------------------------------------------------------
    // Cross-file and cross-submission checks
    // ------------------------------------------------------------------

    fn check_cross_file_combos(
        &self,
        rule: &Rule,
        fields: &'static [&'static str],
        sink: &mut ErrorSink,
    ) {
        let combos = self.resolver.file_b_combos(fields);
        for row in self.rows(rule) {
            if !combos.contains(&combo_key(row, fields)) {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    /// File C obligations summed per award id against published assistance
    /// obligations for the same id. Rows carrying the other identifier are
    /// left to the twin rule, and ids never published are left to the
    /// existence rule.
    fn check_cross_file_sums(&self, rule: &Rule, key_field: &'static str, sink: &mut ErrorSink) {
        let awards = self.resolver.published_awards();
        let (published, other) = if key_field == "uri" {
            (&awards.totals_by_uri, "fain")
        } else {
            (&awards.totals_by_fain, "uri")
        };
        let mut staged_totals: BTreeMap<String, StagedAwardTotal<'a>> = BTreeMap::new();
        for row in self.rows(rule) {
            let raw_key = row.text(key_field).unwrap_or("");
            if is_blank(raw_key) || !field_is_blank(row, other) {
                continue;
            }
            let amount = self.sum_term(rule, row, "transaction_obligated_amou", sink);
            let entry = staged_totals
                .entry(normalize_code(raw_key))
                .or_insert_with(|| StagedAwardTotal {
                    first_row: row,
                    total: Money::ZERO,
                    unreadable: false,
                });
            match amount {
                Some(amount) => entry.total += amount,
                None => entry.unreadable = true,
            }
        }
        for (key, staged) in &staged_totals {
            if staged.unreadable {
                continue;
            }
            let Some(published_total) = published.get(key) else {
                continue;
            };
            if !staged.total.eq_rounded(*published_total) {
                sink.push(self.row_issue(
                    rule,
                    staged.first_row,
                    vec![
                        (
                            "transaction_obligated_sum".to_string(),
                            staged.total.to_string(),
                        ),
                        (
                            "federal_action_obligation_sum".to_string(),
                            published_total.to_string(),
                        ),
                    ],
                ));
            }
        }
    }

    fn check_fabs_award_exists(
        &self,
        rule: &Rule,
        key_field: &'static str,
        when: Condition,
        sink: &mut ErrorSink,
    ) {
        let awards = self.resolver.published_awards();
        let published = if key_field == "uri" {
            &awards.totals_by_uri
        } else {
            &awards.totals_by_fain
        };
        for row in self.rows(rule) {
            if !when.matches(row) {
                continue;
            }
            let key = normalize_code(row.text(key_field).unwrap_or(""));
            if key.is_empty() {
                continue;
            }
            if !published.contains_key(&key) {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }

    /// Award combinations that reported a nonzero outlay in the prior
    /// certified period must report an outlay again. A combination whose
    /// prior total rounds to zero is treated as closed out; one reported
    /// this period with a blank outlay is flagged on its first row, and one
    /// missing entirely is flagged without a row number.
    fn check_carry_forward(
        &self,
        rule: &Rule,
        group_by: &'static [&'static str],
        outlay_field: &'static str,
        exempt_when_blank: &'static [&'static str],
        prior_when: Condition,
        sink: &mut ErrorSink,
    ) {
        let prior_rows = self.resolver.prior_award_financial();
        if prior_rows.is_empty() {
            return;
        }

        let mut carried: BTreeMap<Vec<String>, CarriedGroup<'a>> = BTreeMap::new();
        for row in prior_rows {
            if !prior_when.matches(row) {
                continue;
            }
            if exempt_when_blank
                .iter()
                .all(|field| field_is_blank(row, field))
            {
                continue;
            }
            let amount = row
                .money(outlay_field)
                .and_then(MoneyCell::value)
                .unwrap_or(Money::ZERO);
            let entry = carried
                .entry(combo_key(row, group_by))
                .or_insert_with(|| CarriedGroup {
                    row,
                    total: Money::ZERO,
                });
            entry.total += amount;
        }

        let mut current: BTreeMap<Vec<String>, CurrentGroup<'a>> = BTreeMap::new();
        for row in self.rows(rule) {
            let reported = row
                .money(outlay_field)
                .is_some_and(|cell| !cell.is_blank());
            let entry = current
                .entry(combo_key(row, group_by))
                .or_insert_with(|| CurrentGroup {
                    first_row: row,
                    reported: false,
                });
            entry.reported |= reported;
        }

        for (key, prior) in &carried {
            if prior.total.round2().is_zero() {
                continue;
            }
            match current.get(key) {
                None => {
                    let values: Vec<(String, String)> = rule
                        .fields
                        .iter()
                        .map(|field| ((*field).to_string(), render_field(prior.row, field)))
                        .collect();
                    sink.push(self.build_issue(rule, None, values, key_values(rule, prior.row)));
                }
                Some(state) if !state.reported => {
                    sink.push(self.row_issue(
                        rule,
                        state.first_row,
                        vec![("prior_period_amount".to_string(), prior.total.to_string())],
                    ));
                }
                Some(_) => {}
            }
        }
    }

    /// Corrections and deletions must name a previously published
    /// transaction.
    fn check_prior_reference(
        &self,
        rule: &Rule,
        key_field: &'static str,
        deletes: bool,
        sink: &mut ErrorSink,
    ) {
        let published = self.resolver.published_transaction_ids();
        for row in self.assistance_rows(rule.applies_to_deletes) {
            let applies = if deletes {
                row.cdi.is_delete()
            } else {
                row.cdi.is_correction()
            };
            if !applies {
                continue;
            }
            let key = row.text(key_field).unwrap_or("").trim().to_lowercase();
            if !published.contains(&key) {
                sink.push(self.row_issue(rule, row, Vec::new()));
            }
        }
    }
}

// ----------------------------------------------------------------------
// Per-rule aggregation state
// ----------------------------------------------------------------------

struct GroupTotals<'r> {
    first_row: &'r dyn StagedRow,
    reported: Money,
    expected: Money,
    unreadable: bool,
}

struct StagedAwardTotal<'r> {
    first_row: &'r dyn StagedRow,
    total: Money,
    unreadable: bool,
}

struct CarriedGroup<'r> {
    row: &'r AwardFinancialRow,
    total: Money,
}

struct CurrentGroup<'r> {
    first_row: &'r dyn StagedRow,
    reported: bool,
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

/// The reference dimension a predicate joins, if any. Cross-file and
/// cross-submission kinds read the staged and published data instead and
/// are never gated on reference load state.
fn required_dimension(predicate: &Predicate) -> Option<Dimension> {
    match predicate {
        Predicate::TasAvailabilityCoversYear => Some(Dimension::Tas),
        Predicate::ReferenceExists(check) => Some(check.dimension),
        Predicate::CountryNotTerritory { .. } => Some(Dimension::Countries),
        Predicate::CfdaActiveOnActionDate { .. } => Some(Dimension::AssistanceListings),
        Predicate::RecipientRegistered { .. } => Some(Dimension::SamRecipients),
        Predicate::CongressionalDistrictMatchesZip { .. } => Some(Dimension::Zips),
        Predicate::Sf133SumMatches { .. } | Predicate::TasInSf133 => Some(Dimension::Sf133),
        _ => None,
    }
}

fn dyn_rows<R: StagedRow>(rows: &[R]) -> Vec<&dyn StagedRow> {
    rows.iter().map(|row| row as &dyn StagedRow).collect()
}

fn render_field(row: &dyn StagedRow, name: &str) -> String {
    row.field(name)
        .map(|value| value.render())
        .unwrap_or_default()
}

fn key_values(rule: &Rule, row: &dyn StagedRow) -> Vec<(String, String)> {
    rule.unique_key
        .iter()
        .map(|field| ((*field).to_string(), render_field(row, field)))
        .collect()
}

fn render_unique_id(values: &[(String, String)]) -> String {
    values
        .iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn field_is_blank(row: &dyn StagedRow, field: &str) -> bool {
    row.field(field).is_none_or(|value| value.is_blank())
}

fn text_key(row: &dyn StagedRow, fields: &[&str]) -> Vec<String> {
    fields
        .iter()
        .map(|field| normalize_code(row.text(field).unwrap_or("")))
        .collect()
}

/// First five characters when they form a ZIP5; tolerates ZIP+4 and ZIP9
/// layouts by ignoring everything past the fifth digit.
fn zip5_of(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let prefix: String = trimmed.chars().take(5).collect();
    (prefix.len() == 5 && prefix.bytes().all(|b| b.is_ascii_digit())).then_some(prefix)
}

fn parse_year(raw: &str) -> Option<u16> {
    raw.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use daims_model::fiscal::{FiscalPeriod, FiscalYear};
    use daims_model::issue::Severity;
    use daims_model::staging::{PublishedStore, Submission};
    use daims_reference::store::ReferenceStore;

    fn submission() -> Submission {
        Submission {
            submission_id: 7,
            agency_code: "097".to_string(),
            fiscal_year: FiscalYear(2017),
            fiscal_period: FiscalPeriod::new(6).unwrap(),
            is_quarter_format: false,
        }
    }

    fn fabs_row(row_number: u32) -> AssistanceRow {
        AssistanceRow {
            row_number,
            record_type: "2".to_string(),
            ..AssistanceRow::default()
        }
    }

    fn run_rules(staged: &StagedSubmission, rules: Vec<Rule>) -> ValidationRun {
        let catalog = RuleCatalog::from_rules(rules).unwrap();
        let reference = ReferenceStore::new();
        let published = PublishedStore::new();
        let resolver = Resolver::new(&reference, &published, staged);
        validate(&catalog, staged, &resolver, &CancelToken::new()).unwrap()
    }

    #[test]
    fn reference_joins_name_their_dimension() {
        assert_eq!(
            required_dimension(&Predicate::TasAvailabilityCoversYear),
            Some(Dimension::Tas)
        );
        assert_eq!(
            required_dimension(&Predicate::TasInSf133),
            Some(Dimension::Sf133)
        );
        assert_eq!(
            required_dimension(&Predicate::CountryNotTerritory { field: "x" }),
            Some(Dimension::Countries)
        );
        assert_eq!(
            required_dimension(&Predicate::CrossFileSums { key_field: "fain" }),
            None
        );
        assert_eq!(required_dimension(&Predicate::Unenforced), None);
    }

    #[test]
    fn zip_prefixes_only_count_five_leading_digits() {
        assert_eq!(zip5_of(" 123456789 "), Some("12345".to_string()));
        assert_eq!(zip5_of("12345-6789"), Some("12345".to_string()));
        assert_eq!(zip5_of("12345"), Some("12345".to_string()));
        assert_eq!(zip5_of("1234"), None);
        assert_eq!(zip5_of("ABCDE"), None);
        assert_eq!(zip5_of(""), None);
    }

    #[test]
    fn forbidden_fields_fire_only_when_the_condition_holds() {
        let mut staged = StagedSubmission::new(submission());
        let mut foreign = fabs_row(1);
        foreign.legal_entity_country_code = "CAN".to_string();
        foreign.legal_entity_zip5 = "12345".to_string();
        let mut domestic = fabs_row(2);
        domestic.legal_entity_country_code = "USA".to_string();
        domestic.legal_entity_zip5 = "12345".to_string();
        staged.assistance = vec![foreign, domestic];

        let rule = Rule::new(
            "FABS99",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::ForbidWhen {
                field: "legal_entity_zip5",
                when: Condition::FieldNotIn {
                    field: "legal_entity_country_code",
                    values: &["USA"],
                },
            },
        )
        .unwrap()
        .fields(&["legal_entity_zip5", "legal_entity_country_code"])
        .unique_key(&["afa_generated_unique"])
        .message("LegalEntityZIP5 must be blank for foreign recipients");

        let run = run_rules(&staged, vec![rule]);
        assert_eq!(run.issues.len(), 1);
        assert_eq!(run.issues[0].row_number, Some(1));
    }

    #[test]
    fn zero_required_amounts_report_nonzero_and_unreadable_cells() {
        let mut staged = StagedSubmission::new(submission());
        staged.award_financial = vec![
            AwardFinancialRow {
                row_number: 1,
                transaction_obligated_amou: MoneyCell::Value(Money::from_dollars(5)),
                ..AwardFinancialRow::default()
            },
            AwardFinancialRow {
                row_number: 2,
                transaction_obligated_amou: MoneyCell::Value(Money::ZERO),
                ..AwardFinancialRow::default()
            },
            AwardFinancialRow {
                row_number: 3,
                transaction_obligated_amou: MoneyCell::Invalid("12,0".to_string()),
                ..AwardFinancialRow::default()
            },
        ];

        let rule = Rule::new(
            "C99",
            SubmissionFile::C,
            Severity::Fatal,
            Predicate::MustBeZeroWhen {
                field: "transaction_obligated_amou",
                when: Condition::FieldBlank { field: "fain" },
            },
        )
        .unwrap()
        .fields(&["transaction_obligated_amou"])
        .unique_key(&["piid", "fain", "uri"])
        .message("TransactionObligatedAmount must be zero when no award is named");

        let run = run_rules(&staged, vec![rule]);
        let rows: Vec<Option<u32>> = run.issues.iter().map(|issue| issue.row_number).collect();
        assert_eq!(rows, vec![Some(1), Some(3)]);
        assert!(run.issues[1].message.contains("not numeric"));
    }

    #[test]
    fn duplicate_keys_flag_every_carrying_row() {
        let mut staged = StagedSubmission::new(submission());
        let mut first = fabs_row(1);
        first.afa_generated_unique = "0_abc_f1_".to_string();
        let mut second = fabs_row(2);
        second.afa_generated_unique = "0_ABC_F1_".to_string();
        let mut third = fabs_row(3);
        third.afa_generated_unique = "1_abc_f1_".to_string();
        staged.assistance = vec![first, second, third];

        let rule = Rule::new(
            "FABS1",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::UniqueKey {
                fields: &["afa_generated_unique"],
            },
        )
        .unwrap()
        .fields(&["afa_generated_unique"])
        .unique_key(&["afa_generated_unique"])
        .message("{afa_generated_unique} appears on more than one row")
        .applies_to_deletes();

        let run = run_rules(&staged, vec![rule]);
        let rows: Vec<Option<u32>> = run.issues.iter().map(|issue| issue.row_number).collect();
        assert_eq!(rows, vec![Some(1), Some(2)]);
        assert!(run.issues[0].message.contains("0_abc_f1_"));
    }

    #[test]
    fn cancellation_aborts_between_rules() {
        let mut staged = StagedSubmission::new(submission());
        staged.assistance = vec![fabs_row(1)];
        let catalog = RuleCatalog::standard().unwrap();
        let reference = ReferenceStore::new();
        let published = PublishedStore::new();
        let resolver = Resolver::new(&reference, &published, &staged);

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = validate(&catalog, &staged, &resolver, &cancel).unwrap_err();
        assert!(matches!(err, ValidateError::Cancelled));
    }
}
