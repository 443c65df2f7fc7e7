//! Cross-file and cross-submission lookups, memoized for one run.
//!
//! The engine evaluates each rule once, but several rules aggregate the same
//! sibling data (SF-133 balances, published award totals, File B reporting
//! combinations) and FABS files repeat the same recipient identifiers
//! thousands of times. The resolver owns those aggregations: each is built
//! on first use and answered from memory for the rest of the run. A distinct
//! UEI/DUNS pair hits the SAM index once per submission, however many rows
//! carry it.

use std::cell::{OnceCell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use daims_model::codes::{is_blank, normalize_code};
use daims_model::money::Money;
use daims_model::staging::{
    AwardFinancialRow, PublishedStore, PublishedSubmission, StagedRow, StagedSubmission,
};
use daims_reference::store::{Dimension, ReferenceStore};

/// Published File D2 obligation totals, keyed by normalized award
/// identifier. A key is present whenever at least one published transaction
/// carries it, even when every obligation on it is blank.
#[derive(Debug, Default)]
pub struct PublishedAwards {
    pub totals_by_fain: BTreeMap<String, Money>,
    pub totals_by_uri: BTreeMap<String, Money>,
}

/// Normalized join value for one combo column. Object classes submitted as
/// four digits with a leading zero match their three-digit form.
pub(crate) fn combo_value(field: &str, raw: &str) -> String {
    let norm = normalize_code(raw);
    if field == "object_class" && norm.len() == 4 && norm.starts_with('0') {
        return norm[1..].to_string();
    }
    norm
}

/// Join key over the named columns of one staged row.
pub(crate) fn combo_key(row: &dyn StagedRow, fields: &[&str]) -> Vec<String> {
    fields
        .iter()
        .map(|field| combo_value(field, row.text(field).unwrap_or("")))
        .collect()
}

pub struct Resolver<'a> {
    reference: &'a ReferenceStore,
    published: &'a PublishedStore,
    staged: &'a StagedSubmission,

    prior: OnceCell<Option<&'a PublishedSubmission>>,
    transaction_ids: OnceCell<BTreeSet<String>>,
    awards: OnceCell<PublishedAwards>,
    file_b_combos: RefCell<HashMap<&'static [&'static str], Rc<BTreeSet<Vec<String>>>>>,
    sf133_totals: RefCell<HashMap<&'static [u32], Rc<BTreeMap<String, Money>>>>,
    sam_answers: RefCell<HashMap<(String, String), bool>>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        reference: &'a ReferenceStore,
        published: &'a PublishedStore,
        staged: &'a StagedSubmission,
    ) -> Self {
        Self {
            reference,
            published,
            staged,
            prior: OnceCell::new(),
            transaction_ids: OnceCell::new(),
            awards: OnceCell::new(),
            file_b_combos: RefCell::new(HashMap::new()),
            sf133_totals: RefCell::new(HashMap::new()),
            sam_answers: RefCell::new(HashMap::new()),
        }
    }

    pub fn reference(&self) -> &'a ReferenceStore {
        self.reference
    }

    /// Whether rules joining `dimension` can run. For SF-133 the dimension
    /// must be loaded *and* hold the submission's own reporting period;
    /// comparing against an absent period would read as all-zero balances.
    pub fn dimension_ready(&self, dimension: Dimension) -> bool {
        if !self.reference.is_loaded(dimension) {
            return false;
        }
        match dimension {
            Dimension::Sf133 => {
                let submission = &self.staged.submission;
                self.reference
                    .sf133()
                    .has_period(submission.fiscal_year.0, submission.fiscal_period.get())
            }
            _ => true,
        }
    }

    /// The most recently certified submission from the same agency strictly
    /// before the working period, within the same fiscal year.
    pub fn prior_published(&self) -> Option<&'a PublishedSubmission> {
        *self.prior.get_or_init(|| {
            let submission = &self.staged.submission;
            self.published.prior_before(
                &submission.agency_code,
                submission.fiscal_year,
                submission.fiscal_period,
            )
        })
    }

    /// Prior-period File C rows; empty when nothing has been certified yet.
    pub fn prior_award_financial(&self) -> &'a [AwardFinancialRow] {
        self.prior_published()
            .map_or(&[], |prior| prior.award_financial.as_slice())
    }

    /// Lowercase transaction keys of every published assistance record.
    /// Corrections and deletions must name one of these.
    pub fn published_transaction_ids(&self) -> &BTreeSet<String> {
        self.transaction_ids.get_or_init(|| {
            self.published
                .all_assistance()
                .map(|transaction| transaction.unique_id.trim().to_lowercase())
                .collect()
        })
    }

    /// Published award obligations summed by FAIN and by URI.
    pub fn published_awards(&self) -> &PublishedAwards {
        self.awards.get_or_init(|| {
            let mut awards = PublishedAwards::default();
            for transaction in self.published.all_assistance() {
                let amount = transaction
                    .federal_action_obligation
                    .value()
                    .unwrap_or(Money::ZERO);
                if !is_blank(&transaction.fain) {
                    *awards
                        .totals_by_fain
                        .entry(normalize_code(&transaction.fain))
                        .or_insert(Money::ZERO) += amount;
                }
                if !is_blank(&transaction.uri) {
                    *awards
                        .totals_by_uri
                        .entry(normalize_code(&transaction.uri))
                        .or_insert(Money::ZERO) += amount;
                }
            }
            awards
        })
    }

    /// Distinct normalized values of `fields` across the staged File B rows.
    pub fn file_b_combos(&self, fields: &'static [&'static str]) -> Rc<BTreeSet<Vec<String>>> {
        if let Some(combos) = self.file_b_combos.borrow().get(fields) {
            return Rc::clone(combos);
        }
        let combos: BTreeSet<Vec<String>> = self
            .staged
            .program_balances
            .iter()
            .map(|row| combo_key(row, fields))
            .collect();
        let combos = Rc::new(combos);
        self.file_b_combos
            .borrow_mut()
            .insert(fields, Rc::clone(&combos));
        combos
    }

    /// Per-TAS sum of the named SF-133 lines for the submission period,
    /// rounded once after aggregation.
    pub fn sf133_line_totals(&self, lines: &'static [u32]) -> Rc<BTreeMap<String, Money>> {
        if let Some(totals) = self.sf133_totals.borrow().get(lines) {
            return Rc::clone(totals);
        }
        let submission = &self.staged.submission;
        let mut totals: BTreeMap<String, Money> = BTreeMap::new();
        for balance in self
            .reference
            .sf133()
            .rows(submission.fiscal_year.0, submission.fiscal_period.get())
        {
            if lines.contains(&balance.line_number) {
                *totals.entry(balance.tas.clone()).or_insert(Money::ZERO) += balance.amount;
            }
        }
        for total in totals.values_mut() {
            *total = total.round2();
        }
        let totals = Rc::new(totals);
        self.sf133_totals
            .borrow_mut()
            .insert(lines, Rc::clone(&totals));
        totals
    }

    /// SF-133 TAS owned by the submitting agency for the working period.
    pub fn sf133_agency_tas(&self) -> Vec<&'a str> {
        let submission = &self.staged.submission;
        self.reference.sf133_tas_for_agency(
            submission.fiscal_year.0,
            submission.fiscal_period.get(),
            &submission.agency_code,
        )
    }

    /// Whether the recipient holds a SAM registration, preferring the UEI
    /// and falling back to DUNS. Memoized per identifier pair.
    pub fn sam_registered(&self, uei: &str, duns: &str) -> bool {
        let key = (normalize_code(uei), normalize_code(duns));
        if let Some(answer) = self.sam_answers.borrow().get(&key) {
            return *answer;
        }
        let uei = (!key.0.is_empty()).then_some(key.0.as_str());
        let duns = (!key.1.is_empty()).then_some(key.1.as_str());
        let registered = self.reference.sam().recipient(uei, duns).is_some();
        self.sam_answers.borrow_mut().insert(key, registered);
        registered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daims_model::fiscal::{FiscalPeriod, FiscalYear};
    use daims_model::money::MoneyCell;
    use daims_model::reference::Sf133Balance;
    use daims_model::staging::{PublishedAssistance, Submission};

    fn staged() -> StagedSubmission {
        StagedSubmission::new(Submission {
            submission_id: 1,
            agency_code: "097".to_string(),
            fiscal_year: FiscalYear(2017),
            fiscal_period: FiscalPeriod::new(6).unwrap(),
            is_quarter_format: false,
        })
    }

    fn published_with(fain: &str, uri: &str, obligation: MoneyCell) -> PublishedStore {
        let mut store = PublishedStore::new();
        store.publish(
            "097",
            FiscalYear(2017),
            PublishedSubmission {
                fiscal_period: 3,
                award_financial: Vec::new(),
                assistance: vec![PublishedAssistance {
                    unique_id: "0_abcd_fain1_".to_string(),
                    fain: fain.to_string(),
                    uri: uri.to_string(),
                    federal_action_obligation: obligation,
                }],
            },
        );
        store
    }

    #[test]
    fn award_totals_keep_blank_obligation_keys() {
        let reference = ReferenceStore::new();
        let published = published_with("FAIN1", "", MoneyCell::Blank);
        let staged = staged();
        let resolver = Resolver::new(&reference, &published, &staged);

        let awards = resolver.published_awards();
        assert_eq!(awards.totals_by_fain.get("FAIN1"), Some(&Money::ZERO));
        assert!(awards.totals_by_uri.is_empty());
    }

    #[test]
    fn award_totals_sum_across_transactions() {
        let reference = ReferenceStore::new();
        let mut published = PublishedStore::new();
        published.publish(
            "097",
            FiscalYear(2017),
            PublishedSubmission {
                fiscal_period: 3,
                award_financial: Vec::new(),
                assistance: vec![
                    PublishedAssistance {
                        unique_id: "a".to_string(),
                        fain: "fain1".to_string(),
                        uri: String::new(),
                        federal_action_obligation: MoneyCell::Value(Money::from_dollars(3)),
                    },
                    PublishedAssistance {
                        unique_id: "b".to_string(),
                        fain: "FAIN1".to_string(),
                        uri: String::new(),
                        federal_action_obligation: MoneyCell::Value(Money::from_dollars(4)),
                    },
                ],
            },
        );
        let staged = staged();
        let resolver = Resolver::new(&reference, &published, &staged);

        let totals = &resolver.published_awards().totals_by_fain;
        assert_eq!(totals.get("FAIN1"), Some(&Money::from_dollars(7)));
    }

    #[test]
    fn sf133_totals_round_after_aggregation() {
        let mut reference = ReferenceStore::new();
        reference.sf133_mut().set_period(
            2017,
            6,
            vec![
                Sf133Balance {
                    tas: "00009720172017 0100001".to_string(),
                    fiscal_year: 2017,
                    period: 6,
                    line_number: 1540,
                    amount: "0.005".parse().unwrap(),
                    disaster_emergency_fund_code: None,
                },
                Sf133Balance {
                    tas: "00009720172017 0100001".to_string(),
                    fiscal_year: 2017,
                    period: 6,
                    line_number: 1640,
                    amount: "0.005".parse().unwrap(),
                    disaster_emergency_fund_code: None,
                },
            ],
        );
        let published = PublishedStore::new();
        let staged = staged();
        let resolver = Resolver::new(&reference, &published, &staged);

        let totals = resolver.sf133_line_totals(&[1540, 1640]);
        assert_eq!(
            totals.get("00009720172017 0100001"),
            Some(&"0.01".parse().unwrap())
        );
    }

    #[test]
    fn object_class_combo_values_match_across_widths() {
        assert_eq!(combo_value("object_class", "0110"), "110");
        assert_eq!(combo_value("object_class", "110"), "110");
        assert_eq!(combo_value("object_class", "1100"), "1100");
        assert_eq!(combo_value("program_activity_code", "0110"), "0110");
    }

    #[test]
    fn sam_answers_are_memoized_per_pair() {
        let reference = ReferenceStore::new();
        let published = PublishedStore::new();
        let staged = staged();
        let resolver = Resolver::new(&reference, &published, &staged);

        assert!(!resolver.sam_registered("ABC123DEF456", ""));
        assert!(!resolver.sam_registered(" abc123def456 ", ""));
        assert_eq!(resolver.sam_answers.borrow().len(), 1);
    }

    #[test]
    fn dimension_ready_requires_the_submission_period() {
        let mut reference = ReferenceStore::new();
        reference.sf133_mut().set_period(2017, 3, Vec::new());
        let published = PublishedStore::new();
        let staged = staged();
        let resolver = Resolver::new(&reference, &published, &staged);

        assert!(!resolver.dimension_ready(Dimension::Sf133));
        assert!(!resolver.dimension_ready(Dimension::Tas));
    }
}
