//! Typed staging rows for the four submitted files.
//!
//! Rows are immutable once staged. Every row carries its submitted 1-based
//! `row_number` and the TAS display string derived from padded components.
//! Rules address columns by their staging names, so each row type exposes a
//! by-name accessor over its monetary and text fields; the name tables here
//! are the single source of truth for what a rule may reference.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::codes::CorrectionDeleteIndicator;
use crate::fiscal::{FiscalPeriod, FiscalYear};
use crate::money::MoneyCell;
use crate::tas::TasComponents;

// ============================================================================
// Submission identity
// ============================================================================

/// Which submitted file a row or rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubmissionFile {
    A,
    B,
    C,
    Fabs,
}

impl SubmissionFile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::Fabs => "FABS",
        }
    }
}

impl fmt::Display for SubmissionFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one upload as handed over by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub submission_id: u64,
    pub agency_code: String,
    pub fiscal_year: FiscalYear,
    pub fiscal_period: FiscalPeriod,
    pub is_quarter_format: bool,
}

// ============================================================================
// Field access
// ============================================================================

/// One column value as a rule sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Money(&'a MoneyCell),
}

impl FieldValue<'_> {
    /// Rendering used in error messages; blank cells render empty.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => (*s).to_string(),
            FieldValue::Money(m) => m.display_value(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Money(m) => m.is_blank(),
        }
    }
}

/// By-name access over a staged row. Unknown names return `None`; the
/// catalog is validated against these accessors in tests.
pub trait StagedRow {
    fn row_number(&self) -> u32;
    fn money(&self, field: &str) -> Option<&MoneyCell>;
    fn text(&self, field: &str) -> Option<&str>;

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        if let Some(cell) = self.money(name) {
            return Some(FieldValue::Money(cell));
        }
        self.text(name).map(FieldValue::Text)
    }
}

fn tas_text<'a>(tas: &'a TasComponents, display: &'a str, field: &str) -> Option<&'a str> {
    match field {
        "tas" => Some(display),
        "allocation_transfer_agency" => Some(&tas.allocation_transfer_agency),
        "agency_identifier" => Some(&tas.agency_identifier),
        "beginning_period_of_availa" => Some(&tas.beginning_period_of_availa),
        "ending_period_of_availabil" => Some(&tas.ending_period_of_availabil),
        "availability_type_code" => Some(&tas.availability_type_code),
        "main_account_code" => Some(&tas.main_account_code),
        "sub_account_code" => Some(&tas.sub_account_code),
        _ => None,
    }
}

// ============================================================================
// File A — appropriations
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppropriationRow {
    pub row_number: u32,
    pub tas_components: TasComponents,
    pub tas: String,

    pub total_budgetary_resources_cpe: MoneyCell,
    pub budget_authority_appropria_cpe: MoneyCell,
    pub budget_authority_unobligat_fyb: MoneyCell,
    pub adjustments_to_unobligated_cpe: MoneyCell,
    pub other_budgetary_resources_cpe: MoneyCell,
    pub contract_authority_amount_cpe: MoneyCell,
    pub borrowing_authority_amount_cpe: MoneyCell,
    pub spending_authority_from_of_cpe: MoneyCell,
    pub status_of_budgetary_resour_cpe: MoneyCell,
    pub obligations_incurred_total_cpe: MoneyCell,
    pub unobligated_balance_cpe: MoneyCell,
    pub gross_outlay_amount_by_tas_cpe: MoneyCell,
    pub deobligations_recoveries_r_cpe: MoneyCell,
}

impl StagedRow for AppropriationRow {
    fn row_number(&self) -> u32 {
        self.row_number
    }

    fn money(&self, field: &str) -> Option<&MoneyCell> {
        match field {
            "total_budgetary_resources_cpe" => Some(&self.total_budgetary_resources_cpe),
            "budget_authority_appropria_cpe" => Some(&self.budget_authority_appropria_cpe),
            "budget_authority_unobligat_fyb" => Some(&self.budget_authority_unobligat_fyb),
            "adjustments_to_unobligated_cpe" => Some(&self.adjustments_to_unobligated_cpe),
            "other_budgetary_resources_cpe" => Some(&self.other_budgetary_resources_cpe),
            "contract_authority_amount_cpe" => Some(&self.contract_authority_amount_cpe),
            "borrowing_authority_amount_cpe" => Some(&self.borrowing_authority_amount_cpe),
            "spending_authority_from_of_cpe" => Some(&self.spending_authority_from_of_cpe),
            "status_of_budgetary_resour_cpe" => Some(&self.status_of_budgetary_resour_cpe),
            "obligations_incurred_total_cpe" => Some(&self.obligations_incurred_total_cpe),
            "unobligated_balance_cpe" => Some(&self.unobligated_balance_cpe),
            "gross_outlay_amount_by_tas_cpe" => Some(&self.gross_outlay_amount_by_tas_cpe),
            "deobligations_recoveries_r_cpe" => Some(&self.deobligations_recoveries_r_cpe),
            _ => None,
        }
    }

    fn text(&self, field: &str) -> Option<&str> {
        tas_text(&self.tas_components, &self.tas, field)
    }
}

// ============================================================================
// USSGL columns shared by files B and C
// ============================================================================

/// The 48xx/49xx general-ledger columns both program-level (B) and
/// award-level (C) rows report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UssglColumns {
    pub ussgl480100_undelivered_or_fyb: MoneyCell,
    pub ussgl480100_undelivered_or_cpe: MoneyCell,
    pub ussgl483100_undelivered_or_cpe: MoneyCell,
    pub ussgl487100_downward_adjus_cpe: MoneyCell,
    pub ussgl488100_upward_adjustm_cpe: MoneyCell,
    pub obligations_undelivered_or_fyb: MoneyCell,
    pub obligations_undelivered_or_cpe: MoneyCell,
    pub ussgl490100_delivered_orde_fyb: MoneyCell,
    pub ussgl490100_delivered_orde_cpe: MoneyCell,
    pub ussgl493100_delivered_orde_cpe: MoneyCell,
    pub ussgl497100_downward_adjus_cpe: MoneyCell,
    pub ussgl498100_upward_adjustm_cpe: MoneyCell,
    pub obligations_delivered_orde_fyb: MoneyCell,
    pub obligations_delivered_orde_cpe: MoneyCell,
    pub ussgl480200_undelivered_or_fyb: MoneyCell,
    pub ussgl480200_undelivered_or_cpe: MoneyCell,
    pub ussgl483200_undelivered_or_cpe: MoneyCell,
    pub ussgl488200_upward_adjustm_cpe: MoneyCell,
    pub gross_outlays_undelivered_fyb: MoneyCell,
    pub gross_outlays_undelivered_cpe: MoneyCell,
    pub ussgl490200_delivered_orde_cpe: MoneyCell,
    pub ussgl490800_authority_outl_fyb: MoneyCell,
    pub ussgl490800_authority_outl_cpe: MoneyCell,
    pub ussgl498200_upward_adjustm_cpe: MoneyCell,
    pub gross_outlays_delivered_or_fyb: MoneyCell,
    pub gross_outlays_delivered_or_cpe: MoneyCell,
    pub ussgl487200_downward_adjus_cpe: MoneyCell,
    pub ussgl497200_downward_adjus_cpe: MoneyCell,
}

impl UssglColumns {
    fn money(&self, field: &str) -> Option<&MoneyCell> {
        match field {
            "ussgl480100_undelivered_or_fyb" => Some(&self.ussgl480100_undelivered_or_fyb),
            "ussgl480100_undelivered_or_cpe" => Some(&self.ussgl480100_undelivered_or_cpe),
            "ussgl483100_undelivered_or_cpe" => Some(&self.ussgl483100_undelivered_or_cpe),
            "ussgl487100_downward_adjus_cpe" => Some(&self.ussgl487100_downward_adjus_cpe),
            "ussgl488100_upward_adjustm_cpe" => Some(&self.ussgl488100_upward_adjustm_cpe),
            "obligations_undelivered_or_fyb" => Some(&self.obligations_undelivered_or_fyb),
            "obligations_undelivered_or_cpe" => Some(&self.obligations_undelivered_or_cpe),
            "ussgl490100_delivered_orde_fyb" => Some(&self.ussgl490100_delivered_orde_fyb),
            "ussgl490100_delivered_orde_cpe" => Some(&self.ussgl490100_delivered_orde_cpe),
            "ussgl493100_delivered_orde_cpe" => Some(&self.ussgl493100_delivered_orde_cpe),
            "ussgl497100_downward_adjus_cpe" => Some(&self.ussgl497100_downward_adjus_cpe),
            "ussgl498100_upward_adjustm_cpe" => Some(&self.ussgl498100_upward_adjustm_cpe),
            "obligations_delivered_orde_fyb" => Some(&self.obligations_delivered_orde_fyb),
            "obligations_delivered_orde_cpe" => Some(&self.obligations_delivered_orde_cpe),
            "ussgl480200_undelivered_or_fyb" => Some(&self.ussgl480200_undelivered_or_fyb),
            "ussgl480200_undelivered_or_cpe" => Some(&self.ussgl480200_undelivered_or_cpe),
            "ussgl483200_undelivered_or_cpe" => Some(&self.ussgl483200_undelivered_or_cpe),
            "ussgl488200_upward_adjustm_cpe" => Some(&self.ussgl488200_upward_adjustm_cpe),
            "gross_outlays_undelivered_fyb" => Some(&self.gross_outlays_undelivered_fyb),
            "gross_outlays_undelivered_cpe" => Some(&self.gross_outlays_undelivered_cpe),
            "ussgl490200_delivered_orde_cpe" => Some(&self.ussgl490200_delivered_orde_cpe),
            "ussgl490800_authority_outl_fyb" => Some(&self.ussgl490800_authority_outl_fyb),
            "ussgl490800_authority_outl_cpe" => Some(&self.ussgl490800_authority_outl_cpe),
            "ussgl498200_upward_adjustm_cpe" => Some(&self.ussgl498200_upward_adjustm_cpe),
            "gross_outlays_delivered_or_fyb" => Some(&self.gross_outlays_delivered_or_fyb),
            "gross_outlays_delivered_or_cpe" => Some(&self.gross_outlays_delivered_or_cpe),
            "ussgl487200_downward_adjus_cpe" => Some(&self.ussgl487200_downward_adjus_cpe),
            "ussgl497200_downward_adjus_cpe" => Some(&self.ussgl497200_downward_adjus_cpe),
            _ => None,
        }
    }
}

/// Program dimension columns shared by files B and C.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramColumns {
    pub object_class: String,
    pub program_activity_code: String,
    pub program_activity_name: String,
    pub by_direct_reimbursable_fun: String,
    pub disaster_emergency_fund_code: String,
    pub prior_year_adjustment: String,
}

impl ProgramColumns {
    fn text(&self, field: &str) -> Option<&str> {
        match field {
            "object_class" => Some(&self.object_class),
            "program_activity_code" => Some(&self.program_activity_code),
            "program_activity_name" => Some(&self.program_activity_name),
            "by_direct_reimbursable_fun" => Some(&self.by_direct_reimbursable_fun),
            "disaster_emergency_fund_code" => Some(&self.disaster_emergency_fund_code),
            "prior_year_adjustment" => Some(&self.prior_year_adjustment),
            _ => None,
        }
    }
}

// ============================================================================
// File B — object class / program activity balances
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramBalancesRow {
    pub row_number: u32,
    pub tas_components: TasComponents,
    pub tas: String,
    pub program: ProgramColumns,
    pub ussgl: UssglColumns,

    pub gross_outlay_amount_by_pro_fyb: MoneyCell,
    pub gross_outlay_amount_by_pro_cpe: MoneyCell,
    pub obligations_incurred_by_pr_cpe: MoneyCell,
    pub deobligations_recov_by_pro_cpe: MoneyCell,
}

impl StagedRow for ProgramBalancesRow {
    fn row_number(&self) -> u32 {
        self.row_number
    }

    fn money(&self, field: &str) -> Option<&MoneyCell> {
        match field {
            "gross_outlay_amount_by_pro_fyb" => Some(&self.gross_outlay_amount_by_pro_fyb),
            "gross_outlay_amount_by_pro_cpe" => Some(&self.gross_outlay_amount_by_pro_cpe),
            "obligations_incurred_by_pr_cpe" => Some(&self.obligations_incurred_by_pr_cpe),
            "deobligations_recov_by_pro_cpe" => Some(&self.deobligations_recov_by_pro_cpe),
            _ => self.ussgl.money(field),
        }
    }

    fn text(&self, field: &str) -> Option<&str> {
        tas_text(&self.tas_components, &self.tas, field).or_else(|| self.program.text(field))
    }
}

// ============================================================================
// File C — award financial
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardFinancialRow {
    pub row_number: u32,
    pub tas_components: TasComponents,
    pub tas: String,
    pub program: ProgramColumns,
    pub ussgl: UssglColumns,

    pub piid: String,
    pub parent_award_id: String,
    pub fain: String,
    pub uri: String,

    pub transaction_obligated_amou: MoneyCell,
    pub gross_outlay_amount_by_awa_fyb: MoneyCell,
    pub gross_outlay_amount_by_awa_cpe: MoneyCell,
    pub obligations_incurred_byawa_cpe: MoneyCell,
    pub deobligations_recov_by_awa_cpe: MoneyCell,
}

impl StagedRow for AwardFinancialRow {
    fn row_number(&self) -> u32 {
        self.row_number
    }

    fn money(&self, field: &str) -> Option<&MoneyCell> {
        match field {
            "transaction_obligated_amou" => Some(&self.transaction_obligated_amou),
            "gross_outlay_amount_by_awa_fyb" => Some(&self.gross_outlay_amount_by_awa_fyb),
            "gross_outlay_amount_by_awa_cpe" => Some(&self.gross_outlay_amount_by_awa_cpe),
            "obligations_incurred_byawa_cpe" => Some(&self.obligations_incurred_byawa_cpe),
            "deobligations_recov_by_awa_cpe" => Some(&self.deobligations_recov_by_awa_cpe),
            _ => self.ussgl.money(field),
        }
    }

    fn text(&self, field: &str) -> Option<&str> {
        match field {
            "piid" => Some(&self.piid),
            "parent_award_id" => Some(&self.parent_award_id),
            "fain" => Some(&self.fain),
            "uri" => Some(&self.uri),
            _ => tas_text(&self.tas_components, &self.tas, field)
                .or_else(|| self.program.text(field)),
        }
    }
}

// ============================================================================
// File D2 — financial assistance (FABS)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistanceRow {
    pub row_number: u32,

    pub afa_generated_unique: String,
    pub fain: String,
    pub uri: String,
    pub award_modification_amendme: String,
    pub awarding_sub_tier_agency_c: String,

    pub action_date: String,
    /// Parsed action date; `None` when the submitted text is malformed
    /// (the format rule reports it, downstream date rules see null).
    pub action_date_parsed: Option<NaiveDate>,
    pub action_type: String,
    pub assistance_type: String,
    pub record_type: String,
    pub correction_delete_indicatr: String,
    pub cdi: CorrectionDeleteIndicator,

    pub uei: String,
    pub awardee_or_recipient_uniqu: String,
    pub awardee_or_recipient_legal: String,

    pub legal_entity_address_line1: String,
    pub legal_entity_city_name: String,
    pub legal_entity_state_code: String,
    pub legal_entity_zip5: String,
    pub legal_entity_zip_last4: String,
    pub legal_entity_congressional: String,
    pub legal_entity_country_code: String,

    pub place_of_performance_code: String,
    pub place_of_performance_zip4a: String,
    pub place_of_performance_congr: String,
    pub place_of_perform_country_c: String,

    pub cfda_number: String,
    pub business_types: String,
    pub award_description: String,

    pub period_of_performance_star: String,
    pub period_of_performance_curr: String,

    pub federal_action_obligation: MoneyCell,
    pub face_value_loan_guarantee: MoneyCell,
    pub original_loan_subsidy_cost: MoneyCell,
}

impl AssistanceRow {
    /// Lowercase `mod_subtier_fain_uri` transaction key; blank components
    /// join as empty segments.
    pub fn derive_unique_id(
        modification: &str,
        sub_tier: &str,
        fain: &str,
        uri: &str,
    ) -> String {
        format!(
            "{}_{}_{}_{}",
            modification.trim().to_lowercase(),
            sub_tier.trim().to_lowercase(),
            fain.trim().to_lowercase(),
            uri.trim().to_lowercase()
        )
    }
}

impl StagedRow for AssistanceRow {
    fn row_number(&self) -> u32 {
        self.row_number
    }

    fn money(&self, field: &str) -> Option<&MoneyCell> {
        match field {
            "federal_action_obligation" => Some(&self.federal_action_obligation),
            "face_value_loan_guarantee" => Some(&self.face_value_loan_guarantee),
            "original_loan_subsidy_cost" => Some(&self.original_loan_subsidy_cost),
            _ => None,
        }
    }

    fn text(&self, field: &str) -> Option<&str> {
        match field {
            "afa_generated_unique" => Some(&self.afa_generated_unique),
            "fain" => Some(&self.fain),
            "uri" => Some(&self.uri),
            "award_modification_amendme" => Some(&self.award_modification_amendme),
            "awarding_sub_tier_agency_c" => Some(&self.awarding_sub_tier_agency_c),
            "action_date" => Some(&self.action_date),
            "action_type" => Some(&self.action_type),
            "assistance_type" => Some(&self.assistance_type),
            "record_type" => Some(&self.record_type),
            "correction_delete_indicatr" => Some(&self.correction_delete_indicatr),
            "uei" => Some(&self.uei),
            "awardee_or_recipient_uniqu" => Some(&self.awardee_or_recipient_uniqu),
            "awardee_or_recipient_legal" => Some(&self.awardee_or_recipient_legal),
            "legal_entity_address_line1" => Some(&self.legal_entity_address_line1),
            "legal_entity_city_name" => Some(&self.legal_entity_city_name),
            "legal_entity_state_code" => Some(&self.legal_entity_state_code),
            "legal_entity_zip5" => Some(&self.legal_entity_zip5),
            "legal_entity_zip_last4" => Some(&self.legal_entity_zip_last4),
            "legal_entity_congressional" => Some(&self.legal_entity_congressional),
            "legal_entity_country_code" => Some(&self.legal_entity_country_code),
            "place_of_performance_code" => Some(&self.place_of_performance_code),
            "place_of_performance_zip4a" => Some(&self.place_of_performance_zip4a),
            "place_of_performance_congr" => Some(&self.place_of_performance_congr),
            "place_of_perform_country_c" => Some(&self.place_of_perform_country_c),
            "cfda_number" => Some(&self.cfda_number),
            "business_types" => Some(&self.business_types),
            "award_description" => Some(&self.award_description),
            "period_of_performance_star" => Some(&self.period_of_performance_star),
            "period_of_performance_curr" => Some(&self.period_of_performance_curr),
            _ => None,
        }
    }
}

// ============================================================================
// Staged submission and published store
// ============================================================================

/// The working copy under validation: one submission plus its staged files.
/// A DABS upload carries files A/B/C; a FABS upload carries assistance rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedSubmission {
    pub submission: Submission,
    pub appropriations: Vec<AppropriationRow>,
    pub program_balances: Vec<ProgramBalancesRow>,
    pub award_financial: Vec<AwardFinancialRow>,
    pub assistance: Vec<AssistanceRow>,
}

impl StagedSubmission {
    pub fn new(submission: Submission) -> Self {
        Self {
            submission,
            appropriations: Vec::new(),
            program_balances: Vec::new(),
            award_financial: Vec::new(),
            assistance: Vec::new(),
        }
    }

    /// Files actually present in this upload.
    pub fn present_files(&self) -> Vec<SubmissionFile> {
        let mut files = Vec::new();
        if !self.appropriations.is_empty() {
            files.push(SubmissionFile::A);
        }
        if !self.program_balances.is_empty() {
            files.push(SubmissionFile::B);
        }
        if !self.award_financial.is_empty() {
            files.push(SubmissionFile::C);
        }
        if !self.assistance.is_empty() {
            files.push(SubmissionFile::Fabs);
        }
        files
    }

    pub fn row_count(&self, file: SubmissionFile) -> usize {
        match file {
            SubmissionFile::A => self.appropriations.len(),
            SubmissionFile::B => self.program_balances.len(),
            SubmissionFile::C => self.award_financial.len(),
            SubmissionFile::Fabs => self.assistance.len(),
        }
    }
}

/// A published (certified) assistance transaction, reduced to what
/// cross-submission and cross-file rules join against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedAssistance {
    /// Lowercase transaction key (same derivation as the staged rows).
    pub unique_id: String,
    pub fain: String,
    pub uri: String,
    pub federal_action_obligation: MoneyCell,
}

/// One certified submission retained for carry-forward and correction
/// matching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishedSubmission {
    pub fiscal_period: u8,
    pub award_financial: Vec<AwardFinancialRow>,
    pub assistance: Vec<PublishedAssistance>,
}

/// Prior certified submissions keyed by agency and fiscal year, ordered by
/// period. Promotion replaces any earlier copy for the same period.
#[derive(Debug, Clone, Default)]
pub struct PublishedStore {
    by_agency_year: BTreeMap<(String, u16), BTreeMap<u8, PublishedSubmission>>,
}

impl PublishedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(
        &mut self,
        agency_code: &str,
        fiscal_year: FiscalYear,
        published: PublishedSubmission,
    ) {
        self.by_agency_year
            .entry((agency_code.trim().to_ascii_uppercase(), fiscal_year.0))
            .or_default()
            .insert(published.fiscal_period, published);
    }

    /// Most recently certified period strictly before `period` within the
    /// same fiscal year.
    pub fn prior_before(
        &self,
        agency_code: &str,
        fiscal_year: FiscalYear,
        period: FiscalPeriod,
    ) -> Option<&PublishedSubmission> {
        let periods = self
            .by_agency_year
            .get(&(agency_code.trim().to_ascii_uppercase(), fiscal_year.0))?;
        periods
            .range(..period.get())
            .next_back()
            .map(|(_, submission)| submission)
    }

    /// Every certified assistance transaction in the store, across agencies
    /// and years. Cross-file joins against generated D2 data read this view.
    pub fn all_assistance(&self) -> impl Iterator<Item = &PublishedAssistance> {
        self.by_agency_year
            .values()
            .flat_map(BTreeMap::values)
            .flat_map(|submission| submission.assistance.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.by_agency_year.is_empty()
    }
}
