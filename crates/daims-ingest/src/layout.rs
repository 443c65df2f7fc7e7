//! Submitted file layouts and header resolution.
//!
//! Agencies submit files under the published DAIMS header names
//! (`TotalBudgetaryResources_CPE`); the rest of the pipeline works in the
//! truncated snake_case staging names (`total_budgetary_resources_cpe`).
//! Resolution ignores case and punctuation, so where the published name
//! differs from the staging name only in spelling no alias is needed; an
//! alias entry exists wherever truncation cut a word short.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use daims_model::staging::SubmissionFile;

use crate::error::{IngestError, Result};

/// One staging column and the submitted header spellings that land on it.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub staging: &'static str,
    pub aliases: &'static [&'static str],
    /// Required columns must appear in the header row even when every value
    /// is blank. Optional columns stage as blank when absent.
    pub required: bool,
}

const fn col(staging: &'static str, aliases: &'static [&'static str]) -> ColumnSpec {
    ColumnSpec {
        staging,
        aliases,
        required: true,
    }
}

const fn opt(staging: &'static str, aliases: &'static [&'static str]) -> ColumnSpec {
    ColumnSpec {
        staging,
        aliases,
        required: false,
    }
}

// ==== Shared column groups ====

const TAS_COLUMNS: &[ColumnSpec] = &[
    col(
        "allocation_transfer_agency",
        &["AllocationTransferAgencyIdentifier"],
    ),
    col("agency_identifier", &[]),
    col(
        "beginning_period_of_availa",
        &["BeginningPeriodOfAvailability"],
    ),
    col("ending_period_of_availabil", &["EndingPeriodOfAvailability"]),
    col("availability_type_code", &[]),
    col("main_account_code", &[]),
    col("sub_account_code", &[]),
];

const PROGRAM_COLUMNS: &[ColumnSpec] = &[
    col("object_class", &[]),
    col("program_activity_code", &[]),
    col("program_activity_name", &[]),
    col(
        "by_direct_reimbursable_fun",
        &["ByDirectReimbursableFundingSource"],
    ),
    col("disaster_emergency_fund_code", &[]),
    opt("prior_year_adjustment", &[]),
];

const USSGL_COLUMNS: &[ColumnSpec] = &[
    col(
        "ussgl480100_undelivered_or_fyb",
        &["USSGL480100_UndeliveredOrdersObligationsUnpaid_FYB"],
    ),
    col(
        "ussgl480100_undelivered_or_cpe",
        &["USSGL480100_UndeliveredOrdersObligationsUnpaid_CPE"],
    ),
    col(
        "ussgl483100_undelivered_or_cpe",
        &["USSGL483100_UndeliveredOrdersObligationsTransferredUnpaid_CPE"],
    ),
    col(
        "ussgl487100_downward_adjus_cpe",
        &["USSGL487100_DownwardAdjustmentsOfPriorYearUnpaidUndeliveredOrdersObligationsRecoveries_CPE"],
    ),
    col(
        "ussgl488100_upward_adjustm_cpe",
        &["USSGL488100_UpwardAdjustmentsOfPriorYearUndeliveredOrdersObligationsUnpaid_CPE"],
    ),
    col(
        "obligations_undelivered_or_fyb",
        &["ObligationsUndeliveredOrdersUnpaidTotal_FYB"],
    ),
    col(
        "obligations_undelivered_or_cpe",
        &["ObligationsUndeliveredOrdersUnpaidTotal_CPE"],
    ),
    col(
        "ussgl490100_delivered_orde_fyb",
        &["USSGL490100_DeliveredOrdersObligationsUnpaid_FYB"],
    ),
    col(
        "ussgl490100_delivered_orde_cpe",
        &["USSGL490100_DeliveredOrdersObligationsUnpaid_CPE"],
    ),
    col(
        "ussgl493100_delivered_orde_cpe",
        &["USSGL493100_DeliveredOrdersObligationsTransferredUnpaid_CPE"],
    ),
    col(
        "ussgl497100_downward_adjus_cpe",
        &["USSGL497100_DownwardAdjustmentsOfPriorYearUnpaidDeliveredOrdersObligationsRecoveries_CPE"],
    ),
    col(
        "ussgl498100_upward_adjustm_cpe",
        &["USSGL498100_UpwardAdjustmentsOfPriorYearDeliveredOrdersObligationsUnpaid_CPE"],
    ),
    col(
        "obligations_delivered_orde_fyb",
        &["ObligationsDeliveredOrdersUnpaidTotal_FYB"],
    ),
    col(
        "obligations_delivered_orde_cpe",
        &["ObligationsDeliveredOrdersUnpaidTotal_CPE"],
    ),
    col(
        "ussgl480200_undelivered_or_fyb",
        &["USSGL480200_UndeliveredOrdersObligationsPrepaidAdvanced_FYB"],
    ),
    col(
        "ussgl480200_undelivered_or_cpe",
        &["USSGL480200_UndeliveredOrdersObligationsPrepaidAdvanced_CPE"],
    ),
    col(
        "ussgl483200_undelivered_or_cpe",
        &["USSGL483200_UndeliveredOrdersObligationsTransferredPrepaidAdvanced_CPE"],
    ),
    col(
        "ussgl488200_upward_adjustm_cpe",
        &["USSGL488200_UpwardAdjustmentsOfPriorYearUndeliveredOrdersObligationsPrepaidAdvanced_CPE"],
    ),
    col(
        "gross_outlays_undelivered_fyb",
        &["GrossOutlaysUndeliveredOrdersPrepaidTotal_FYB"],
    ),
    col(
        "gross_outlays_undelivered_cpe",
        &["GrossOutlaysUndeliveredOrdersPrepaidTotal_CPE"],
    ),
    col(
        "ussgl490200_delivered_orde_cpe",
        &["USSGL490200_DeliveredOrdersObligationsPaid_CPE"],
    ),
    col(
        "ussgl490800_authority_outl_fyb",
        &["USSGL490800_AuthorityOutlayedNotYetDisbursed_FYB"],
    ),
    col(
        "ussgl490800_authority_outl_cpe",
        &["USSGL490800_AuthorityOutlayedNotYetDisbursed_CPE"],
    ),
    col(
        "ussgl498200_upward_adjustm_cpe",
        &["USSGL498200_UpwardAdjustmentsOfPriorYearDeliveredOrdersObligationsPaid_CPE"],
    ),
    col(
        "gross_outlays_delivered_or_fyb",
        &["GrossOutlaysDeliveredOrdersPaidTotal_FYB"],
    ),
    col(
        "gross_outlays_delivered_or_cpe",
        &["GrossOutlaysDeliveredOrdersPaidTotal_CPE"],
    ),
    col(
        "ussgl487200_downward_adjus_cpe",
        &["USSGL487200_DownwardAdjustmentsOfPriorYearPrepaidAdvancedUndeliveredOrdersObligationsRefundsCollected_CPE"],
    ),
    col(
        "ussgl497200_downward_adjus_cpe",
        &["USSGL497200_DownwardAdjustmentsOfPriorYearPaidDeliveredOrdersObligationsRefundsCollected_CPE"],
    ),
];

// ==== Per-file column groups ====

const APPROPRIATION_COLUMNS: &[ColumnSpec] = &[
    col("total_budgetary_resources_cpe", &[]),
    col(
        "budget_authority_appropria_cpe",
        &["BudgetAuthorityAppropriatedAmount_CPE"],
    ),
    col(
        "budget_authority_unobligat_fyb",
        &["BudgetAuthorityUnobligatedBalanceBroughtForward_FYB"],
    ),
    col(
        "adjustments_to_unobligated_cpe",
        &["AdjustmentsToUnobligatedBalanceBroughtForward_CPE"],
    ),
    col(
        "other_budgetary_resources_cpe",
        &["OtherBudgetaryResourcesAmount_CPE"],
    ),
    col(
        "contract_authority_amount_cpe",
        &["ContractAuthorityAmountTotal_CPE"],
    ),
    col(
        "borrowing_authority_amount_cpe",
        &["BorrowingAuthorityAmountTotal_CPE"],
    ),
    col(
        "spending_authority_from_of_cpe",
        &["SpendingAuthorityFromOffsettingCollectionsAmountTotal_CPE"],
    ),
    col(
        "status_of_budgetary_resour_cpe",
        &["StatusOfBudgetaryResourcesTotal_CPE"],
    ),
    col(
        "obligations_incurred_total_cpe",
        &["ObligationsIncurredTotalByTAS_CPE"],
    ),
    col("unobligated_balance_cpe", &[]),
    col("gross_outlay_amount_by_tas_cpe", &[]),
    col(
        "deobligations_recoveries_r_cpe",
        &["DeobligationsRecoveriesRefundsByTAS_CPE"],
    ),
];

const PROGRAM_BALANCES_COLUMNS: &[ColumnSpec] = &[
    col(
        "gross_outlay_amount_by_pro_fyb",
        &["GrossOutlayAmountByProgramObjectClass_FYB"],
    ),
    col(
        "gross_outlay_amount_by_pro_cpe",
        &["GrossOutlayAmountByProgramObjectClass_CPE"],
    ),
    col(
        "obligations_incurred_by_pr_cpe",
        &["ObligationsIncurredByProgramObjectClass_CPE"],
    ),
    // The published layout spells this with a stray "d"; accept both.
    col(
        "deobligations_recov_by_pro_cpe",
        &[
            "DeobligationsRecoveriesRefundsdByProgramObjectClass_CPE",
            "DeobligationsRecoveriesRefundsByProgramObjectClass_CPE",
        ],
    ),
];

const AWARD_FINANCIAL_COLUMNS: &[ColumnSpec] = &[
    col("piid", &[]),
    col("parent_award_id", &[]),
    col("fain", &[]),
    col("uri", &[]),
    col("transaction_obligated_amou", &["TransactionObligatedAmount"]),
    col(
        "gross_outlay_amount_by_awa_fyb",
        &["GrossOutlayAmountByAward_FYB"],
    ),
    col(
        "gross_outlay_amount_by_awa_cpe",
        &["GrossOutlayAmountByAward_CPE"],
    ),
    col(
        "obligations_incurred_byawa_cpe",
        &["ObligationsIncurredByAward_CPE"],
    ),
    col(
        "deobligations_recov_by_awa_cpe",
        &["DeobligationsRecoveriesRefundsOfPriorYearByAward_CPE"],
    ),
];

const ASSISTANCE_COLUMNS: &[ColumnSpec] = &[
    col("fain", &[]),
    col("uri", &[]),
    col(
        "award_modification_amendme",
        &["AwardModificationAmendmentNumber"],
    ),
    col("awarding_sub_tier_agency_c", &["AwardingSubTierAgencyCode"]),
    col("action_date", &[]),
    col("action_type", &[]),
    col("assistance_type", &[]),
    col("record_type", &[]),
    col("correction_delete_indicatr", &["CorrectionDeleteIndicator"]),
    // UEI joined the layout in 2022; older files do not carry it.
    opt("uei", &["AwardeeOrRecipientUEI"]),
    col(
        "awardee_or_recipient_uniqu",
        &["AwardeeOrRecipientUniqueIdentifier"],
    ),
    col(
        "awardee_or_recipient_legal",
        &["AwardeeOrRecipientLegalEntityName"],
    ),
    col("legal_entity_address_line1", &[]),
    col("legal_entity_city_name", &[]),
    col("legal_entity_state_code", &[]),
    col("legal_entity_zip5", &[]),
    col("legal_entity_zip_last4", &[]),
    col(
        "legal_entity_congressional",
        &["LegalEntityCongressionalDistrict"],
    ),
    col("legal_entity_country_code", &[]),
    col(
        "place_of_performance_code",
        &["PrimaryPlaceOfPerformanceCode"],
    ),
    col(
        "place_of_performance_zip4a",
        &["PrimaryPlaceOfPerformanceZIP+4"],
    ),
    col(
        "place_of_performance_congr",
        &["PrimaryPlaceOfPerformanceCongressionalDistrict"],
    ),
    col(
        "place_of_perform_country_c",
        &["PrimaryPlaceOfPerformanceCountryCode"],
    ),
    col("cfda_number", &["CFDA_Number", "AssistanceListingNumber"]),
    col("business_types", &[]),
    col("award_description", &[]),
    col(
        "period_of_performance_star",
        &["PeriodOfPerformanceStartDate"],
    ),
    col(
        "period_of_performance_curr",
        &["PeriodOfPerformanceCurrentEndDate"],
    ),
    col("federal_action_obligation", &[]),
    col(
        "face_value_loan_guarantee",
        &["FaceValueOfDirectLoanOrLoanGuarantee"],
    ),
    col("original_loan_subsidy_cost", &[]),
];

/// Column set for one submitted file.
pub fn layout_for(file: SubmissionFile) -> Vec<ColumnSpec> {
    match file {
        SubmissionFile::A => [TAS_COLUMNS, APPROPRIATION_COLUMNS].concat(),
        SubmissionFile::B => [
            TAS_COLUMNS,
            PROGRAM_COLUMNS,
            USSGL_COLUMNS,
            PROGRAM_BALANCES_COLUMNS,
        ]
        .concat(),
        SubmissionFile::C => [
            TAS_COLUMNS,
            PROGRAM_COLUMNS,
            USSGL_COLUMNS,
            AWARD_FINANCIAL_COLUMNS,
        ]
        .concat(),
        SubmissionFile::Fabs => ASSISTANCE_COLUMNS.to_vec(),
    }
}

/// Lowercases and strips everything but ASCII letters and digits, so header
/// matching ignores case, underscores, `+`, and a leading UTF-8 BOM.
fn normalize(header: &str) -> String {
    header
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Maps submitted headers onto staging columns.
///
/// Returns staging name to zero-based column index. Headers that match no
/// staging column are ignored; a required column with no matching header is
/// an error, as are two headers landing on the same staging column.
pub fn resolve_columns(
    layout: &[ColumnSpec],
    headers: &[String],
    file: SubmissionFile,
    path: &Path,
) -> Result<BTreeMap<&'static str, usize>> {
    let mut targets: HashMap<String, &'static str> = HashMap::new();
    for spec in layout {
        targets.insert(normalize(spec.staging), spec.staging);
        for alias in spec.aliases {
            targets.insert(normalize(alias), spec.staging);
        }
    }

    let mut resolved: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut matched_header: HashMap<&'static str, &str> = HashMap::new();
    for (idx, header) in headers.iter().enumerate() {
        let Some(&staging) = targets.get(&normalize(header)) else {
            tracing::debug!(file = %file, header = %header, "ignoring unrecognized column");
            continue;
        };
        if let Some(original) = matched_header.get(staging) {
            return Err(IngestError::DuplicateColumn {
                path: path.to_path_buf(),
                duplicate: header.clone(),
                original: (*original).to_string(),
                staging,
            });
        }
        matched_header.insert(staging, header);
        resolved.insert(staging, idx);
    }

    let missing: Vec<String> = layout
        .iter()
        .filter(|spec| spec.required && !resolved.contains_key(spec.staging))
        .map(|spec| spec.staging.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(IngestError::MissingColumns {
            file: file.as_str(),
            path: path.to_path_buf(),
            columns: missing,
        });
    }

    Ok(resolved)
}
