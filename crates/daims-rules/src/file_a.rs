//! File A (appropriations account) rules.
//!
//! File A reconciles one row per TAS against Treasury's account dimension
//! and the GTAS SF-133 balances for the same fiscal year and period. Every
//! rule here is fatal: a File A mismatch blocks certification.

use daims_model::issue::Severity;
use daims_model::staging::SubmissionFile;

use crate::error::Result;
use crate::predicate::{Addend, Predicate};
use crate::rule::Rule;

const KEY: &[&str] = &["tas"];

pub(crate) fn rules() -> Result<Vec<Rule>> {
    Ok(vec![
        Rule::new(
            "A1",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::TasAvailabilityCoversYear,
        )?
        .fields(&["tas"])
        .unique_key(KEY)
        .message(
            "TAS {tas} is not defined in Treasury's account dimension with an \
             availability period covering the submission fiscal year",
        ),
        Rule::new(
            "A2",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::SumEquals {
                target: "total_budgetary_resources_cpe",
                addends: const {
                    &[
                        Addend::plus("budget_authority_appropria_cpe"),
                        Addend::plus("budget_authority_unobligat_fyb"),
                        Addend::plus("adjustments_to_unobligated_cpe"),
                        Addend::plus("other_budgetary_resources_cpe"),
                    ]
                },
            },
        )?
        .fields(&[
            "total_budgetary_resources_cpe",
            "budget_authority_appropria_cpe",
            "budget_authority_unobligat_fyb",
            "adjustments_to_unobligated_cpe",
            "other_budgetary_resources_cpe",
        ])
        .unique_key(KEY)
        .message(
            "TotalBudgetaryResources_CPE does not equal \
             BudgetAuthorityAppropriatedAmount_CPE + \
             BudgetAuthorityUnobligatedBalanceBroughtForward_FYB + \
             AdjustmentsToUnobligatedBalanceBroughtForward_CPE + \
             OtherBudgetaryResourcesAmount_CPE",
        ),
        Rule::new(
            "A3",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::SumEquals {
                target: "other_budgetary_resources_cpe",
                addends: const {
                    &[
                        Addend::plus("contract_authority_amount_cpe"),
                        Addend::plus("borrowing_authority_amount_cpe"),
                        Addend::plus("spending_authority_from_of_cpe"),
                    ]
                },
            },
        )?
        .fields(&[
            "other_budgetary_resources_cpe",
            "contract_authority_amount_cpe",
            "borrowing_authority_amount_cpe",
            "spending_authority_from_of_cpe",
        ])
        .unique_key(KEY)
        .message(
            "OtherBudgetaryResourcesAmount_CPE does not equal \
             ContractAuthorityAmountTotal_CPE + BorrowingAuthorityAmountTotal_CPE + \
             SpendingAuthorityFromOffsettingCollectionsAmountTotal_CPE",
        ),
        Rule::new(
            "A4",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::SumEquals {
                target: "status_of_budgetary_resour_cpe",
                addends: const {
                    &[
                        Addend::plus("obligations_incurred_total_cpe"),
                        Addend::plus("unobligated_balance_cpe"),
                    ]
                },
            },
        )?
        .fields(&[
            "status_of_budgetary_resour_cpe",
            "obligations_incurred_total_cpe",
            "unobligated_balance_cpe",
        ])
        .unique_key(KEY)
        .message(
            "StatusOfBudgetaryResourcesTotal_CPE does not equal \
             ObligationsIncurredTotalByTAS_CPE + UnobligatedBalance_CPE",
        ),
        Rule::new(
            "A7",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::Sf133SumMatches {
                field: "budget_authority_unobligat_fyb",
                lines: &[1000],
            },
        )?
        .fields(&["budget_authority_unobligat_fyb"])
        .unique_key(KEY)
        .message(
            "BudgetAuthorityUnobligatedBalanceBroughtForward_FYB does not equal \
             SF-133 line 1000 for TAS {tas}",
        ),
        Rule::new(
            "A9",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::Sf133SumMatches {
                field: "contract_authority_amount_cpe",
                lines: &[1540, 1640],
            },
        )?
        .fields(&["contract_authority_amount_cpe"])
        .unique_key(KEY)
        .message(
            "ContractAuthorityAmountTotal_CPE does not equal the sum of SF-133 \
             lines 1540 and 1640 for TAS {tas}",
        ),
        Rule::new(
            "A10",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::Sf133SumMatches {
                field: "borrowing_authority_amount_cpe",
                lines: &[1340, 1440],
            },
        )?
        .fields(&["borrowing_authority_amount_cpe"])
        .unique_key(KEY)
        .message(
            "BorrowingAuthorityAmountTotal_CPE does not equal the sum of SF-133 \
             lines 1340 and 1440 for TAS {tas}",
        ),
        Rule::new(
            "A11",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::Sf133SumMatches {
                field: "spending_authority_from_of_cpe",
                lines: &[1750, 1850],
            },
        )?
        .fields(&["spending_authority_from_of_cpe"])
        .unique_key(KEY)
        .message(
            "SpendingAuthorityFromOffsettingCollectionsAmountTotal_CPE does not \
             equal the sum of SF-133 lines 1750 and 1850 for TAS {tas}",
        ),
        Rule::new(
            "A16",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::Sf133SumMatches {
                field: "status_of_budgetary_resour_cpe",
                lines: &[2500],
            },
        )?
        .fields(&["status_of_budgetary_resour_cpe"])
        .unique_key(KEY)
        .message(
            "StatusOfBudgetaryResourcesTotal_CPE does not equal SF-133 line 2500 \
             for TAS {tas}",
        ),
        Rule::new(
            "A18",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::Sf133SumMatches {
                field: "gross_outlay_amount_by_tas_cpe",
                lines: &[3020],
            },
        )?
        .fields(&["gross_outlay_amount_by_tas_cpe"])
        .unique_key(KEY)
        .message("GrossOutlayAmountByTAS_CPE does not equal SF-133 line 3020 for TAS {tas}"),
        Rule::new(
            "A19",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::Sf133SumMatches {
                field: "obligations_incurred_total_cpe",
                lines: &[2190],
            },
        )?
        .fields(&["obligations_incurred_total_cpe"])
        .unique_key(KEY)
        .message(
            "ObligationsIncurredTotalByTAS_CPE does not equal SF-133 line 2190 \
             for TAS {tas}",
        ),
        Rule::new(
            "A24",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::FieldsEqual {
                left: "status_of_budgetary_resour_cpe",
                right: "total_budgetary_resources_cpe",
            },
        )?
        .fields(&[
            "status_of_budgetary_resour_cpe",
            "total_budgetary_resources_cpe",
        ])
        .unique_key(KEY)
        .message(
            "StatusOfBudgetaryResourcesTotal_CPE does not equal \
             TotalBudgetaryResources_CPE",
        ),
        Rule::new("A33", SubmissionFile::A, Severity::Fatal, Predicate::TasInSf133)?
            .fields(&["tas"])
            .unique_key(KEY)
            .message("TAS {tas} was reported in the SF-133 but does not appear in File A"),
        Rule::new(
            "A35",
            SubmissionFile::A,
            Severity::Fatal,
            Predicate::Sf133SumMatches {
                field: "deobligations_recoveries_r_cpe",
                lines: &[1021, 1033],
            },
        )?
        .fields(&["deobligations_recoveries_r_cpe"])
        .unique_key(KEY)
        .message(
            "DeobligationsRecoveriesRefundsByTAS_CPE does not equal the sum of \
             SF-133 lines 1021 and 1033 for TAS {tas}",
        ),
    ])
}
