//! File C (award financial) rules.
//!
//! File C ties obligations and outlays to individual awards. Its rules are
//! row-local USSGL reconciliations plus the cross-file joins back to File B
//! and to published award data.

use daims_model::issue::Severity;
use daims_model::staging::SubmissionFile;
use daims_reference::store::Dimension;

use crate::condition::Condition;
use crate::error::Result;
use crate::predicate::{Addend, Predicate, ReferenceCheck};
use crate::rule::Rule;

const AWARD_KEY: &[&str] = &["piid", "fain", "uri"];

/// The award reporting combination a carried-forward balance is tracked by.
const CARRY_GROUP: &[&str] = &[
    "tas",
    "disaster_emergency_fund_code",
    "piid",
    "fain",
    "uri",
    "program_activity_code",
    "program_activity_name",
    "object_class",
    "by_direct_reimbursable_fun",
    "prior_year_adjustment",
];

pub(crate) fn rules() -> Result<Vec<Rule>> {
    Ok(vec![
        Rule::new(
            "C5",
            SubmissionFile::C,
            Severity::Fatal,
            Predicate::SumEquals {
                target: "gross_outlay_amount_by_awa_cpe",
                addends: const {
                    &[
                        Addend::plus("gross_outlays_undelivered_cpe"),
                        Addend::plus("gross_outlays_delivered_or_cpe"),
                        Addend::minus("gross_outlays_undelivered_fyb"),
                        Addend::minus("gross_outlays_delivered_or_fyb"),
                    ]
                },
            },
        )?
        .fields(&[
            "gross_outlay_amount_by_awa_cpe",
            "gross_outlays_undelivered_cpe",
            "gross_outlays_delivered_or_cpe",
            "gross_outlays_undelivered_fyb",
            "gross_outlays_delivered_or_fyb",
        ])
        .unique_key(AWARD_KEY)
        .message(
            "GrossOutlayAmountByAward_CPE does not equal gross outlays delivered \
             and undelivered (CPE) less the amounts brought forward (FYB) on \
             this row",
        ),
        Rule::new(
            "C6",
            SubmissionFile::C,
            Severity::Fatal,
            Predicate::SumEquals {
                target: "obligations_incurred_byawa_cpe",
                addends: const {
                    &[
                        Addend::minus("obligations_undelivered_or_cpe"),
                        Addend::minus("obligations_delivered_orde_cpe"),
                        Addend::plus("obligations_undelivered_or_fyb"),
                        Addend::plus("obligations_delivered_orde_fyb"),
                    ]
                },
            },
        )?
        .fields(&[
            "obligations_incurred_byawa_cpe",
            "obligations_undelivered_or_cpe",
            "obligations_delivered_orde_cpe",
            "obligations_undelivered_or_fyb",
            "obligations_delivered_orde_fyb",
        ])
        .unique_key(AWARD_KEY)
        .message(
            "ObligationsIncurredByAward_CPE does not equal the change in unpaid \
             obligations (FYB less CPE, delivered and undelivered) on this row",
        ),
        Rule::new(
            "C8",
            SubmissionFile::C,
            Severity::Warning,
            Predicate::FabsAwardExists {
                key_field: "fain",
                when: Condition::FieldPresent { field: "fain" },
            },
        )?
        .fields(&["fain"])
        .unique_key(AWARD_KEY)
        .message("FAIN {fain} has not been published in FABS"),
        Rule::new(
            "C11",
            SubmissionFile::C,
            Severity::Warning,
            Predicate::CrossFileCombosExist {
                fields: &[
                    "tas",
                    "object_class",
                    "program_activity_code",
                    "disaster_emergency_fund_code",
                    "prior_year_adjustment",
                ],
            },
        )?
        .fields(&[
            "tas",
            "object_class",
            "program_activity_code",
            "disaster_emergency_fund_code",
            "prior_year_adjustment",
        ])
        .unique_key(AWARD_KEY)
        .message(
            "The combination of TAS, object class, program activity, DEFC, and \
             PYA on this row does not appear in File B",
        ),
        Rule::new(
            "C12",
            SubmissionFile::C,
            Severity::Fatal,
            Predicate::AnyFieldPresent {
                fields: &["piid", "fain", "uri"],
                when: Condition::Always,
            },
        )?
        .fields(&["piid", "fain", "uri"])
        .unique_key(AWARD_KEY)
        .message("Each row must identify an award by PIID, FAIN, or URI"),
        Rule::new(
            "C14",
            SubmissionFile::C,
            Severity::Fatal,
            Predicate::ReferenceExists(ReferenceCheck {
                dimension: Dimension::Defc,
                fields: &["disaster_emergency_fund_code"],
                when: Condition::Always,
                reject_territories: false,
            }),
        )?
        .fields(&["disaster_emergency_fund_code"])
        .unique_key(AWARD_KEY)
        .message(
            "DisasterEmergencyFundCode {disaster_emergency_fund_code} is not a \
             valid code",
        ),
        Rule::new("C20", SubmissionFile::C, Severity::Warning, Predicate::Unenforced)?
            .fields(&[])
            .unique_key(AWARD_KEY)
            .message("This rule is registered but not enforced"),
        Rule::new(
            "C23.1",
            SubmissionFile::C,
            Severity::Warning,
            Predicate::CrossFileSums { key_field: "fain" },
        )?
        .fields(&["fain", "transaction_obligated_amou"])
        .unique_key(AWARD_KEY)
        .message(
            "The sum of TransactionObligatedAmount for FAIN {fain} in File C \
             does not match the sum of FederalActionObligation in published \
             assistance data",
        ),
        Rule::new(
            "C23.2",
            SubmissionFile::C,
            Severity::Warning,
            Predicate::CrossFileSums { key_field: "uri" },
        )?
        .fields(&["uri", "transaction_obligated_amou"])
        .unique_key(AWARD_KEY)
        .message(
            "The sum of TransactionObligatedAmount for URI {uri} in File C does \
             not match the sum of FederalActionObligation in published \
             assistance data",
        ),
        Rule::new(
            "C25",
            SubmissionFile::C,
            Severity::Fatal,
            Predicate::RequireWhen {
                field: "transaction_obligated_amou",
                when: Condition::Always,
            },
        )?
        .fields(&["transaction_obligated_amou"])
        .unique_key(AWARD_KEY)
        .message("TransactionObligatedAmount is required on every File C row"),
        Rule::new(
            "C27",
            SubmissionFile::C,
            Severity::Warning,
            Predicate::CarryForward {
                group_by: CARRY_GROUP,
                outlay_field: "gross_outlay_amount_by_awa_cpe",
                exempt_when_blank: &["program_activity_code", "program_activity_name"],
                prior_when: Condition::FieldIn {
                    field: "prior_year_adjustment",
                    values: &["X"],
                },
            },
        )?
        .fields(&["gross_outlay_amount_by_awa_cpe"])
        .unique_key(CARRY_GROUP)
        .message(
            "This award combination reported a nonzero \
             GrossOutlayAmountByAward_CPE in the prior period of the fiscal \
             year and must be reported again, even if the amount is now zero",
        ),
    ])
}
