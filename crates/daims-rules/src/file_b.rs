//! File B (object class and program activity) rules.
//!
//! File B breaks each TAS down by program activity, object class, DEFC, and
//! prior-year adjustment. Rows sharing that breakdown are summed before the
//! USSGL reconciliations run, so agencies may split a combination across
//! rows without tripping the balance checks.

use daims_model::issue::Severity;
use daims_model::staging::SubmissionFile;
use daims_reference::store::Dimension;

use crate::condition::Condition;
use crate::error::Result;
use crate::predicate::{Addend, Predicate, ReferenceCheck};
use crate::rule::Rule;

/// The reporting combination every grouped File B rule sums over.
const GROUP: &[&str] = &[
    "tas",
    "program_activity_code",
    "program_activity_name",
    "object_class",
    "disaster_emergency_fund_code",
    "prior_year_adjustment",
];

pub(crate) fn rules() -> Result<Vec<Rule>> {
    Ok(vec![
        Rule::new(
            "B3",
            SubmissionFile::B,
            Severity::Fatal,
            Predicate::GroupSumEquals {
                group_by: GROUP,
                target: "obligations_undelivered_or_fyb",
                addends: const { &[Addend::plus("ussgl480100_undelivered_or_fyb")] },
            },
        )?
        .fields(&[
            "obligations_undelivered_or_fyb",
            "ussgl480100_undelivered_or_fyb",
        ])
        .unique_key(GROUP)
        .message(
            "ObligationsUndeliveredOrdersUnpaidTotal_FYB does not equal USSGL \
             480100_FYB for this reporting combination",
        ),
        Rule::new(
            "B4",
            SubmissionFile::B,
            Severity::Fatal,
            Predicate::GroupSumEquals {
                group_by: GROUP,
                target: "obligations_undelivered_or_cpe",
                addends: const {
                    &[
                        Addend::plus("ussgl480100_undelivered_or_cpe"),
                        Addend::plus("ussgl483100_undelivered_or_cpe"),
                        Addend::plus("ussgl487100_downward_adjus_cpe"),
                        Addend::plus("ussgl488100_upward_adjustm_cpe"),
                    ]
                },
            },
        )?
        .fields(&[
            "obligations_undelivered_or_cpe",
            "ussgl480100_undelivered_or_cpe",
            "ussgl483100_undelivered_or_cpe",
            "ussgl487100_downward_adjus_cpe",
            "ussgl488100_upward_adjustm_cpe",
        ])
        .unique_key(GROUP)
        .message(
            "ObligationsUndeliveredOrdersUnpaidTotal_CPE does not equal the sum \
             of USSGL 480100_CPE, 483100_CPE, 487100_CPE, and 488100_CPE for \
             this reporting combination",
        ),
        Rule::new(
            "B5",
            SubmissionFile::B,
            Severity::Fatal,
            Predicate::GroupSumEquals {
                group_by: GROUP,
                target: "obligations_delivered_orde_fyb",
                addends: const { &[Addend::plus("ussgl490100_delivered_orde_fyb")] },
            },
        )?
        .fields(&[
            "obligations_delivered_orde_fyb",
            "ussgl490100_delivered_orde_fyb",
        ])
        .unique_key(GROUP)
        .message(
            "ObligationsDeliveredOrdersUnpaidTotal_FYB does not equal USSGL \
             490100_FYB for this reporting combination",
        ),
        Rule::new(
            "B6",
            SubmissionFile::B,
            Severity::Fatal,
            Predicate::GroupSumEquals {
                group_by: GROUP,
                target: "obligations_delivered_orde_cpe",
                addends: const {
                    &[
                        Addend::plus("ussgl490100_delivered_orde_cpe"),
                        Addend::plus("ussgl493100_delivered_orde_cpe"),
                        Addend::plus("ussgl497100_downward_adjus_cpe"),
                        Addend::plus("ussgl498100_upward_adjustm_cpe"),
                    ]
                },
            },
        )?
        .fields(&[
            "obligations_delivered_orde_cpe",
            "ussgl490100_delivered_orde_cpe",
            "ussgl493100_delivered_orde_cpe",
            "ussgl497100_downward_adjus_cpe",
            "ussgl498100_upward_adjustm_cpe",
        ])
        .unique_key(GROUP)
        .message(
            "ObligationsDeliveredOrdersUnpaidTotal_CPE does not equal the sum of \
             USSGL 490100_CPE, 493100_CPE, 497100_CPE, and 498100_CPE for this \
             reporting combination",
        ),
        Rule::new(
            "B7",
            SubmissionFile::B,
            Severity::Fatal,
            Predicate::GroupSumEquals {
                group_by: GROUP,
                target: "gross_outlay_amount_by_pro_fyb",
                addends: const {
                    &[
                        Addend::plus("ussgl480200_undelivered_or_fyb"),
                        Addend::plus("ussgl490800_authority_outl_fyb"),
                    ]
                },
            },
        )?
        .fields(&[
            "gross_outlay_amount_by_pro_fyb",
            "ussgl480200_undelivered_or_fyb",
            "ussgl490800_authority_outl_fyb",
        ])
        .unique_key(GROUP)
        .message(
            "GrossOutlayAmountByProgramObjectClass_FYB does not equal the sum of \
             USSGL 480200_FYB and 490800_FYB for this reporting combination",
        ),
        Rule::new(
            "B9",
            SubmissionFile::B,
            Severity::Warning,
            Predicate::ReferenceExists(ReferenceCheck {
                dimension: Dimension::ProgramActivity,
                fields: &["program_activity_code", "program_activity_name"],
                when: Condition::FieldNotIn {
                    field: "program_activity_code",
                    values: &["0000"],
                },
                reject_territories: false,
            }),
        )?
        .fields(&["program_activity_code", "program_activity_name"])
        .unique_key(GROUP)
        .message(
            "ProgramActivityCode {program_activity_code} with \
             ProgramActivityName {program_activity_name} is not in the OMB \
             program activity list for this fiscal year",
        ),
        Rule::new(
            "B11",
            SubmissionFile::B,
            Severity::Fatal,
            Predicate::ReferenceExists(ReferenceCheck {
                dimension: Dimension::ObjectClasses,
                fields: &["object_class"],
                when: Condition::Always,
                reject_territories: false,
            }),
        )?
        .fields(&["object_class"])
        .unique_key(GROUP)
        .message("ObjectClass {object_class} is not a valid object class code"),
        Rule::new(
            "B12.1",
            SubmissionFile::B,
            Severity::Fatal,
            Predicate::DomainCheck {
                field: "by_direct_reimbursable_fun",
                allowed: &["D", "R"],
                allow_blank: false,
            },
        )?
        .fields(&["by_direct_reimbursable_fun"])
        .unique_key(GROUP)
        .message(
            "ByDirectReimbursableFundingSource must be D or R, found \
             {by_direct_reimbursable_fun}",
        ),
        Rule::new(
            "B14",
            SubmissionFile::B,
            Severity::Fatal,
            Predicate::GroupSumEquals {
                group_by: GROUP,
                target: "deobligations_recov_by_pro_cpe",
                addends: const {
                    &[
                        Addend::plus("ussgl487100_downward_adjus_cpe"),
                        Addend::plus("ussgl487200_downward_adjus_cpe"),
                        Addend::plus("ussgl497100_downward_adjus_cpe"),
                        Addend::plus("ussgl497200_downward_adjus_cpe"),
                    ]
                },
            },
        )?
        .fields(&[
            "deobligations_recov_by_pro_cpe",
            "ussgl487100_downward_adjus_cpe",
            "ussgl487200_downward_adjus_cpe",
            "ussgl497100_downward_adjus_cpe",
            "ussgl497200_downward_adjus_cpe",
        ])
        .unique_key(GROUP)
        .message(
            "DeobligationsRecoveriesRefundsOfPriorYearByProgramObjectClass_CPE \
             does not equal the sum of USSGL 487100_CPE, 487200_CPE, \
             497100_CPE, and 497200_CPE for this reporting combination",
        ),
        Rule::new(
            "B18",
            SubmissionFile::B,
            Severity::Fatal,
            Predicate::GroupSumEquals {
                group_by: GROUP,
                target: "gross_outlay_amount_by_pro_cpe",
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
            "gross_outlay_amount_by_pro_cpe",
            "gross_outlays_undelivered_cpe",
            "gross_outlays_delivered_or_cpe",
            "gross_outlays_undelivered_fyb",
            "gross_outlays_delivered_or_fyb",
        ])
        .unique_key(GROUP)
        .message(
            "GrossOutlayAmountByProgramObjectClass_CPE does not equal gross \
             outlays delivered and undelivered (CPE) less the amounts brought \
             forward (FYB) for this reporting combination",
        ),
        Rule::new(
            "B20",
            SubmissionFile::B,
            Severity::Fatal,
            Predicate::GroupSumEquals {
                group_by: GROUP,
                target: "obligations_incurred_by_pr_cpe",
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
            "obligations_incurred_by_pr_cpe",
            "obligations_undelivered_or_cpe",
            "obligations_delivered_orde_cpe",
            "obligations_undelivered_or_fyb",
            "obligations_delivered_orde_fyb",
        ])
        .unique_key(GROUP)
        .message(
            "ObligationsIncurredByProgramObjectClass_CPE does not equal the \
             change in unpaid obligations (FYB less CPE, delivered and \
             undelivered) for this reporting combination",
        ),
    ])
}
