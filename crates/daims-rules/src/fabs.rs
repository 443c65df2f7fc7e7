//! FABS (financial assistance broker submission) rules.
//!
//! FABS rows publish individual assistance actions, so most rules here are
//! row-local code and format checks, plus the SAM registration and
//! assistance listing joins. Deletion rows (CorrectionDeleteIndicator D)
//! are exempt from every rule that has not opted in.

use daims_model::issue::Severity;
use daims_model::staging::SubmissionFile;
use daims_reference::store::Dimension;

use crate::condition::Condition;
use crate::error::Result;
use crate::predicate::{
    FormatKind, Predicate, RecipientIdentifier, ReferenceCheck, StateSource,
};
use crate::rule::Rule;

const KEY: &[&str] = &["afa_generated_unique"];

/// Assistance types whose recipients must hold a SAM registration.
const SAM_ASSISTANCE_TYPES: &[&str] = &["06", "07", "08", "09", "10", "11"];

const NON_AGGREGATE: Condition = Condition::FieldIn {
    field: "record_type",
    values: &["2", "3"],
};

pub(crate) fn rules() -> Result<Vec<Rule>> {
    Ok(vec![
        Rule::new(
            "FABS1",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::UniqueKey {
                fields: &["afa_generated_unique"],
            },
        )?
        .fields(&[
            "fain",
            "uri",
            "award_modification_amendme",
            "awarding_sub_tier_agency_c",
        ])
        .unique_key(KEY)
        .message(
            "The combination of FAIN, URI, AwardModificationAmendmentNumber, \
             and AwardingSubTierAgencyCode must be unique; \
             {afa_generated_unique} appears on more than one row",
        )
        .applies_to_deletes(),
        Rule::new(
            "FABS2.1",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::CorrectionMatchesPrior {
                key_field: "afa_generated_unique",
            },
        )?
        .fields(&["correction_delete_indicatr"])
        .unique_key(KEY)
        .message(
            "A correction (CorrectionDeleteIndicator C) must reference a \
             previously published record; {afa_generated_unique} has none",
        ),
        Rule::new(
            "FABS2.2",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::DeleteMatchesPrior {
                key_field: "afa_generated_unique",
            },
        )?
        .fields(&["correction_delete_indicatr"])
        .unique_key(KEY)
        .message(
            "A deletion (CorrectionDeleteIndicator D) must reference a \
             previously published record; {afa_generated_unique} has none",
        )
        .applies_to_deletes(),
        Rule::new(
            "FABS3",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::DomainCheck {
                field: "action_type",
                allowed: &["A", "B", "C", "D"],
                allow_blank: false,
            },
        )?
        .fields(&["action_type"])
        .unique_key(KEY)
        .message("ActionType must be A, B, C, or D, found {action_type}"),
        Rule::new(
            "FABS4",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::FormatCheck {
                field: "action_date",
                kind: FormatKind::Date,
            },
        )?
        .fields(&["action_date"])
        .unique_key(KEY)
        .message("ActionDate must follow YYYYMMDD or MM/DD/YYYY, found {action_date}"),
        Rule::new(
            "FABS5.1",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::RequireWhen {
                field: "assistance_type",
                when: Condition::Always,
            },
        )?
        .fields(&["assistance_type"])
        .unique_key(KEY)
        .message("AssistanceType is required"),
        Rule::new(
            "FABS5.2",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::DomainCheck {
                field: "assistance_type",
                allowed: &["02", "03", "04", "05", "06", "07", "08", "09", "10", "11"],
                allow_blank: true,
            },
        )?
        .fields(&["assistance_type"])
        .unique_key(KEY)
        .message("AssistanceType must be one of 02 through 11, found {assistance_type}"),
        Rule::new(
            "FABS6",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::DomainCheck {
                field: "record_type",
                allowed: &["1", "2", "3"],
                allow_blank: false,
            },
        )?
        .fields(&["record_type"])
        .unique_key(KEY)
        .message("RecordType must be 1, 2, or 3, found {record_type}"),
        Rule::new(
            "FABS7",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::RequireWhen {
                field: "uri",
                when: Condition::FieldIn {
                    field: "record_type",
                    values: &["1"],
                },
            },
        )?
        .fields(&["uri", "record_type"])
        .unique_key(KEY)
        .message("URI is required for aggregate records (RecordType 1)"),
        Rule::new(
            "FABS8",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::RequireWhen {
                field: "fain",
                when: NON_AGGREGATE,
            },
        )?
        .fields(&["fain", "record_type"])
        .unique_key(KEY)
        .message("FAIN is required for non-aggregate records (RecordType 2 or 3)"),
        Rule::new(
            "FABS9",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::ReferenceExists(ReferenceCheck {
                dimension: Dimension::Agencies,
                fields: &["awarding_sub_tier_agency_c"],
                when: Condition::Always,
                reject_territories: false,
            }),
        )?
        .fields(&["awarding_sub_tier_agency_c"])
        .unique_key(KEY)
        .message(
            "AwardingSubTierAgencyCode {awarding_sub_tier_agency_c} is not a \
             valid sub-tier agency code",
        ),
        Rule::new(
            "FABS10",
            SubmissionFile::Fabs,
            Severity::Warning,
            Predicate::FormatCheck {
                field: "business_types",
                kind: FormatKind::BusinessTypes,
            },
        )?
        .fields(&["business_types"])
        .unique_key(KEY)
        .message(
            "BusinessTypes must be one to three letters from the A to X \
             vocabulary, found {business_types}",
        ),
        Rule::new(
            "FABS11",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::RequireWhen {
                field: "awardee_or_recipient_legal",
                when: NON_AGGREGATE,
            },
        )?
        .fields(&["awardee_or_recipient_legal", "record_type"])
        .unique_key(KEY)
        .message(
            "AwardeeOrRecipientLegalEntityName is required for non-aggregate \
             records (RecordType 2 or 3)",
        ),
        Rule::new(
            "FABS12",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::RequireWhen {
                field: "legal_entity_country_code",
                when: Condition::Always,
            },
        )?
        .fields(&["legal_entity_country_code"])
        .unique_key(KEY)
        .message("LegalEntityCountryCode is required"),
        Rule::new(
            "FABS13",
            SubmissionFile::Fabs,
            Severity::Warning,
            Predicate::ReferenceExists(ReferenceCheck {
                dimension: Dimension::Zips,
                fields: &["legal_entity_zip5"],
                when: Condition::FieldPresent {
                    field: "legal_entity_zip5",
                },
                reject_territories: false,
            }),
        )?
        .fields(&["legal_entity_zip5"])
        .unique_key(KEY)
        .message("LegalEntityZIP5 {legal_entity_zip5} is not a known ZIP code"),
        Rule::new(
            "FABS14",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::FormatCheck {
                field: "legal_entity_zip5",
                kind: FormatKind::Zip5,
            },
        )?
        .fields(&["legal_entity_zip5"])
        .unique_key(KEY)
        .message("LegalEntityZIP5 must be exactly five digits, found {legal_entity_zip5}"),
        Rule::new(
            "FABS19",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::ReferenceExists(ReferenceCheck {
                dimension: Dimension::Countries,
                fields: &["legal_entity_country_code"],
                when: Condition::Always,
                reject_territories: true,
            }),
        )?
        .fields(&["legal_entity_country_code"])
        .unique_key(KEY)
        .message(
            "LegalEntityCountryCode {legal_entity_country_code} is not a valid \
             GENC country code; U.S. territories are reported as USA with the \
             territory as the state",
        ),
        Rule::new(
            "FABS20",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::ReferenceExists(ReferenceCheck {
                dimension: Dimension::Countries,
                fields: &["place_of_perform_country_c"],
                when: Condition::Always,
                reject_territories: false,
            }),
        )?
        .fields(&["place_of_perform_country_c"])
        .unique_key(KEY)
        .message(
            "PrimaryPlaceOfPerformanceCountryCode {place_of_perform_country_c} \
             is not a valid GENC country code",
        ),
        Rule::new(
            "FABS20.2",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::CountryNotTerritory {
                field: "place_of_perform_country_c",
            },
        )?
        .fields(&["place_of_perform_country_c"])
        .unique_key(KEY)
        .message(
            "PrimaryPlaceOfPerformanceCountryCode {place_of_perform_country_c} \
             is a U.S. territory code; report USA with the territory as the \
             state",
        ),
        Rule::new(
            "FABS31.1",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::AnyFieldPresent {
                fields: &["uei", "awardee_or_recipient_uniqu"],
                when: NON_AGGREGATE,
            },
        )?
        .fields(&["uei", "awardee_or_recipient_uniqu", "record_type"])
        .unique_key(KEY)
        .message(
            "Either UEI or AwardeeOrRecipientUniqueIdentifier must be provided \
             for non-aggregate records (RecordType 2 or 3)",
        ),
        Rule::new(
            "FABS31.2",
            SubmissionFile::Fabs,
            Severity::Warning,
            Predicate::FormatCheck {
                field: "uei",
                kind: FormatKind::Uei,
            },
        )?
        .fields(&["uei"])
        .unique_key(KEY)
        .message("UEI must be twelve alphanumeric characters, found {uei}"),
        Rule::new(
            "FABS31.4.2",
            SubmissionFile::Fabs,
            Severity::Warning,
            Predicate::RecipientRegistered {
                assistance_types: SAM_ASSISTANCE_TYPES,
                window_start: "2010-10-01",
                window_end: Some("2022-04-04"),
                identifier: RecipientIdentifier::UeiOrDuns,
            },
        )?
        .fields(&["uei", "awardee_or_recipient_uniqu", "assistance_type", "action_date"])
        .unique_key(KEY)
        .message(
            "The recipient must be registered in SAM for assistance types 06 \
             through 11 on actions dated on or after October 1, 2010",
        ),
        Rule::new(
            "FABS31.4.3",
            SubmissionFile::Fabs,
            Severity::Warning,
            Predicate::RecipientRegistered {
                assistance_types: SAM_ASSISTANCE_TYPES,
                window_start: "2022-04-04",
                window_end: None,
                identifier: RecipientIdentifier::UeiOnly,
            },
        )?
        .fields(&["uei", "assistance_type", "action_date"])
        .unique_key(KEY)
        .message(
            "The recipient's UEI must be registered in SAM for assistance types \
             06 through 11 on actions dated on or after April 4, 2022",
        ),
        Rule::new(
            "FABS33.1",
            SubmissionFile::Fabs,
            Severity::Warning,
            Predicate::FormatCheck {
                field: "period_of_performance_star",
                kind: FormatKind::Date,
            },
        )?
        .fields(&["period_of_performance_star"])
        .unique_key(KEY)
        .message(
            "PeriodOfPerformanceStartDate must follow YYYYMMDD or MM/DD/YYYY, \
             found {period_of_performance_star}",
        ),
        Rule::new(
            "FABS33.2",
            SubmissionFile::Fabs,
            Severity::Warning,
            Predicate::FormatCheck {
                field: "period_of_performance_curr",
                kind: FormatKind::Date,
            },
        )?
        .fields(&["period_of_performance_curr"])
        .unique_key(KEY)
        .message(
            "PeriodOfPerformanceCurrentEndDate must follow YYYYMMDD or \
             MM/DD/YYYY, found {period_of_performance_curr}",
        ),
        Rule::new(
            "FABS36",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::FormatCheck {
                field: "cfda_number",
                kind: FormatKind::AssistanceListingNumber,
            },
        )?
        .fields(&["cfda_number"])
        .unique_key(KEY)
        .message("AssistanceListingNumber must follow the ##.### format, found {cfda_number}"),
        Rule::new(
            "FABS37.2",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::ReferenceExists(ReferenceCheck {
                dimension: Dimension::AssistanceListings,
                fields: &["cfda_number"],
                when: Condition::Always,
                reject_territories: false,
            }),
        )?
        .fields(&["cfda_number"])
        .unique_key(KEY)
        .message("AssistanceListingNumber {cfda_number} is not a known assistance listing"),
        Rule::new(
            "FABS37.3",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::CfdaActiveOnActionDate {
                when: Condition::FieldIn {
                    field: "action_type",
                    values: &["A"],
                },
            },
        )?
        .fields(&["cfda_number", "action_date", "action_type"])
        .unique_key(KEY)
        .message(
            "AssistanceListingNumber {cfda_number} was not active on the action \
             date of this new award",
        ),
        Rule::new(
            "FABS39",
            SubmissionFile::Fabs,
            Severity::Fatal,
            Predicate::RequireWhen {
                field: "place_of_performance_code",
                when: Condition::FieldIn {
                    field: "record_type",
                    values: &["1", "2"],
                },
            },
        )?
        .fields(&["place_of_performance_code", "record_type"])
        .unique_key(KEY)
        .message("PrimaryPlaceOfPerformanceCode is required for RecordType 1 or 2"),
        Rule::new(
            "FABS41",
            SubmissionFile::Fabs,
            Severity::Warning,
            Predicate::FormatCheck {
                field: "place_of_performance_code",
                kind: FormatKind::PlacePerformanceCode,
            },
        )?
        .fields(&["place_of_performance_code"])
        .unique_key(KEY)
        .message(
            "PrimaryPlaceOfPerformanceCode {place_of_performance_code} does not \
             follow a recognized layout",
        ),
        Rule::new(
            "FABS43",
            SubmissionFile::Fabs,
            Severity::Warning,
            Predicate::CongressionalDistrictMatchesZip {
                district_field: "place_of_performance_congr",
                zip_field: "place_of_performance_zip4a",
                state: StateSource::PlacePerformanceCodePrefix,
            },
        )?
        .fields(&["place_of_performance_congr", "place_of_performance_zip4a"])
        .unique_key(KEY)
        .message(
            "PrimaryPlaceOfPerformanceCongressionalDistrict \
             {place_of_performance_congr} does not match the district implied \
             by PrimaryPlaceOfPerformanceZIP+4",
        ),
        Rule::new(
            "FABS44",
            SubmissionFile::Fabs,
            Severity::Warning,
            Predicate::CongressionalDistrictMatchesZip {
                district_field: "legal_entity_congressional",
                zip_field: "legal_entity_zip5",
                state: StateSource::Field("legal_entity_state_code"),
            },
        )?
        .fields(&["legal_entity_congressional", "legal_entity_zip5"])
        .unique_key(KEY)
        .message(
            "LegalEntityCongressionalDistrict {legal_entity_congressional} does \
             not match the district implied by LegalEntityZIP5",
        ),
        Rule::new(
            "FABS46",
            SubmissionFile::Fabs,
            Severity::Warning,
            Predicate::FormatCheck {
                field: "awardee_or_recipient_uniqu",
                kind: FormatKind::Duns,
            },
        )?
        .fields(&["awardee_or_recipient_uniqu"])
        .unique_key(KEY)
        .message(
            "AwardeeOrRecipientUniqueIdentifier must be nine digits, found \
             {awardee_or_recipient_uniqu}",
        ),
    ])
}
