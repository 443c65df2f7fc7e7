//! Parameterized predicate kinds behind every catalog rule.
//!
//! A predicate carries everything the engine needs to evaluate one rule:
//! column names, allowed code sets, reference dimensions, SF-133 line
//! numbers. Adding a rule never adds evaluation code, only a record built
//! from one of these variants.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use daims_model::dates::is_malformed_date;
use daims_reference::store::Dimension;

use crate::condition::Condition;

/// Parse a catalog-carried ISO date (`YYYY-MM-DD`). Catalog construction
/// rejects records whose dates do not parse, so evaluation never sees a
/// `None` from a registered rule.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

// === Sum terms ===

/// One signed term on the right-hand side of a sum check.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Addend {
    pub field: &'static str,
    pub negated: bool,
}

impl Addend {
    pub const fn plus(field: &'static str) -> Self {
        Addend {
            field,
            negated: false,
        }
    }

    pub const fn minus(field: &'static str) -> Self {
        Addend {
            field,
            negated: true,
        }
    }
}

// === Format checks ===

static ASSISTANCE_LISTING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{2}\.\d{3}$").expect("assistance listing number pattern is valid")
});

static ZIP5_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}$").expect("zip5 pattern is valid"));

static UEI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{12}$").expect("uei pattern is valid"));

static DUNS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{9}$").expect("duns pattern is valid"));

static BUSINESS_TYPES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-X]{1,3}$").expect("business types pattern is valid"));

static PLACE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(00\*{5}|00FORGN|[A-Z]{2}\*{5}|[A-Z]{2}\*\*\d{3}|[A-Z]{2}\d{5})$")
        .expect("place of performance code pattern is valid")
});

/// Shape a text column must take when it is populated. A blank cell passes
/// every format check; whether the cell may be blank is a separate
/// requirement predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// `YYYYMMDD` or `MM/DD/YYYY`, the two layouts accepted at staging.
    Date,
    /// Assistance listing (CFDA) number, `NN.NNN`.
    AssistanceListingNumber,
    Zip5,
    Uei,
    Duns,
    /// One to three letter codes from the A..X vocabulary.
    BusinessTypes,
    /// State, county, city, nationwide, or foreign place code layouts.
    PlacePerformanceCode,
}

impl FormatKind {
    pub fn matches(self, raw: &str) -> bool {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return true;
        }
        match self {
            FormatKind::Date => !is_malformed_date(trimmed),
            FormatKind::AssistanceListingNumber => ASSISTANCE_LISTING_RE.is_match(trimmed),
            FormatKind::Zip5 => ZIP5_RE.is_match(trimmed),
            FormatKind::Uei => UEI_RE.is_match(&trimmed.to_ascii_uppercase()),
            FormatKind::Duns => DUNS_RE.is_match(trimmed),
            FormatKind::BusinessTypes => {
                BUSINESS_TYPES_RE.is_match(&trimmed.to_ascii_uppercase())
            }
            FormatKind::PlacePerformanceCode => {
                PLACE_CODE_RE.is_match(&trimmed.to_ascii_uppercase())
            }
        }
    }
}

// === Reference joins ===

/// A lookup against one reference dimension: the named fields, joined in
/// order, must resolve to a live dimension row.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ReferenceCheck {
    pub dimension: Dimension,
    pub fields: &'static [&'static str],
    pub when: Condition,
    /// Reject codes that resolve to a U.S. territory instead of a country.
    pub reject_territories: bool,
}

/// Which recipient identifier a SAM registration check accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientIdentifier {
    /// UEI when present, DUNS as fallback.
    UeiOrDuns,
    /// UEI only; DUNS no longer satisfies the check.
    UeiOnly,
}

/// Where a congressional-district check reads the state from.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateSource {
    /// A staged column holding the two-letter state code.
    Field(&'static str),
    /// First two characters of the place of performance code.
    PlacePerformanceCodePrefix,
}

// === Predicate kinds ===

/// The closed set of checks a rule can assert. Row-local kinds read one
/// staged row; reference kinds join the reference store; cross-file kinds
/// consult sibling files in the same submission; cross-submission kinds
/// consult previously published data.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// The target column must equal the signed sum of the addend columns
    /// on the same row.
    SumEquals {
        target: &'static str,
        addends: &'static [Addend],
    },
    /// Summed over each `group_by` group, the target column must equal
    /// the signed sum of the addend columns.
    GroupSumEquals {
        group_by: &'static [&'static str],
        target: &'static str,
        addends: &'static [Addend],
    },
    /// Two monetary columns must carry the same amount.
    FieldsEqual {
        left: &'static str,
        right: &'static str,
    },
    /// The column must hold one of the allowed codes, compared
    /// case-insensitively after trimming.
    DomainCheck {
        field: &'static str,
        allowed: &'static [&'static str],
        allow_blank: bool,
    },
    /// The column, when populated, must match the named layout.
    FormatCheck {
        field: &'static str,
        kind: FormatKind,
    },
    /// The column must be populated on rows where the condition holds.
    RequireWhen {
        field: &'static str,
        when: Condition,
    },
    /// The column must be blank on rows where the condition holds.
    ForbidWhen {
        field: &'static str,
        when: Condition,
    },
    /// The monetary column must be zero or blank on rows where the
    /// condition holds.
    MustBeZeroWhen {
        field: &'static str,
        when: Condition,
    },
    /// At least one of the columns must be populated on rows where the
    /// condition holds.
    AnyFieldPresent {
        fields: &'static [&'static str],
        when: Condition,
    },
    /// The named columns must form a unique key across the file.
    UniqueKey { fields: &'static [&'static str] },
    /// The row's TAS must exist in the TAS dimension with an availability
    /// window covering the submission fiscal year.
    TasAvailabilityCoversYear,
    /// The named fields must resolve in a reference dimension.
    ReferenceExists(ReferenceCheck),
    /// The country code must not resolve to a U.S. territory.
    CountryNotTerritory { field: &'static str },
    /// The assistance listing must be active on the row's action date.
    CfdaActiveOnActionDate { when: Condition },
    /// The recipient must hold a SAM registration, for the named
    /// assistance types and action-date window.
    RecipientRegistered {
        assistance_types: &'static [&'static str],
        /// Inclusive ISO date the window opens on.
        window_start: &'static str,
        /// Exclusive ISO date the window closes on; `None` leaves it open.
        window_end: Option<&'static str>,
        identifier: RecipientIdentifier,
    },
    /// The congressional district must belong to the state implied by the
    /// ZIP. District `90` accepts any district in the state.
    CongressionalDistrictMatchesZip {
        district_field: &'static str,
        zip_field: &'static str,
        state: StateSource,
    },
    /// The File A column must equal the sum of the named SF-133 lines for
    /// the row's TAS.
    Sf133SumMatches {
        field: &'static str,
        lines: &'static [u32],
    },
    /// Every SF-133 TAS the agency owns must appear in File A.
    TasInSf133,
    /// Each row's combination of the named columns must appear in File B.
    CrossFileCombosExist { fields: &'static [&'static str] },
    /// File C obligations summed by the key must match published File D2
    /// obligations summed by the same key.
    CrossFileSums { key_field: &'static str },
    /// The key must identify a published assistance award.
    FabsAwardExists {
        key_field: &'static str,
        when: Condition,
    },
    /// Groups reported with a nonzero outlay in the prior certified period
    /// must be reported again this period.
    CarryForward {
        group_by: &'static [&'static str],
        outlay_field: &'static str,
        /// Groups blank in all of these columns are exempt.
        exempt_when_blank: &'static [&'static str],
        /// Prior-period rows counted toward the carried set.
        prior_when: Condition,
    },
    /// A correction must reference a previously published record.
    CorrectionMatchesPrior { key_field: &'static str },
    /// A deletion must reference a previously published record.
    DeleteMatchesPrior { key_field: &'static str },
    /// The rule is registered but asserts nothing.
    Unenforced,
}

impl Predicate {
    /// Every staged column the predicate reads, for catalog validation.
    pub fn referenced_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        match *self {
            Predicate::SumEquals { target, addends } => {
                fields.push(target);
                fields.extend(addends.iter().map(|a| a.field));
            }
            Predicate::GroupSumEquals {
                group_by,
                target,
                addends,
            } => {
                fields.extend_from_slice(group_by);
                fields.push(target);
                fields.extend(addends.iter().map(|a| a.field));
            }
            Predicate::FieldsEqual { left, right } => {
                fields.push(left);
                fields.push(right);
            }
            Predicate::DomainCheck { field, .. }
            | Predicate::FormatCheck { field, .. }
            | Predicate::CountryNotTerritory { field }
            | Predicate::Sf133SumMatches { field, .. } => fields.push(field),
            Predicate::RequireWhen { field, when }
            | Predicate::ForbidWhen { field, when }
            | Predicate::MustBeZeroWhen { field, when } => {
                fields.push(field);
                fields.extend(when.field());
            }
            Predicate::AnyFieldPresent {
                fields: names,
                when,
            } => {
                fields.extend_from_slice(names);
                fields.extend(when.field());
            }
            Predicate::UniqueKey { fields: names }
            | Predicate::CrossFileCombosExist { fields: names } => {
                fields.extend_from_slice(names);
            }
            Predicate::TasAvailabilityCoversYear | Predicate::TasInSf133 => fields.push("tas"),
            Predicate::ReferenceExists(check) => {
                fields.extend_from_slice(check.fields);
                fields.extend(check.when.field());
            }
            Predicate::CfdaActiveOnActionDate { when } => {
                fields.push("cfda_number");
                fields.push("action_date");
                fields.extend(when.field());
            }
            Predicate::RecipientRegistered { identifier, .. } => {
                fields.push("assistance_type");
                fields.push("action_date");
                fields.push("uei");
                if identifier == RecipientIdentifier::UeiOrDuns {
                    fields.push("awardee_or_recipient_uniqu");
                }
            }
            Predicate::CongressionalDistrictMatchesZip {
                district_field,
                zip_field,
                state,
            } => {
                fields.push(district_field);
                fields.push(zip_field);
                match state {
                    StateSource::Field(name) => fields.push(name),
                    StateSource::PlacePerformanceCodePrefix => {
                        fields.push("place_of_performance_code");
                    }
                }
            }
            Predicate::CrossFileSums { key_field }
            | Predicate::CorrectionMatchesPrior { key_field }
            | Predicate::DeleteMatchesPrior { key_field } => fields.push(key_field),
            Predicate::FabsAwardExists { key_field, when } => {
                fields.push(key_field);
                fields.extend(when.field());
            }
            Predicate::CarryForward {
                group_by,
                outlay_field,
                exempt_when_blank,
                prior_when,
            } => {
                fields.extend_from_slice(group_by);
                fields.push(outlay_field);
                fields.extend_from_slice(exempt_when_blank);
                fields.extend(prior_when.field());
            }
            Predicate::Unenforced => {}
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_passes_every_format_kind() {
        for kind in [
            FormatKind::Date,
            FormatKind::AssistanceListingNumber,
            FormatKind::Zip5,
            FormatKind::Uei,
            FormatKind::Duns,
            FormatKind::BusinessTypes,
            FormatKind::PlacePerformanceCode,
        ] {
            assert!(kind.matches(""));
            assert!(kind.matches("   "));
        }
    }

    #[test]
    fn date_format_accepts_both_submitted_layouts() {
        assert!(FormatKind::Date.matches("20170104"));
        assert!(FormatKind::Date.matches("01/04/2017"));
        assert!(!FormatKind::Date.matches("2017-01-04"));
        assert!(!FormatKind::Date.matches("20171301"));
    }

    #[test]
    fn assistance_listing_number_is_two_dot_three() {
        assert!(FormatKind::AssistanceListingNumber.matches("10.001"));
        assert!(!FormatKind::AssistanceListingNumber.matches("10.1"));
        assert!(!FormatKind::AssistanceListingNumber.matches("10001"));
    }

    #[test]
    fn identifier_formats_ignore_case() {
        assert!(FormatKind::Uei.matches("abc123def456"));
        assert!(!FormatKind::Uei.matches("abc123"));
        assert!(FormatKind::Duns.matches("123456789"));
        assert!(!FormatKind::Duns.matches("12345678a"));
        assert!(FormatKind::BusinessTypes.matches("ab"));
        assert!(!FormatKind::BusinessTypes.matches("abcd"));
        assert!(!FormatKind::BusinessTypes.matches("Z"));
    }

    #[test]
    fn place_code_layouts() {
        assert!(FormatKind::PlacePerformanceCode.matches("NY**001"));
        assert!(FormatKind::PlacePerformanceCode.matches("ny12345"));
        assert!(FormatKind::PlacePerformanceCode.matches("NY*****"));
        assert!(FormatKind::PlacePerformanceCode.matches("00*****"));
        assert!(FormatKind::PlacePerformanceCode.matches("00FORGN"));
        assert!(!FormatKind::PlacePerformanceCode.matches("N12345"));
        assert!(!FormatKind::PlacePerformanceCode.matches("NY**01"));
    }

    #[test]
    fn addend_constructors_set_sign() {
        assert!(!Addend::plus("a").negated);
        assert!(Addend::minus("b").negated);
    }

    #[test]
    fn referenced_fields_cover_sum_terms_and_conditions() {
        let sum = Predicate::SumEquals {
            target: "total",
            addends: &[Addend::plus("x"), Addend::minus("y")],
        };
        assert_eq!(sum.referenced_fields(), vec!["total", "x", "y"]);

        let require = Predicate::RequireWhen {
            field: "fain",
            when: Condition::FieldIn {
                field: "record_type",
                values: &["2", "3"],
            },
        };
        assert_eq!(require.referenced_fields(), vec!["fain", "record_type"]);
    }

    #[test]
    fn predicates_serialize_with_kind_tags() {
        let json = serde_json::to_value(Predicate::DomainCheck {
            field: "action_type",
            allowed: &["A", "B", "C", "D"],
            allow_blank: false,
        })
        .unwrap();
        assert!(json.get("domain_check").is_some());
        assert_eq!(json["domain_check"]["field"], "action_type");
    }
}
