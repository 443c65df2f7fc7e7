//! Dimension entities the rules join against.
//!
//! These rows are produced only by the loader pipeline; validation reads
//! them through the reference store. Soft deactivation and row-currency
//! windows live on the rows themselves so that reloads never have to hard
//! delete.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::tas::TasComponents;

// ============================================================================
// Treasury accounts
// ============================================================================

/// One TAS dimension row. `account_num` is the stable surrogate carried
/// across reloads; the `[internal_start, internal_end)` window says when
/// this row is the current one for its natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasAccount {
    pub account_num: u64,
    pub components: TasComponents,
    pub internal_start_date: Option<NaiveDate>,
    pub internal_end_date: Option<NaiveDate>,
}

impl TasAccount {
    pub fn display(&self) -> String {
        self.components.display()
    }

    /// Row currency: start inclusive, end exclusive, open bounds permitted.
    pub fn is_current_on(&self, date: NaiveDate) -> bool {
        match (self.internal_start_date, self.internal_end_date) {
            (Some(start), _) if date < start => false,
            (_, Some(end)) if date >= end => false,
            _ => true,
        }
    }
}

// ============================================================================
// Agencies
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CgacAgency {
    pub cgac_code: String,
    pub agency_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrecAgency {
    pub frec_code: String,
    pub cgac_code: String,
    pub agency_name: String,
}

/// Sub-tier agency; `is_frec` selects which roll-up represents it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTierAgency {
    pub sub_tier_code: String,
    pub sub_tier_name: String,
    pub cgac_code: String,
    pub frec_code: Option<String>,
    pub is_frec: bool,
}

impl SubTierAgency {
    /// The top-tier code this sub-tier files under.
    pub fn toptier_code(&self) -> &str {
        if self.is_frec
            && let Some(frec) = &self.frec_code
        {
            return frec;
        }
        &self.cgac_code
    }
}

// ============================================================================
// Assistance listings (CFDA)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistanceListing {
    /// `NN.NNN` exactly.
    pub program_number: String,
    pub program_title: String,
    pub published_date: Option<NaiveDate>,
    pub archived_date: Option<NaiveDate>,
}

impl AssistanceListing {
    /// Active on `date` iff published on or before it and not archived
    /// before it (archival day itself still counts as active).
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        let Some(published) = self.published_date else {
            return false;
        };
        if date < published {
            return false;
        }
        match self.archived_date {
            Some(archived) => date <= archived,
            None => true,
        }
    }
}

// ============================================================================
// Disaster / emergency fund codes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefcGroup {
    Covid,
    Infrastructure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefcCode {
    pub code: String,
    pub group: Option<DefcGroup>,
    pub public_laws: Vec<String>,
    /// Short titles resolved from the public-law source, same order as
    /// `public_laws`.
    pub public_law_titles: Vec<String>,
    pub earliest_public_law_enactment: Option<NaiveDate>,
    pub is_valid: bool,
}

// ============================================================================
// Countries
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryCode {
    /// Three-letter GENC code.
    pub country_code: String,
    pub country_name: String,
    /// U.S. territories must be submitted as USA + state, never under their
    /// own GENC code.
    pub territory_free_state: bool,
}

// ============================================================================
// ZIP crosswalk
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipLocal {
    pub zip5: String,
    pub zip_last4: Option<String>,
    pub state_abbreviation: String,
    pub county_number: String,
    pub congressional_district_no: Option<String>,
}

/// One row per ZIP5 and state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipsGrouped {
    pub zip5: String,
    pub state_abbreviation: String,
}

/// Current congressional district per ZIP5 and state; "90" means the ZIP
/// spans districts with no single one meeting the threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdZipsGrouped {
    pub zip5: String,
    pub state_abbreviation: String,
    pub congressional_district_no: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdCountyGrouped {
    pub county_number: String,
    pub state_abbreviation: String,
    pub congressional_district_no: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdStateGrouped {
    pub state_abbreviation: String,
    pub congressional_district_no: String,
}

/// District code emitted when no single district reaches the roll-up
/// threshold.
pub const MULTIPLE_DISTRICTS: &str = "90";

// ============================================================================
// SAM recipients
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutiveCompensation {
    pub full_name: String,
    pub amount: Option<Money>,
}

/// A SAM registration. Keyed by UEI when present, by legacy DUNS otherwise;
/// neither identifier is ever overwritten with null once known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamRecipient {
    pub uei: Option<String>,
    pub awardee_or_recipient_uniqu: Option<String>,
    pub legal_business_name: String,
    pub dba_name: Option<String>,

    pub activation_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub registration_date: Option<NaiveDate>,
    pub deactivation_date: Option<NaiveDate>,

    pub ultimate_parent_uei: Option<String>,
    pub ultimate_parent_unique_ide: Option<String>,
    pub ultimate_parent_legal_enti: Option<String>,

    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub zip4: Option<String>,
    pub congressional_district: Option<String>,
    pub country_code: Option<String>,

    pub business_types_codes: Vec<String>,
    /// At most five entries.
    pub executive_compensation: Vec<ExecutiveCompensation>,
    /// Backfilled from archived dumps rather than live feeds.
    pub historic: bool,
}

// ============================================================================
// Supplementary dimensions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectClass {
    /// Three digits.
    pub code: String,
    pub name: String,
}

/// Fiscal-year scoped program activity (PAC/PAN pair) per agency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramActivity {
    pub fiscal_year: u16,
    pub agency_identifier: String,
    pub program_activity_code: String,
    pub program_activity_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionWindow {
    pub fiscal_year: u16,
    pub fiscal_period: u8,
    pub open_date: NaiveDate,
    pub submission_due_date: NaiveDate,
    pub certification_due_date: NaiveDate,
}

/// One SF-133 balance line for a TAS and reporting period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sf133Balance {
    /// TAS display string, same derivation as staged rows.
    pub tas: String,
    pub fiscal_year: u16,
    pub period: u8,
    pub line_number: u32,
    pub amount: Money,
    pub disaster_emergency_fund_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn listing_activity_window_is_inclusive_of_archive_day() {
        let listing = AssistanceListing {
            program_number: "12.340".into(),
            program_title: "Basic research".into(),
            published_date: Some(date(2013, 4, 27)),
            archived_date: Some(date(2013, 12, 31)),
        };
        assert!(listing.is_active_on(date(2013, 4, 27)));
        assert!(listing.is_active_on(date(2013, 12, 31)));
        assert!(!listing.is_active_on(date(2014, 1, 11)));
        assert!(!listing.is_active_on(date(2013, 4, 26)));
    }

    #[test]
    fn unpublished_listing_is_never_active() {
        let listing = AssistanceListing {
            program_number: "10.001".into(),
            program_title: String::new(),
            published_date: None,
            archived_date: None,
        };
        assert!(!listing.is_active_on(date(2020, 1, 1)));
    }

    #[test]
    fn tas_currency_window_is_half_open() {
        let tas = TasAccount {
            account_num: 1,
            components: TasComponents::default(),
            internal_start_date: Some(date(2015, 10, 1)),
            internal_end_date: Some(date(2017, 10, 1)),
        };
        assert!(tas.is_current_on(date(2015, 10, 1)));
        assert!(tas.is_current_on(date(2017, 9, 30)));
        assert!(!tas.is_current_on(date(2017, 10, 1)));
        assert!(!tas.is_current_on(date(2015, 9, 30)));
    }

    #[test]
    fn sub_tier_roll_up_prefers_frec_when_flagged() {
        let mut sub = SubTierAgency {
            sub_tier_code: "1234".into(),
            sub_tier_name: "Test".into(),
            cgac_code: "097".into(),
            frec_code: Some("9700".into()),
            is_frec: false,
        };
        assert_eq!(sub.toptier_code(), "097");
        sub.is_frec = true;
        assert_eq!(sub.toptier_code(), "9700");
    }
}
