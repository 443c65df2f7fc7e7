#![deny(unsafe_code)]

//! In-memory reference store: every dimension the rules join against,
//! plus the load stamps. Mutated only by the loader pipeline; the
//! validator reads it through the resolver.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use daims_model::lookup::CaseInsensitiveMap;
use daims_model::money::Money;
use daims_model::reference::{
    AssistanceListing, CdCountyGrouped, CdStateGrouped, CdZipsGrouped, CgacAgency, CountryCode,
    DefcCode, FrecAgency, MULTIPLE_DISTRICTS, ObjectClass, ProgramActivity, SamRecipient,
    Sf133Balance, SubTierAgency, SubmissionWindow, TasAccount, ZipLocal, ZipsGrouped,
};
use daims_model::tas::TasComponents;

use crate::error::Result;
use crate::stamps::LoadStamps;
use crate::swap::rebuild_and_swap;

// ============================================================================
// Dimensions
// ============================================================================

/// Coarse dimension families, used for presence tracking: a rule that joins
/// an unloaded dimension is skipped with one engine warning instead of
/// failing the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Tas,
    Agencies,
    AssistanceListings,
    Defc,
    Countries,
    Zips,
    SamRecipients,
    ObjectClasses,
    ProgramActivity,
    SubmissionWindows,
    Sf133,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tas => "tas",
            Self::Agencies => "agencies",
            Self::AssistanceListings => "assistance_listings",
            Self::Defc => "defc",
            Self::Countries => "countries",
            Self::Zips => "zips",
            Self::SamRecipients => "sam_recipients",
            Self::ObjectClasses => "object_classes",
            Self::ProgramActivity => "program_activity",
            Self::SubmissionWindows => "submission_windows",
            Self::Sf133 => "sf133",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ZIP crosswalk tables
// ============================================================================

/// Share a district must hold within a group before it becomes "the"
/// district; below it the multiple-district code is emitted. Kept as a
/// ratio compared in integers so the boundary is exact.
const CD_THRESHOLD_NUM: usize = 3;
const CD_THRESHOLD_DEN: usize = 4;

fn meets_threshold(count: usize, total: usize) -> bool {
    count * CD_THRESHOLD_DEN >= total * CD_THRESHOLD_NUM
}

/// The ZIP dimension and its derived roll-ups, always replaced as one unit
/// so readers never observe a half-updated crosswalk.
#[derive(Debug, Clone, Default)]
pub struct ZipTables {
    pub zips: Vec<ZipLocal>,
    pub zips_grouped: Vec<ZipsGrouped>,
    pub cd_zips_grouped: Vec<CdZipsGrouped>,
    pub cd_county_grouped: Vec<CdCountyGrouped>,
    pub cd_state_grouped: Vec<CdStateGrouped>,

    zip5_present: HashSet<String>,
    district_by_zip_state: HashMap<(String, String), String>,
    districts_by_state: HashMap<String, BTreeSet<String>>,
}

impl ZipTables {
    /// Builds all five tables from raw crosswalk rows.
    pub fn derive(zips: Vec<ZipLocal>) -> Self {
        let mut zip_state: BTreeMap<(String, String), Vec<&str>> = BTreeMap::new();
        let mut county_state: BTreeMap<(String, String), Vec<&str>> = BTreeMap::new();
        let mut per_state: BTreeMap<String, Vec<&str>> = BTreeMap::new();

        for row in &zips {
            let zip_key = (row.zip5.clone(), row.state_abbreviation.clone());
            let county_key = (row.county_number.clone(), row.state_abbreviation.clone());
            let cd = row.congressional_district_no.as_deref();
            if let Some(cd) = cd {
                zip_state.entry(zip_key).or_default().push(cd);
                county_state.entry(county_key).or_default().push(cd);
                per_state
                    .entry(row.state_abbreviation.clone())
                    .or_default()
                    .push(cd);
            } else {
                zip_state.entry(zip_key).or_default();
                county_state.entry(county_key).or_default();
                per_state.entry(row.state_abbreviation.clone()).or_default();
            }
        }

        let zips_grouped: Vec<ZipsGrouped> = zip_state
            .keys()
            .map(|(zip5, state)| ZipsGrouped {
                zip5: zip5.clone(),
                state_abbreviation: state.clone(),
            })
            .collect();

        let mut cd_zips_grouped = Vec::new();
        let mut district_by_zip_state = HashMap::new();
        for ((zip5, state), districts) in &zip_state {
            if let Some(cd) = dominant_district(districts) {
                district_by_zip_state.insert((zip5.clone(), state.clone()), cd.clone());
                cd_zips_grouped.push(CdZipsGrouped {
                    zip5: zip5.clone(),
                    state_abbreviation: state.clone(),
                    congressional_district_no: cd,
                });
            }
        }

        let mut cd_county_grouped = Vec::new();
        for ((county, state), districts) in &county_state {
            if let Some(cd) = dominant_district(districts) {
                cd_county_grouped.push(CdCountyGrouped {
                    county_number: county.clone(),
                    state_abbreviation: state.clone(),
                    congressional_district_no: cd,
                });
            }
        }

        let mut cd_state_grouped = Vec::new();
        let mut districts_by_state: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (state, districts) in &per_state {
            districts_by_state.insert(
                state.clone(),
                districts.iter().map(|cd| normalize_district(cd)).collect(),
            );
            if let Some(cd) = dominant_district(districts) {
                cd_state_grouped.push(CdStateGrouped {
                    state_abbreviation: state.clone(),
                    congressional_district_no: cd,
                });
            }
        }

        let zip5_present = zips.iter().map(|row| row.zip5.clone()).collect();

        Self {
            zips,
            zips_grouped,
            cd_zips_grouped,
            cd_county_grouped,
            cd_state_grouped,
            zip5_present,
            district_by_zip_state,
            districts_by_state,
        }
    }

    pub fn zip_exists(&self, zip5: &str) -> bool {
        self.zip5_present.contains(zip5.trim())
    }

    /// Current district for a ZIP5 in a state; "90" when it spans several.
    pub fn district_for_zip(&self, zip5: &str, state: &str) -> Option<&str> {
        self.district_by_zip_state
            .get(&(zip5.trim().to_string(), state.trim().to_ascii_uppercase()))
            .map(String::as_str)
    }

    /// All districts observed in a state, for matching against "90".
    pub fn state_districts(&self, state: &str) -> Option<&BTreeSet<String>> {
        self.districts_by_state.get(&state.trim().to_ascii_uppercase())
    }

    pub fn is_empty(&self) -> bool {
        self.zips.is_empty()
    }
}

fn normalize_district(cd: &str) -> String {
    let trimmed = cd.trim();
    if trimmed.len() == 1 {
        format!("0{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Picks the group's district: the most frequent one when it meets the
/// threshold, the multiple-district code otherwise, nothing when the group
/// carries no district at all.
fn dominant_district(districts: &[&str]) -> Option<String> {
    if districts.is_empty() {
        return None;
    }
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for cd in districts {
        *counts.entry(normalize_district(cd)).or_default() += 1;
    }
    let total: usize = counts.values().sum();
    let (top_cd, top_count) = counts
        .iter()
        .max_by_key(|(_, count)| **count)?;
    if meets_threshold(*top_count, total) {
        Some(top_cd.clone())
    } else {
        Some(MULTIPLE_DISTRICTS.to_string())
    }
}

// ============================================================================
// SAM recipient index
// ============================================================================

/// Registrations indexed by UEI (preferred) and legacy DUNS. Neither
/// identifier is ever overwritten with null once known.
#[derive(Debug, Clone, Default)]
pub struct SamIndex {
    rows: Vec<SamRecipient>,
    by_uei: HashMap<String, usize>,
    by_duns: HashMap<String, usize>,
}

impl SamIndex {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[SamRecipient] {
        &self.rows
    }

    /// Prefer the UEI key, fall back to DUNS.
    pub fn recipient(&self, uei: Option<&str>, duns: Option<&str>) -> Option<&SamRecipient> {
        if let Some(uei) = uei
            && !uei.trim().is_empty()
            && let Some(index) = self.by_uei.get(&norm(uei))
        {
            return self.rows.get(*index);
        }
        let duns = duns?;
        if duns.trim().is_empty() {
            return None;
        }
        self.by_duns.get(&norm(duns)).and_then(|index| self.rows.get(*index))
    }

    /// Inserts or merges. An incoming row never clears an identifier the
    /// stored row already carries. Returns true on insert.
    pub fn upsert(&mut self, incoming: SamRecipient) -> bool {
        let existing = self
            .index_of(incoming.uei.as_deref(), incoming.awardee_or_recipient_uniqu.as_deref());
        match existing {
            Some(index) => {
                let merged = merge_recipient(&self.rows[index], incoming);
                self.rows[index] = merged;
                self.reindex_row(index);
                false
            }
            None => {
                let index = self.rows.len();
                self.rows.push(incoming);
                self.reindex_row(index);
                true
            }
        }
    }

    /// Soft delete: the registration stays addressable but is marked
    /// deactivated as of `date`.
    pub fn deactivate(
        &mut self,
        uei: Option<&str>,
        duns: Option<&str>,
        date: chrono::NaiveDate,
    ) -> bool {
        match self.index_of(uei, duns) {
            Some(index) => {
                self.rows[index].deactivation_date = Some(date);
                true
            }
            None => false,
        }
    }

    fn index_of(&self, uei: Option<&str>, duns: Option<&str>) -> Option<usize> {
        if let Some(uei) = uei
            && !uei.trim().is_empty()
            && let Some(index) = self.by_uei.get(&norm(uei))
        {
            return Some(*index);
        }
        if let Some(duns) = duns
            && !duns.trim().is_empty()
            && let Some(index) = self.by_duns.get(&norm(duns))
        {
            return Some(*index);
        }
        None
    }

    fn reindex_row(&mut self, index: usize) {
        if let Some(uei) = &self.rows[index].uei
            && !uei.trim().is_empty()
        {
            self.by_uei.insert(norm(uei), index);
        }
        if let Some(duns) = &self.rows[index].awardee_or_recipient_uniqu
            && !duns.trim().is_empty()
        {
            self.by_duns.insert(norm(duns), index);
        }
    }
}

fn norm(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn merge_recipient(existing: &SamRecipient, mut incoming: SamRecipient) -> SamRecipient {
    if incoming.uei.as_deref().is_none_or(|u| u.trim().is_empty()) {
        incoming.uei = existing.uei.clone();
    }
    if incoming
        .awardee_or_recipient_uniqu
        .as_deref()
        .is_none_or(|d| d.trim().is_empty())
    {
        incoming.awardee_or_recipient_uniqu = existing.awardee_or_recipient_uniqu.clone();
    }
    incoming
}

// ============================================================================
// SF-133 balances
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Sf133Tables {
    by_period: BTreeMap<(u16, u8), Vec<Sf133Balance>>,
}

impl Sf133Tables {
    pub fn set_period(&mut self, fiscal_year: u16, period: u8, rows: Vec<Sf133Balance>) {
        self.by_period.insert((fiscal_year, period), rows);
    }

    pub fn clear_period(&mut self, fiscal_year: u16, period: u8) {
        self.by_period.remove(&(fiscal_year, period));
    }

    pub fn has_period(&self, fiscal_year: u16, period: u8) -> bool {
        self.by_period.contains_key(&(fiscal_year, period))
    }

    pub fn rows(&self, fiscal_year: u16, period: u8) -> &[Sf133Balance] {
        self.by_period
            .get(&(fiscal_year, period))
            .map_or(&[], Vec::as_slice)
    }

    pub fn all_rows(&self) -> impl Iterator<Item = &Sf133Balance> {
        self.by_period.values().flatten()
    }

    /// Decimal sum over the named lines for one TAS, rounded once at the
    /// end.
    pub fn line_sum(&self, tas: &str, fiscal_year: u16, period: u8, lines: &[u32]) -> Money {
        self.rows(fiscal_year, period)
            .iter()
            .filter(|row| row.tas == tas && lines.contains(&row.line_number))
            .map(|row| row.amount)
            .sum::<Money>()
            .round2()
    }

    /// Distinct TAS display strings reported for the period.
    pub fn tas_for_period(&self, fiscal_year: u16, period: u8) -> BTreeSet<&str> {
        self.rows(fiscal_year, period)
            .iter()
            .map(|row| row.tas.as_str())
            .collect()
    }
}

// ============================================================================
// The store
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ReferenceStore {
    loaded: BTreeSet<Dimension>,
    pub stamps: LoadStamps,

    next_account_num: u64,
    tas: Vec<TasAccount>,
    tas_by_display: HashMap<String, Vec<usize>>,

    cgac: BTreeMap<String, CgacAgency>,
    frec: BTreeMap<String, FrecAgency>,
    sub_tier: CaseInsensitiveMap<SubTierAgency>,

    assistance_listings: BTreeMap<String, AssistanceListing>,
    defc: CaseInsensitiveMap<DefcCode>,
    countries: CaseInsensitiveMap<CountryCode>,

    zip: ZipTables,
    sam: SamIndex,
    sam_unregistered: Vec<SamRecipient>,

    object_classes: BTreeMap<String, ObjectClass>,
    program_activity: Vec<ProgramActivity>,
    program_activity_index: HashSet<(u16, String, String, String)>,
    submission_windows: BTreeMap<(u16, u8), SubmissionWindow>,
    sf133: Sf133Tables,
}

impl ReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_loaded(&mut self, dimension: Dimension) {
        self.loaded.insert(dimension);
    }

    pub fn is_loaded(&self, dimension: Dimension) -> bool {
        self.loaded.contains(&dimension)
    }

    pub fn loaded_dimensions(&self) -> impl Iterator<Item = Dimension> + '_ {
        self.loaded.iter().copied()
    }

    // ------------------------------------------------------------------
    // TAS
    // ------------------------------------------------------------------

    /// Replaces the TAS dimension, preserving surrogate `account_num`s of
    /// rows whose natural key was already present.
    pub fn set_tas_accounts(&mut self, incoming: Vec<TasAccount>) {
        let mut existing_nums: HashMap<TasComponents, u64> = self
            .tas
            .iter()
            .map(|row| (row.components.clone(), row.account_num))
            .collect();
        let mut rows = Vec::with_capacity(incoming.len());
        for mut row in incoming {
            row.account_num = match existing_nums.remove(&row.components) {
                Some(num) => num,
                None => {
                    self.next_account_num += 1;
                    self.next_account_num
                }
            };
            rows.push(row);
        }
        self.tas = rows;
        self.tas_by_display = HashMap::new();
        for (index, row) in self.tas.iter().enumerate() {
            self.tas_by_display
                .entry(row.display())
                .or_default()
                .push(index);
        }
        self.mark_loaded(Dimension::Tas);
    }

    pub fn tas_accounts(&self) -> &[TasAccount] {
        &self.tas
    }

    pub fn tas_exists(&self, display: &str) -> bool {
        self.tas_by_display.contains_key(display)
    }

    pub fn tas_current_on(&self, display: &str, date: chrono::NaiveDate) -> Option<&TasAccount> {
        let indexes = self.tas_by_display.get(display)?;
        indexes
            .iter()
            .map(|index| &self.tas[*index])
            .find(|row| row.is_current_on(date))
    }

    // ------------------------------------------------------------------
    // Agencies
    // ------------------------------------------------------------------

    pub fn set_agencies(
        &mut self,
        cgac: Vec<CgacAgency>,
        frec: Vec<FrecAgency>,
        sub_tier: Vec<SubTierAgency>,
    ) {
        self.cgac = cgac.into_iter().map(|a| (a.cgac_code.clone(), a)).collect();
        self.frec = frec.into_iter().map(|a| (a.frec_code.clone(), a)).collect();
        let mut map = CaseInsensitiveMap::new();
        for agency in sub_tier {
            let key = agency.sub_tier_code.clone();
            map.insert(&key, agency);
        }
        self.sub_tier = map;
        self.mark_loaded(Dimension::Agencies);
    }

    pub fn cgac(&self, code: &str) -> Option<&CgacAgency> {
        self.cgac.get(code.trim())
    }

    pub fn cgac_agencies(&self) -> impl Iterator<Item = &CgacAgency> {
        self.cgac.values()
    }

    pub fn frec_agencies(&self) -> impl Iterator<Item = &FrecAgency> {
        self.frec.values()
    }

    pub fn sub_tier(&self, code: &str) -> Option<&SubTierAgency> {
        self.sub_tier.get(code)
    }

    pub fn sub_tier_agencies(&self) -> impl Iterator<Item = &SubTierAgency> {
        self.sub_tier.values()
    }

    // ------------------------------------------------------------------
    // Assistance listings
    // ------------------------------------------------------------------

    pub fn set_assistance_listings(&mut self, listings: Vec<AssistanceListing>) {
        self.assistance_listings = listings
            .into_iter()
            .map(|l| (l.program_number.trim().to_string(), l))
            .collect();
        self.mark_loaded(Dimension::AssistanceListings);
    }

    pub fn upsert_assistance_listing(&mut self, listing: AssistanceListing) {
        self.mark_loaded(Dimension::AssistanceListings);
        self.assistance_listings
            .insert(listing.program_number.trim().to_string(), listing);
    }

    pub fn assistance_listing(&self, number: &str) -> Option<&AssistanceListing> {
        self.assistance_listings.get(number.trim())
    }

    pub fn assistance_listings(&self) -> impl Iterator<Item = &AssistanceListing> {
        self.assistance_listings.values()
    }

    // ------------------------------------------------------------------
    // DEFC, countries
    // ------------------------------------------------------------------

    pub fn set_defc(&mut self, codes: Vec<DefcCode>) {
        let mut map = CaseInsensitiveMap::new();
        for code in codes {
            let key = code.code.clone();
            map.insert(&key, code);
        }
        self.defc = map;
        self.mark_loaded(Dimension::Defc);
    }

    pub fn defc(&self, code: &str) -> Option<&DefcCode> {
        self.defc.get(code)
    }

    pub fn defc_codes(&self) -> impl Iterator<Item = &DefcCode> {
        self.defc.values()
    }

    pub fn set_countries(&mut self, countries: Vec<CountryCode>) {
        let mut map = CaseInsensitiveMap::new();
        for country in countries {
            let key = country.country_code.clone();
            map.insert(&key, country);
        }
        self.countries = map;
        self.mark_loaded(Dimension::Countries);
    }

    pub fn country(&self, code: &str) -> Option<&CountryCode> {
        self.countries.get(code)
    }

    pub fn countries(&self) -> impl Iterator<Item = &CountryCode> {
        self.countries.values()
    }

    // ------------------------------------------------------------------
    // ZIP crosswalk
    // ------------------------------------------------------------------

    /// Swaps the whole ZIP family in one move.
    pub fn swap_zip_tables(&mut self, tables: ZipTables) -> ZipTables {
        self.mark_loaded(Dimension::Zips);
        std::mem::replace(&mut self.zip, tables)
    }

    /// Rebuilds the ZIP family through a fallible builder. The live tables
    /// stay in place until the replacement is complete; a failed build
    /// changes nothing.
    pub fn reload_zip_tables(
        &mut self,
        build: impl FnOnce() -> Result<ZipTables>,
    ) -> Result<ZipTables> {
        let retired = rebuild_and_swap(&mut self.zip, build)?;
        self.mark_loaded(Dimension::Zips);
        Ok(retired)
    }

    pub fn zip(&self) -> &ZipTables {
        &self.zip
    }

    // ------------------------------------------------------------------
    // SAM
    // ------------------------------------------------------------------

    pub fn sam(&self) -> &SamIndex {
        &self.sam
    }

    pub fn sam_mut(&mut self) -> &mut SamIndex {
        self.mark_loaded(Dimension::SamRecipients);
        &mut self.sam
    }

    pub fn replace_sam_unregistered(&mut self, rows: Vec<SamRecipient>) {
        self.sam_unregistered = rows;
    }

    pub fn sam_unregistered(&self) -> &[SamRecipient] {
        &self.sam_unregistered
    }

    // ------------------------------------------------------------------
    // Object classes, program activity, submission windows
    // ------------------------------------------------------------------

    pub fn set_object_classes(&mut self, classes: Vec<ObjectClass>) {
        self.object_classes = classes.into_iter().map(|c| (c.code.clone(), c)).collect();
        self.mark_loaded(Dimension::ObjectClasses);
    }

    /// Three-digit lookup; a four-digit code with a leading zero is read
    /// as its three-digit form.
    pub fn object_class_exists(&self, code: &str) -> bool {
        let trimmed = code.trim();
        let looked_up = if trimmed.len() == 4 && trimmed.starts_with('0') {
            &trimmed[1..]
        } else {
            trimmed
        };
        self.object_classes.contains_key(looked_up)
    }

    pub fn object_classes(&self) -> impl Iterator<Item = &ObjectClass> {
        self.object_classes.values()
    }

    pub fn set_program_activity(&mut self, rows: Vec<ProgramActivity>) {
        self.program_activity_index = rows
            .iter()
            .map(|row| {
                (
                    row.fiscal_year,
                    norm(&row.agency_identifier),
                    norm(&row.program_activity_code),
                    norm(&row.program_activity_name),
                )
            })
            .collect();
        self.program_activity = rows;
        self.mark_loaded(Dimension::ProgramActivity);
    }

    pub fn has_program_activity(
        &self,
        fiscal_year: u16,
        agency_identifier: &str,
        code: &str,
        name: &str,
    ) -> bool {
        self.program_activity_index.contains(&(
            fiscal_year,
            norm(agency_identifier),
            norm(code),
            norm(name),
        ))
    }

    pub fn program_activities(&self) -> &[ProgramActivity] {
        &self.program_activity
    }

    pub fn set_submission_windows(&mut self, windows: Vec<SubmissionWindow>) {
        self.submission_windows = windows
            .into_iter()
            .map(|w| ((w.fiscal_year, w.fiscal_period), w))
            .collect();
        self.mark_loaded(Dimension::SubmissionWindows);
    }

    pub fn submission_window(&self, fiscal_year: u16, period: u8) -> Option<&SubmissionWindow> {
        self.submission_windows.get(&(fiscal_year, period))
    }

    pub fn submission_windows(&self) -> impl Iterator<Item = &SubmissionWindow> {
        self.submission_windows.values()
    }

    // ------------------------------------------------------------------
    // SF-133
    // ------------------------------------------------------------------

    pub fn sf133(&self) -> &Sf133Tables {
        &self.sf133
    }

    pub fn sf133_mut(&mut self) -> &mut Sf133Tables {
        self.mark_loaded(Dimension::Sf133);
        &mut self.sf133
    }

    /// SF-133 TAS owned by `agency`: the allocation transfer agency when
    /// one is present, the agency identifier otherwise.
    pub fn sf133_tas_for_agency(
        &self,
        fiscal_year: u16,
        period: u8,
        agency: &str,
    ) -> Vec<&str> {
        let agency = daims_model::codes::pad_left_zero(agency, 3);
        self.sf133
            .tas_for_period(fiscal_year, period)
            .into_iter()
            .filter(|display| {
                display.len() >= 6 && {
                    let ata = &display[0..3];
                    let aid = &display[3..6];
                    if ata == "000" { aid == agency } else { ata == agency }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zip_row(zip5: &str, state: &str, county: &str, cd: Option<&str>) -> ZipLocal {
        ZipLocal {
            zip5: zip5.to_string(),
            zip_last4: None,
            state_abbreviation: state.to_string(),
            county_number: county.to_string(),
            congressional_district_no: cd.map(str::to_string),
        }
    }

    #[test]
    fn zip_rollup_emits_multiple_code_below_threshold() {
        // two of three rows share "04": 2/3 < 3/4, so the ZIP spans districts
        let tables = ZipTables::derive(vec![
            zip_row("12345", "NY", "001", Some("04")),
            zip_row("12345", "NY", "001", Some("04")),
            zip_row("12345", "NY", "001", Some("03")),
        ]);
        assert_eq!(tables.district_for_zip("12345", "NY"), Some("90"));

        let tables = ZipTables::derive(vec![
            zip_row("12345", "NY", "001", Some("04")),
            zip_row("12345", "NY", "001", Some("04")),
            zip_row("12345", "NY", "001", Some("04")),
        ]);
        assert_eq!(tables.district_for_zip("12345", "NY"), Some("04"));
    }

    #[test]
    fn zip_rollup_threshold_boundary_is_inclusive() {
        // exactly 3 of 4 meets the threshold
        let tables = ZipTables::derive(vec![
            zip_row("20001", "DC", "001", Some("98")),
            zip_row("20001", "DC", "001", Some("98")),
            zip_row("20001", "DC", "001", Some("98")),
            zip_row("20001", "DC", "001", Some("01")),
        ]);
        assert_eq!(tables.district_for_zip("20001", "DC"), Some("98"));
    }

    #[test]
    fn zip_without_any_district_produces_no_grouped_row() {
        let tables = ZipTables::derive(vec![zip_row("96799", "AS", "010", None)]);
        assert_eq!(tables.district_for_zip("96799", "AS"), None);
        assert!(tables.zip_exists("96799"));
        assert_eq!(tables.zips_grouped.len(), 1);
    }

    #[test]
    fn single_digit_districts_are_padded() {
        let tables = ZipTables::derive(vec![zip_row("30301", "GA", "089", Some("5"))]);
        assert_eq!(tables.district_for_zip("30301", "GA"), Some("05"));
        assert!(tables.state_districts("ga").unwrap().contains("05"));
    }

    #[test]
    fn sam_upsert_never_nulls_an_identifier() {
        let mut sam = SamIndex::default();
        sam.upsert(SamRecipient {
            uei: Some("TESTUEI00001".into()),
            awardee_or_recipient_uniqu: Some("123456789".into()),
            legal_business_name: "ACME".into(),
            ..SamRecipient::default()
        });
        // V1-style update keyed by DUNS only
        sam.upsert(SamRecipient {
            uei: None,
            awardee_or_recipient_uniqu: Some("123456789".into()),
            legal_business_name: "ACME LLC".into(),
            ..SamRecipient::default()
        });
        assert_eq!(sam.len(), 1);
        let row = sam.recipient(Some("TESTUEI00001"), None).unwrap();
        assert_eq!(row.legal_business_name, "ACME LLC");
        assert_eq!(row.uei.as_deref(), Some("TESTUEI00001"));
        assert_eq!(row.awardee_or_recipient_uniqu.as_deref(), Some("123456789"));
    }

    #[test]
    fn sam_lookup_prefers_uei_over_duns() {
        let mut sam = SamIndex::default();
        sam.upsert(SamRecipient {
            uei: Some("UEIAAAAAAAA1".into()),
            legal_business_name: "BY UEI".into(),
            ..SamRecipient::default()
        });
        sam.upsert(SamRecipient {
            awardee_or_recipient_uniqu: Some("999888777".into()),
            legal_business_name: "BY DUNS".into(),
            ..SamRecipient::default()
        });
        let hit = sam.recipient(Some("ueiaaaaaaaa1"), Some("999888777")).unwrap();
        assert_eq!(hit.legal_business_name, "BY UEI");
        assert_eq!(sam.recipient(None, Some("999888777")).unwrap().legal_business_name, "BY DUNS");
        assert!(sam.recipient(Some("UNKNOWN00000"), None).is_none());
    }

    #[test]
    fn tas_surrogates_survive_reload() {
        let mut store = ReferenceStore::new();
        let components =
            TasComponents::from_submitted("", "097", "2016", "2017", "", "0804", "001");
        store.set_tas_accounts(vec![TasAccount {
            account_num: 0,
            components: components.clone(),
            internal_start_date: None,
            internal_end_date: None,
        }]);
        let first_num = store.tas_accounts()[0].account_num;

        store.set_tas_accounts(vec![
            TasAccount {
                account_num: 0,
                components: components.clone(),
                internal_start_date: None,
                internal_end_date: None,
            },
            TasAccount {
                account_num: 0,
                components: TasComponents::from_submitted("", "020", "", "", "X", "0100", ""),
                internal_start_date: None,
                internal_end_date: None,
            },
        ]);
        assert_eq!(store.tas_accounts()[0].account_num, first_num);
        assert_ne!(store.tas_accounts()[1].account_num, first_num);
        assert!(store.tas_exists(&components.display()));
    }

    #[test]
    fn sf133_line_sums_round_after_aggregation() {
        let mut store = ReferenceStore::new();
        let tas = "00009720162017 0804001".to_string();
        store.sf133_mut().set_period(
            2016,
            1,
            vec![
                Sf133Balance {
                    tas: tas.clone(),
                    fiscal_year: 2016,
                    period: 1,
                    line_number: 1540,
                    amount: "1.004".parse().unwrap(),
                    disaster_emergency_fund_code: None,
                },
                Sf133Balance {
                    tas: tas.clone(),
                    fiscal_year: 2016,
                    period: 1,
                    line_number: 1640,
                    amount: "1.004".parse().unwrap(),
                    disaster_emergency_fund_code: None,
                },
            ],
        );
        let sum = store.sf133().line_sum(&tas, 2016, 1, &[1540, 1640]);
        assert_eq!(sum.to_string(), "2.01");
        assert!(store.sf133().has_period(2016, 1));
        assert!(!store.sf133().has_period(2016, 2));
    }

    #[test]
    fn sf133_agency_filter_honors_allocation_transfer() {
        let mut store = ReferenceStore::new();
        let mk = |tas: &str| Sf133Balance {
            tas: tas.to_string(),
            fiscal_year: 2017,
            period: 6,
            line_number: 2500,
            amount: Money::ZERO,
            disaster_emergency_fund_code: None,
        };
        store.sf133_mut().set_period(
            2017,
            6,
            vec![
                mk("00009720172017 0100000"),
                mk("09702020172017 0200000"),
                mk("00002020172017 0300000"),
            ],
        );
        let own = store.sf133_tas_for_agency(2017, 6, "97");
        assert_eq!(own, vec!["00009720172017 0100000", "09702020172017 0200000"]);
    }
}
