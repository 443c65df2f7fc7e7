#![deny(unsafe_code)]

//! Natural-key diff between an incoming artifact and the current dimension.
//!
//! Reference dimensions never hard-delete: a key that disappears from the
//! incoming set is deactivated, a key with changed content is updated, and
//! an unchanged row produces no write at all — which is what makes a re-run
//! over the same artifact a no-op.

use std::collections::BTreeMap;

use daims_model::reference::{
    AssistanceListing, CgacAgency, CountryCode, DefcCode, FrecAgency, ObjectClass,
    ProgramActivity, SubTierAgency, SubmissionWindow, TasAccount,
};
use daims_model::tas::TasComponents;

/// A dimension row that can be diffed by natural key.
pub trait RefRow {
    type Key: Ord + Clone;

    fn natural_key(&self) -> Self::Key;

    /// Content equality ignoring surrogate/bookkeeping fields.
    fn same_content(&self, other: &Self) -> bool;
}

#[derive(Debug)]
pub struct RowDiff<R: RefRow> {
    pub inserts: Vec<R>,
    pub updates: Vec<R>,
    pub deactivations: Vec<R::Key>,
    pub unchanged: usize,
}

impl<R: RefRow> RowDiff<R> {
    pub fn counts(&self) -> DiffCounts {
        DiffCounts {
            inserted: self.inserts.len(),
            updated: self.updates.len(),
            deactivated: self.deactivations.len(),
            unchanged: self.unchanged,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deactivations.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DiffCounts {
    pub inserted: usize,
    pub updated: usize,
    pub deactivated: usize,
    pub unchanged: usize,
}

impl DiffCounts {
    pub fn changed(&self) -> usize {
        self.inserted + self.updated + self.deactivated
    }

    pub fn merge(&mut self, other: DiffCounts) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deactivated += other.deactivated;
        self.unchanged += other.unchanged;
    }
}

/// Diffs `incoming` against `current`. Later duplicates of a key within
/// `incoming` win, matching last-write semantics of the delta feeds.
pub fn diff_rows<R: RefRow + Clone>(current: &[R], incoming: &[R]) -> RowDiff<R> {
    let mut incoming_by_key: BTreeMap<R::Key, R> = BTreeMap::new();
    for row in incoming {
        incoming_by_key.insert(row.natural_key(), row.clone());
    }

    let current_by_key: BTreeMap<R::Key, &R> =
        current.iter().map(|row| (row.natural_key(), row)).collect();

    let mut diff = RowDiff {
        inserts: Vec::new(),
        updates: Vec::new(),
        deactivations: Vec::new(),
        unchanged: 0,
    };

    for key in current_by_key.keys() {
        if !incoming_by_key.contains_key(key) {
            diff.deactivations.push(key.clone());
        }
    }

    for (key, row) in incoming_by_key {
        match current_by_key.get(&key) {
            None => diff.inserts.push(row),
            Some(existing) if existing.same_content(&row) => diff.unchanged += 1,
            Some(_) => diff.updates.push(row),
        }
    }

    diff
}

// ============================================================================
// Dimension row keys
// ============================================================================

impl RefRow for TasAccount {
    type Key = TasComponents;

    fn natural_key(&self) -> TasComponents {
        self.components.clone()
    }

    /// `account_num` is a surrogate; only the currency window counts.
    fn same_content(&self, other: &Self) -> bool {
        self.internal_start_date == other.internal_start_date
            && self.internal_end_date == other.internal_end_date
    }
}

impl RefRow for CgacAgency {
    type Key = String;

    fn natural_key(&self) -> String {
        self.cgac_code.clone()
    }

    fn same_content(&self, other: &Self) -> bool {
        self == other
    }
}

impl RefRow for FrecAgency {
    type Key = String;

    fn natural_key(&self) -> String {
        self.frec_code.clone()
    }

    fn same_content(&self, other: &Self) -> bool {
        self == other
    }
}

impl RefRow for SubTierAgency {
    type Key = String;

    fn natural_key(&self) -> String {
        self.sub_tier_code.clone()
    }

    fn same_content(&self, other: &Self) -> bool {
        self == other
    }
}

impl RefRow for AssistanceListing {
    type Key = String;

    fn natural_key(&self) -> String {
        self.program_number.clone()
    }

    fn same_content(&self, other: &Self) -> bool {
        self == other
    }
}

impl RefRow for DefcCode {
    type Key = String;

    fn natural_key(&self) -> String {
        self.code.clone()
    }

    fn same_content(&self, other: &Self) -> bool {
        self == other
    }
}

impl RefRow for CountryCode {
    type Key = String;

    fn natural_key(&self) -> String {
        self.country_code.clone()
    }

    fn same_content(&self, other: &Self) -> bool {
        self == other
    }
}

impl RefRow for ObjectClass {
    type Key = String;

    fn natural_key(&self) -> String {
        self.code.clone()
    }

    fn same_content(&self, other: &Self) -> bool {
        self == other
    }
}

impl RefRow for ProgramActivity {
    type Key = (u16, String, String, String);

    fn natural_key(&self) -> Self::Key {
        (
            self.fiscal_year,
            self.agency_identifier.clone(),
            self.program_activity_code.clone(),
            self.program_activity_name.clone(),
        )
    }

    fn same_content(&self, other: &Self) -> bool {
        self == other
    }
}

impl RefRow for SubmissionWindow {
    type Key = (u16, u8);

    fn natural_key(&self) -> Self::Key {
        (self.fiscal_year, self.fiscal_period)
    }

    fn same_content(&self, other: &Self) -> bool {
        self == other
    }
}
