#![deny(unsafe_code)]

//! Public CSV exports of selected dimensions, written with a fixed column
//! and row order so downstream consumers can diff successive exports.

use std::path::Path;

use daims_model::reference::{CdStateGrouped, CountryCode};

use crate::error::Result;
use crate::store::ReferenceStore;
use crate::tables;

/// `countries.csv`: one row per GENC code, sorted by code.
pub fn export_countries(store: &ReferenceStore, path: &Path) -> Result<usize> {
    let mut rows: Vec<&CountryCode> = store.countries().collect();
    rows.sort_by(|a, b| a.country_code.cmp(&b.country_code));
    tables::write_csv(path, &rows)?;
    Ok(rows.len())
}

/// `cd_state_grouped.csv`: the per-state congressional district roll-up,
/// sorted by state.
pub fn export_cd_state_grouped(store: &ReferenceStore, path: &Path) -> Result<usize> {
    let mut rows: Vec<&CdStateGrouped> = store.zip().cd_state_grouped.iter().collect();
    rows.sort_by(|a, b| a.state_abbreviation.cmp(&b.state_abbreviation));
    tables::write_csv(path, &rows)?;
    Ok(rows.len())
}
