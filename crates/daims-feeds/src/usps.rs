//! USPS ZIP crosswalk.
//!
//! Two fixed-width products feed the crosswalk: the ZIP+4 detail file
//! (one `D` record per +4 range, carrying state, county, and
//! congressional district at fixed offsets) and the city/state file
//! (one `D` record per ZIP, no district — it backfills ZIPs the +4
//! product does not cover, PO-box-only ZIPs mostly).
//!
//! Military ZIPs (states AA/AE/AP) are dropped. A handful of territories
//! carry a forced district code regardless of what the file says, and
//! ZIP 96898 (Wake Island) is absent from both products and hard-coded.
//! Every artifact rebuilds the full table family and swaps it in as one
//! unit, so readers never see the crosswalk half-updated.

use std::cell::RefCell;
use std::collections::BTreeSet;

use tracing::debug;

use daims_model::reference::ZipLocal;
use daims_reference::diff::DiffCounts;
use daims_reference::error::{ReferenceError, Result};
use daims_reference::loader::{FeedLoader, FetchedArtifact, read_artifact_text};
use daims_reference::store::{ReferenceStore, ZipTables};

/// Record layout offsets for the ZIP+4 detail file.
mod zip4 {
    pub const ZIP5: (usize, usize) = (1, 6);
    pub const LAST4_LOW: (usize, usize) = (140, 144);
    pub const STATE: (usize, usize) = (157, 159);
    pub const COUNTY: (usize, usize) = (159, 162);
    pub const DISTRICT: (usize, usize) = (162, 164);
}

/// Record layout offsets for the city/state file.
mod citystate {
    pub const ZIP5: (usize, usize) = (1, 6);
    pub const STATE: (usize, usize) = (99, 101);
    pub const COUNTY: (usize, usize) = (101, 104);
}

const MILITARY_STATES: [&str; 3] = ["AA", "AE", "AP"];

/// Territories whose congressional district is fixed no matter what the
/// source file carries: delegate seats read "98", the freely associated
/// states "99", and the minor outlying islands "00".
fn forced_district(state: &str) -> Option<&'static str> {
    match state {
        "AS" | "DC" | "GU" | "MP" | "PR" | "VI" => Some("98"),
        "FM" | "MH" | "PW" => Some("99"),
        "UM" => Some("00"),
        _ => None,
    }
}

/// Wake Island: present in neither USPS product.
fn hard_coded_rows() -> Vec<ZipLocal> {
    vec![ZipLocal {
        zip5: "96898".to_string(),
        zip_last4: None,
        state_abbreviation: "UM".to_string(),
        county_number: "850".to_string(),
        congressional_district_no: Some("00".to_string()),
    }]
}

fn slice(line: &str, range: (usize, usize)) -> &str {
    line.get(range.0..range.1).unwrap_or("").trim()
}

fn parse_zip4_line(line: &str) -> Option<ZipLocal> {
    if !line.starts_with('D') {
        return None;
    }
    let state = slice(line, zip4::STATE).to_string();
    if MILITARY_STATES.contains(&state.as_str()) {
        return None;
    }
    let zip5 = slice(line, zip4::ZIP5);
    if zip5.len() != 5 {
        return None;
    }
    let district = match forced_district(&state) {
        Some(forced) => Some(forced.to_string()),
        None => {
            let raw = slice(line, zip4::DISTRICT);
            (!raw.is_empty()).then(|| raw.to_string())
        }
    };
    let last4 = slice(line, zip4::LAST4_LOW);
    Some(ZipLocal {
        zip5: zip5.to_string(),
        zip_last4: (!last4.is_empty()).then(|| last4.to_string()),
        state_abbreviation: state,
        county_number: slice(line, zip4::COUNTY).to_string(),
        congressional_district_no: district,
    })
}

fn parse_citystate_line(line: &str) -> Option<ZipLocal> {
    if !line.starts_with('D') {
        return None;
    }
    let state = slice(line, citystate::STATE).to_string();
    if MILITARY_STATES.contains(&state.as_str()) {
        return None;
    }
    let zip5 = slice(line, citystate::ZIP5);
    if zip5.len() != 5 {
        return None;
    }
    Some(ZipLocal {
        zip5: zip5.to_string(),
        zip_last4: None,
        state_abbreviation: state.clone(),
        county_number: slice(line, citystate::COUNTY).to_string(),
        congressional_district_no: forced_district(&state).map(str::to_string),
    })
}

/// Rebuilds the ZIP table family from both USPS products.
///
/// One loader instance covers one run: artifacts accumulate into the
/// loader and every apply swaps in tables rebuilt from everything seen so
/// far, so the final artifact leaves the complete crosswalk in place no
/// matter how the products are split across files.
#[derive(Debug, Default)]
pub struct UspsZipLoader {
    zip4_rows: RefCell<Vec<ZipLocal>>,
    citystate_rows: RefCell<Vec<ZipLocal>>,
}

impl UspsZipLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn rebuild(&self, store: &mut ReferenceStore) -> Result<()> {
        let zip4_rows = self.zip4_rows.borrow();
        let citystate_rows = self.citystate_rows.borrow();

        let covered: BTreeSet<&str> = zip4_rows.iter().map(|row| row.zip5.as_str()).collect();
        let mut rows: Vec<ZipLocal> = zip4_rows.iter().cloned().collect();
        rows.extend(
            citystate_rows
                .iter()
                .filter(|row| !covered.contains(row.zip5.as_str()))
                .cloned(),
        );
        for hard_coded in hard_coded_rows() {
            if !rows.iter().any(|row| row.zip5 == hard_coded.zip5) {
                rows.push(hard_coded);
            }
        }

        store.reload_zip_tables(|| Ok(ZipTables::derive(rows)))?;
        Ok(())
    }
}

impl FeedLoader for UspsZipLoader {
    fn feed_key(&self) -> &'static str {
        "usps_zip"
    }

    fn apply(&self, store: &mut ReferenceStore, artifact: &FetchedArtifact) -> Result<DiffCounts> {
        let name = artifact.reference.name.to_ascii_lowercase();
        let body = read_artifact_text(artifact)?;

        let before = store.zip().zips.len();
        if name.contains("zip4") {
            let mut rows = self.zip4_rows.borrow_mut();
            rows.extend(body.lines().filter_map(parse_zip4_line));
        } else if name.contains("citystate") {
            let mut rows = self.citystate_rows.borrow_mut();
            rows.extend(body.lines().filter_map(parse_citystate_line));
        } else {
            return Err(ReferenceError::Parse {
                path: artifact.local_path.clone(),
                message: "expected a zip4 or citystate product".to_string(),
            });
        }

        self.rebuild(store)?;
        let after = store.zip().zips.len();
        debug!(artifact = %artifact.artifact_id(), rows = after, "zip crosswalk rebuilt");
        Ok(DiffCounts {
            inserted: after.saturating_sub(before),
            unchanged: before.min(after),
            ..DiffCounts::default()
        })
    }
}
