//! GTAS SF-133 trial balances.
//!
//! One CSV per fiscal period, named `sf_133_<year>_<period>.csv`; the
//! name decides which period slot the rows replace. Zero-amount rows are
//! noise except on the lines the appropriation checks sum over, so those
//! are kept and the rest dropped. GTAS reports the non-disaster bucket as
//! `QQQ`; downstream it is the single letter `Q`.

use serde::Deserialize;
use tracing::debug;

use daims_model::money::Money;
use daims_model::reference::Sf133Balance;
use daims_model::tas::TasComponents;
use daims_reference::diff::DiffCounts;
use daims_reference::error::{ReferenceError, Result};
use daims_reference::loader::{FeedLoader, FetchedArtifact};
use daims_reference::store::ReferenceStore;
use daims_reference::tables::read_csv;

/// Lines that appear in period-balance checks; zero amounts on these are
/// meaningful and survive the load.
const RETAIN_ZERO_LINES: [u32; 20] = [
    1000, 1010, 1020, 1021, 1033, 1042, 1160, 1180, 1260, 1280, 1340, 1440, 1540, 1640, 1750,
    1850, 2190, 2490, 2500, 3020,
];

#[derive(Debug, Deserialize)]
struct Sf133FeedRow {
    #[allow(dead_code)]
    fiscal_year: u16,
    #[allow(dead_code)]
    period: u8,
    #[serde(default)]
    allocation_transfer_agency: String,
    agency_identifier: String,
    #[serde(default)]
    beginning_period_of_availa: String,
    #[serde(default)]
    ending_period_of_availabil: String,
    #[serde(default)]
    availability_type_code: String,
    main_account_code: String,
    #[serde(default)]
    sub_account_code: String,
    line_number: u32,
    amount: Money,
    #[serde(default)]
    disaster_emergency_fund_code: String,
}

/// `sf_133_2024_06.csv` → (2024, 6).
fn period_from_name(name: &str) -> Option<(u16, u8)> {
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    let mut parts = stem.rsplit('_');
    let period = parts.next()?.parse().ok()?;
    let year = parts.next()?.parse().ok()?;
    Some((year, period))
}

fn normalize_defc(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.eq_ignore_ascii_case("QQQ") {
        return Some("Q".to_string());
    }
    Some(trimmed.to_ascii_uppercase())
}

#[derive(Debug, Default)]
pub struct Sf133Loader;

impl Sf133Loader {
    pub fn new() -> Self {
        Self
    }
}

impl FeedLoader for Sf133Loader {
    fn feed_key(&self) -> &'static str {
        "sf133"
    }

    fn apply(&self, store: &mut ReferenceStore, artifact: &FetchedArtifact) -> Result<DiffCounts> {
        let Some((fiscal_year, period)) = period_from_name(&artifact.reference.name) else {
            return Err(ReferenceError::Parse {
                path: artifact.local_path.clone(),
                message: "file name does not carry a fiscal year and period".to_string(),
            });
        };

        let feed_rows: Vec<Sf133FeedRow> = read_csv(&artifact.local_path)?;
        let total = feed_rows.len();

        let balances: Vec<Sf133Balance> = feed_rows
            .into_iter()
            .filter(|row| {
                !row.amount.is_zero() || RETAIN_ZERO_LINES.contains(&row.line_number)
            })
            .map(|row| {
                let tas = TasComponents::from_submitted(
                    &row.allocation_transfer_agency,
                    &row.agency_identifier,
                    &row.beginning_period_of_availa,
                    &row.ending_period_of_availabil,
                    &row.availability_type_code,
                    &row.main_account_code,
                    &row.sub_account_code,
                )
                .display();
                Sf133Balance {
                    tas,
                    fiscal_year,
                    period,
                    line_number: row.line_number,
                    amount: row.amount,
                    disaster_emergency_fund_code: normalize_defc(
                        &row.disaster_emergency_fund_code,
                    ),
                }
            })
            .collect();

        debug!(
            fiscal_year,
            period,
            kept = balances.len(),
            dropped = total - balances.len(),
            "sf-133 period parsed"
        );

        let previous = store.sf133().rows(fiscal_year, period).len();
        let inserted = balances.len();
        store.sf133_mut().set_period(fiscal_year, period, balances);
        Ok(DiffCounts {
            inserted,
            deactivated: previous,
            ..DiffCounts::default()
        })
    }
}
