//! CGAC, FREC, and sub-tier agencies.
//!
//! One flat CSV carries all three levels, one row per sub-tier with its
//! CGAC and optional FREC repeated on every row. The top-tier tables are
//! deduplicated keep-first, which matches how the source file repeats the
//! names.

use serde::Deserialize;

use daims_model::reference::{CgacAgency, FrecAgency, SubTierAgency};
use daims_reference::diff::{DiffCounts, diff_rows};
use daims_reference::error::Result;
use daims_reference::loader::{FeedLoader, FetchedArtifact};
use daims_reference::store::ReferenceStore;
use daims_reference::tables::read_csv;

#[derive(Debug, Deserialize)]
struct AgencyFeedRow {
    cgac_code: String,
    #[serde(default)]
    cgac_name: String,
    #[serde(default)]
    frec_code: String,
    #[serde(default)]
    frec_name: String,
    sub_tier_code: String,
    #[serde(default)]
    sub_tier_name: String,
    #[serde(default)]
    is_frec: String,
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1")
}

#[derive(Debug, Default)]
pub struct AgencyLoader;

impl AgencyLoader {
    pub fn new() -> Self {
        Self
    }
}

impl FeedLoader for AgencyLoader {
    fn feed_key(&self) -> &'static str {
        "agencies"
    }

    fn apply(&self, store: &mut ReferenceStore, artifact: &FetchedArtifact) -> Result<DiffCounts> {
        let rows: Vec<AgencyFeedRow> = read_csv(&artifact.local_path)?;

        let mut cgac: Vec<CgacAgency> = Vec::new();
        let mut frec: Vec<FrecAgency> = Vec::new();
        let mut sub_tier: Vec<SubTierAgency> = Vec::new();

        for row in rows {
            let cgac_code = row.cgac_code.trim().to_string();
            let frec_code = {
                let trimmed = row.frec_code.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            };

            if !cgac_code.is_empty() && !cgac.iter().any(|a| a.cgac_code == cgac_code) {
                cgac.push(CgacAgency {
                    cgac_code: cgac_code.clone(),
                    agency_name: row.cgac_name.trim().to_string(),
                });
            }
            if let Some(code) = &frec_code
                && !frec.iter().any(|a| &a.frec_code == code)
            {
                frec.push(FrecAgency {
                    frec_code: code.clone(),
                    cgac_code: cgac_code.clone(),
                    agency_name: row.frec_name.trim().to_string(),
                });
            }

            let sub_tier_code = row.sub_tier_code.trim().to_string();
            if sub_tier_code.is_empty() {
                continue;
            }
            sub_tier.push(SubTierAgency {
                sub_tier_code,
                sub_tier_name: row.sub_tier_name.trim().to_string(),
                cgac_code,
                frec_code,
                is_frec: parse_flag(&row.is_frec),
            });
        }

        let mut counts = diff_rows(
            &store.cgac_agencies().cloned().collect::<Vec<_>>(),
            &cgac,
        )
        .counts();
        counts.merge(
            diff_rows(&store.frec_agencies().cloned().collect::<Vec<_>>(), &frec).counts(),
        );
        counts.merge(
            diff_rows(
                &store.sub_tier_agencies().cloned().collect::<Vec<_>>(),
                &sub_tier,
            )
            .counts(),
        );

        store.set_agencies(cgac, frec, sub_tier);
        Ok(counts)
    }
}
