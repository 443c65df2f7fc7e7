//! Treasury account symbols from the central accounting extract.
//!
//! The feed carries components and the row-currency window but no
//! surrogate; `account_num` is assigned by the store and survives
//! reloads, so anything keyed on it stays stable when the extract is
//! refreshed.

use serde::Deserialize;

use daims_model::reference::TasAccount;
use daims_model::tas::TasComponents;
use daims_reference::diff::{DiffCounts, diff_rows};
use daims_reference::error::{ReferenceError, Result};
use daims_reference::loader::{FeedLoader, FetchedArtifact};
use daims_reference::store::ReferenceStore;
use daims_reference::tables::read_csv;

use crate::dates::parse_feed_date;

#[derive(Debug, Deserialize)]
struct TasFeedRow {
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
    #[serde(default)]
    internal_start_date: String,
    #[serde(default)]
    internal_end_date: String,
}

fn parse_window_date(
    raw: &str,
    artifact: &FetchedArtifact,
) -> Result<Option<chrono::NaiveDate>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    parse_feed_date(trimmed).map(Some).ok_or_else(|| {
        ReferenceError::Parse {
            path: artifact.local_path.clone(),
            message: format!("bad internal date {trimmed:?}"),
        }
    })
}

#[derive(Debug, Default)]
pub struct TasLoader;

impl TasLoader {
    pub fn new() -> Self {
        Self
    }
}

impl FeedLoader for TasLoader {
    fn feed_key(&self) -> &'static str {
        "tas"
    }

    fn apply(&self, store: &mut ReferenceStore, artifact: &FetchedArtifact) -> Result<DiffCounts> {
        let rows: Vec<TasFeedRow> = read_csv(&artifact.local_path)?;
        let incoming = rows
            .into_iter()
            .map(|row| {
                Ok(TasAccount {
                    account_num: 0,
                    components: TasComponents::from_submitted(
                        &row.allocation_transfer_agency,
                        &row.agency_identifier,
                        &row.beginning_period_of_availa,
                        &row.ending_period_of_availabil,
                        &row.availability_type_code,
                        &row.main_account_code,
                        &row.sub_account_code,
                    ),
                    internal_start_date: parse_window_date(&row.internal_start_date, artifact)?,
                    internal_end_date: parse_window_date(&row.internal_end_date, artifact)?,
                })
            })
            .collect::<Result<Vec<TasAccount>>>()?;

        let counts = diff_rows(store.tas_accounts(), &incoming).counts();
        store.set_tas_accounts(incoming);
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daims_reference::hash::sha256_hex;
    use daims_reference::loader::ArtifactRef;

    fn artifact(dir: &tempfile::TempDir, name: &str, body: &str) -> FetchedArtifact {
        let local_path = dir.path().join(name);
        std::fs::write(&local_path, body).unwrap();
        FetchedArtifact {
            reference: ArtifactRef {
                name: name.to_string(),
                updated: None,
            },
            local_path,
            sha256: sha256_hex(body.as_bytes()),
        }
    }

    const HEADER: &str = "allocation_transfer_agency,agency_identifier,\
                          beginning_period_of_availa,ending_period_of_availabil,\
                          availability_type_code,main_account_code,sub_account_code,\
                          internal_start_date,internal_end_date";

    #[test]
    fn surrogates_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        let loader = TasLoader::new();

        let body = format!("{HEADER}\n,097,2016,2017,,0804,001,2015-10-01,\n");
        loader
            .apply(&mut store, &artifact(&dir, "tas.csv", &body))
            .unwrap();
        let first_num = store.tas_accounts()[0].account_num;
        assert_ne!(first_num, 0);

        let body = format!(
            "{HEADER}\n,097,2016,2017,,0804,001,2015-10-01,\n,020,,,X,0550,000,,\n"
        );
        let counts = loader
            .apply(&mut store, &artifact(&dir, "tas.csv", &body))
            .unwrap();
        assert_eq!(counts.inserted, 1);
        assert_eq!(counts.unchanged, 1);

        let kept = store
            .tas_accounts()
            .iter()
            .find(|row| row.components.agency_identifier == "097")
            .unwrap();
        assert_eq!(kept.account_num, first_num);
    }

    #[test]
    fn malformed_window_date_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        let body = format!("{HEADER}\n,097,2016,2017,,0804,001,October 2015,\n");
        let err = TasLoader::new()
            .apply(&mut store, &artifact(&dir, "tas.csv", &body))
            .unwrap_err();
        assert!(matches!(err, ReferenceError::Parse { .. }));
    }
}
