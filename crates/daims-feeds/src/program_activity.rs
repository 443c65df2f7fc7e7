//! Program activity codes and names, fiscal-year scoped per agency.
//!
//! The lookup the rules run is over the full (year, agency, code, name)
//! tuple, case-insensitively; the store indexes that tuple at load time.

use daims_model::reference::ProgramActivity;
use daims_reference::diff::{DiffCounts, diff_rows};
use daims_reference::error::Result;
use daims_reference::loader::{FeedLoader, FetchedArtifact};
use daims_reference::store::ReferenceStore;
use daims_reference::tables::read_csv;

#[derive(Debug, Default)]
pub struct ProgramActivityLoader;

impl ProgramActivityLoader {
    pub fn new() -> Self {
        Self
    }
}

impl FeedLoader for ProgramActivityLoader {
    fn feed_key(&self) -> &'static str {
        "program_activity"
    }

    fn apply(&self, store: &mut ReferenceStore, artifact: &FetchedArtifact) -> Result<DiffCounts> {
        let incoming: Vec<ProgramActivity> = read_csv(&artifact.local_path)?;
        let counts = diff_rows(store.program_activities(), &incoming).counts();
        store.set_program_activity(incoming);
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

    #[test]
    fn lookups_are_case_insensitive_over_the_whole_tuple() {
        let body = "fiscal_year,agency_identifier,program_activity_code,program_activity_name\n\
                    2024,097,0001,Operations And Maintenance\n";
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        ProgramActivityLoader::new()
            .apply(&mut store, &artifact(&dir, "program_activity.csv", body))
            .unwrap();

        assert!(store.has_program_activity(2024, "097", "0001", "OPERATIONS AND MAINTENANCE"));
        assert!(!store.has_program_activity(2023, "097", "0001", "Operations And Maintenance"));
        assert!(!store.has_program_activity(2024, "097", "0002", "Operations And Maintenance"));
    }
}
