//! Submission windows: open, due, and certification dates per fiscal
//! period. Dates are ISO in the feed and deserialize straight into the
//! dimension row.

use daims_model::reference::SubmissionWindow;
use daims_reference::diff::{DiffCounts, diff_rows};
use daims_reference::error::Result;
use daims_reference::loader::{FeedLoader, FetchedArtifact};
use daims_reference::store::ReferenceStore;
use daims_reference::tables::read_csv;

#[derive(Debug, Default)]
pub struct SubmissionWindowLoader;

impl SubmissionWindowLoader {
    pub fn new() -> Self {
        Self
    }
}

impl FeedLoader for SubmissionWindowLoader {
    fn feed_key(&self) -> &'static str {
        "submission_windows"
    }

    fn apply(&self, store: &mut ReferenceStore, artifact: &FetchedArtifact) -> Result<DiffCounts> {
        let incoming: Vec<SubmissionWindow> = read_csv(&artifact.local_path)?;
        let current: Vec<SubmissionWindow> = store.submission_windows().cloned().collect();
        let counts = diff_rows(&current, &incoming).counts();
        store.set_submission_windows(incoming);
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
    fn windows_load_and_resolve_by_period() {
        let body = "\
fiscal_year,fiscal_period,open_date,submission_due_date,certification_due_date
2024,6,2024-04-01,2024-05-16,2024-05-31
2024,9,2024-07-01,2024-08-15,2024-08-30
";
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        let counts = SubmissionWindowLoader::new()
            .apply(&mut store, &artifact(&dir, "windows.csv", body))
            .unwrap();

        assert_eq!(counts.inserted, 2);
        let window = store.submission_window(2024, 6).unwrap();
        assert_eq!(window.open_date.to_string(), "2024-04-01");
        assert!(store.submission_window(2024, 7).is_none());
    }
}
