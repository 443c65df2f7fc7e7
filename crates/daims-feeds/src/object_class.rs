//! OMB object classes: a two-column CSV of three-digit codes.

use daims_model::reference::ObjectClass;
use daims_reference::diff::{DiffCounts, diff_rows};
use daims_reference::error::Result;
use daims_reference::loader::{FeedLoader, FetchedArtifact};
use daims_reference::store::ReferenceStore;
use daims_reference::tables::read_csv;

#[derive(Debug, Default)]
pub struct ObjectClassLoader;

impl ObjectClassLoader {
    pub fn new() -> Self {
        Self
    }
}

impl FeedLoader for ObjectClassLoader {
    fn feed_key(&self) -> &'static str {
        "object_classes"
    }

    fn apply(&self, store: &mut ReferenceStore, artifact: &FetchedArtifact) -> Result<DiffCounts> {
        let incoming: Vec<ObjectClass> = read_csv(&artifact.local_path)?;
        let current: Vec<ObjectClass> = store.object_classes().cloned().collect();
        let counts = diff_rows(&current, &incoming).counts();
        store.set_object_classes(incoming);
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
    fn codes_load_and_four_digit_lookups_normalize() {
        let body = "code,name\n254,Research contracts\n410,Grants\n";
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        let counts = ObjectClassLoader::new()
            .apply(&mut store, &artifact(&dir, "object_classes.csv", body))
            .unwrap();

        assert_eq!(counts.inserted, 2);
        assert!(store.object_class_exists("254"));
        assert!(store.object_class_exists("0254"));
        assert!(!store.object_class_exists("2540"));
    }
}
