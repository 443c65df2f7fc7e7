//! GENC country codes.
//!
//! The standard ships as XML, one entity element per geopolitical entity
//! with the three-letter code and short name as children. U.S. territories
//! keep their GENC entries but submissions must report them as USA plus a
//! state code, so those nine get the `territory_free_state` flag.

use quick_xml::Reader;
use quick_xml::events::Event;

use daims_model::reference::CountryCode;
use daims_reference::diff::{DiffCounts, diff_rows};
use daims_reference::error::{ReferenceError, Result};
use daims_reference::loader::{FeedLoader, FetchedArtifact, read_artifact_text};
use daims_reference::store::ReferenceStore;

const TERRITORIES: [&str; 9] = [
    "ASM", "FSM", "GUM", "MHL", "MNP", "PLW", "PRI", "UMI", "VIR",
];

fn is_territory(code: &str) -> bool {
    TERRITORIES.contains(&code)
}

fn parse_countries(xml: &str, artifact: &FetchedArtifact) -> Result<Vec<CountryCode>> {
    let bad_xml = |message: String| ReferenceError::Parse {
        path: artifact.local_path.clone(),
        message,
    };

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut countries = Vec::new();
    let mut code: Option<String> = None;
    let mut name: Option<String> = None;
    let mut field: Option<&'static str> = None;

    loop {
        match reader.read_event().map_err(|e| bad_xml(e.to_string()))? {
            Event::Start(start) => match start.local_name().as_ref() {
                b"entity" | b"country" => {
                    code = None;
                    name = None;
                }
                b"code" | b"char3Code" => field = Some("code"),
                b"name" | b"shortName" => field = Some("name"),
                _ => field = None,
            },
            Event::Text(text) => {
                let value = text.unescape().map_err(|e| bad_xml(e.to_string()))?;
                match field {
                    Some("code") => code = Some(value.trim().to_ascii_uppercase()),
                    Some("name") => name = Some(value.trim().to_string()),
                    _ => {}
                }
            }
            Event::End(end) => {
                if matches!(end.local_name().as_ref(), b"entity" | b"country")
                    && let Some(code) = code.take()
                    && !code.is_empty()
                {
                    countries.push(CountryCode {
                        territory_free_state: is_territory(&code),
                        country_code: code,
                        country_name: name.take().unwrap_or_default(),
                    });
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if countries.is_empty() {
        return Err(bad_xml("no entities in GENC extract".to_string()));
    }
    Ok(countries)
}

#[derive(Debug, Default)]
pub struct CountryLoader;

impl CountryLoader {
    pub fn new() -> Self {
        Self
    }
}

impl FeedLoader for CountryLoader {
    fn feed_key(&self) -> &'static str {
        "countries"
    }

    fn apply(&self, store: &mut ReferenceStore, artifact: &FetchedArtifact) -> Result<DiffCounts> {
        let xml = read_artifact_text(artifact)?;
        let incoming = parse_countries(&xml, artifact)?;

        let current: Vec<CountryCode> = store.countries().cloned().collect();
        let counts = diff_rows(&current, &incoming).counts();
        store.set_countries(incoming);
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

    const EXTRACT: &str = r#"<genc:GENCStandardBaseline xmlns:genc="http://api.nsgreg.nga.mil/schema/genc/3.0">
        <genc:entity>
          <genc:char3Code>USA</genc:char3Code>
          <genc:shortName>UNITED STATES</genc:shortName>
        </genc:entity>
        <genc:entity>
          <genc:char3Code>ASM</genc:char3Code>
          <genc:shortName>AMERICAN SAMOA</genc:shortName>
        </genc:entity>
        <genc:entity>
          <genc:char3Code>can</genc:char3Code>
          <genc:shortName>CANADA</genc:shortName>
        </genc:entity>
      </genc:GENCStandardBaseline>"#;

    #[test]
    fn entities_parse_and_territories_are_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        let counts = CountryLoader::new()
            .apply(&mut store, &artifact(&dir, "genc.xml", EXTRACT))
            .unwrap();

        assert_eq!(counts.inserted, 3);
        assert!(!store.country("USA").unwrap().territory_free_state);
        assert!(store.country("ASM").unwrap().territory_free_state);
        // codes are normalized to upper case on the way in
        assert_eq!(store.country("CAN").unwrap().country_name, "CANADA");
    }

    #[test]
    fn reload_counts_only_what_changed() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        let loader = CountryLoader::new();
        loader
            .apply(&mut store, &artifact(&dir, "genc.xml", EXTRACT))
            .unwrap();
        let counts = loader
            .apply(&mut store, &artifact(&dir, "genc2.xml", EXTRACT))
            .unwrap();
        assert_eq!(counts.changed(), 0);
        assert_eq!(counts.unchanged, 3);
    }

    #[test]
    fn extract_without_entities_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        let err = CountryLoader::new()
            .apply(&mut store, &artifact(&dir, "genc.xml", "<baseline/>"))
            .unwrap_err();
        assert!(matches!(err, ReferenceError::Parse { .. }));
    }
}
