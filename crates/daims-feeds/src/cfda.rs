//! Assistance listings (the CFDA catalog).
//!
//! The upstream extract is SOAP-flavored XML: repeated program elements
//! whose children carry the number, title, and the published/archived
//! dates. Children are matched by local name so namespace prefixes on the
//! envelope do not matter.
//!
//! Programs that vanish from an extract are kept: `archived_date` is the
//! authoritative end of life, and dropping the row would turn every award
//! that cited it into a false reference failure.

use quick_xml::Reader;
use quick_xml::events::Event;

use daims_model::reference::AssistanceListing;
use daims_reference::diff::{DiffCounts, diff_rows};
use daims_reference::error::{ReferenceError, Result};
use daims_reference::loader::{FeedLoader, FetchedArtifact, read_artifact_text};
use daims_reference::store::ReferenceStore;

use crate::dates::parse_feed_date;

#[derive(Debug, Default)]
struct ProgramBuilder {
    program_number: Option<String>,
    program_title: Option<String>,
    published_date: Option<String>,
    archived_date: Option<String>,
}

impl ProgramBuilder {
    fn finish(self) -> Option<AssistanceListing> {
        let number = self.program_number?.trim().to_string();
        if number.is_empty() {
            return None;
        }
        Some(AssistanceListing {
            program_number: number,
            program_title: self.program_title.unwrap_or_default().trim().to_string(),
            published_date: self.published_date.as_deref().and_then(parse_feed_date),
            archived_date: self.archived_date.as_deref().and_then(parse_feed_date),
        })
    }
}

fn parse_programs(xml: &str, artifact: &FetchedArtifact) -> Result<Vec<AssistanceListing>> {
    let bad_xml = |message: String| ReferenceError::Parse {
        path: artifact.local_path.clone(),
        message,
    };

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut listings = Vec::new();
    let mut program: Option<ProgramBuilder> = None;
    let mut field: Option<&'static str> = None;

    loop {
        match reader.read_event().map_err(|e| bad_xml(e.to_string()))? {
            Event::Start(start) => match start.local_name().as_ref() {
                b"assistanceListing" | b"program" => {
                    program = Some(ProgramBuilder::default());
                }
                b"programNumber" => field = Some("number"),
                b"programTitle" => field = Some("title"),
                b"publishedDate" => field = Some("published"),
                b"archivedDate" => field = Some("archived"),
                _ => field = None,
            },
            Event::Text(text) => {
                if let Some(builder) = program.as_mut()
                    && let Some(field) = field
                {
                    let value = text.unescape().map_err(|e| bad_xml(e.to_string()))?;
                    let value = value.into_owned();
                    match field {
                        "number" => builder.program_number = Some(value),
                        "title" => builder.program_title = Some(value),
                        "published" => builder.published_date = Some(value),
                        _ => builder.archived_date = Some(value),
                    }
                }
            }
            Event::End(end) => {
                if matches!(end.local_name().as_ref(), b"assistanceListing" | b"program")
                    && let Some(builder) = program.take()
                {
                    listings.extend(builder.finish());
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if listings.is_empty() {
        return Err(bad_xml("no assistance listings in extract".to_string()));
    }
    Ok(listings)
}

#[derive(Debug, Default)]
pub struct AssistanceListingLoader;

impl AssistanceListingLoader {
    pub fn new() -> Self {
        Self
    }
}

impl FeedLoader for AssistanceListingLoader {
    fn feed_key(&self) -> &'static str {
        "assistance_listings"
    }

    fn apply(&self, store: &mut ReferenceStore, artifact: &FetchedArtifact) -> Result<DiffCounts> {
        let xml = read_artifact_text(artifact)?;
        let incoming = parse_programs(&xml, artifact)?;

        let current: Vec<AssistanceListing> = store.assistance_listings().cloned().collect();
        let diff = diff_rows(&current, &incoming);
        // vanished programs stay: archived_date is the end of life
        let counts = DiffCounts {
            deactivated: 0,
            ..diff.counts()
        };
        for listing in diff.inserts.into_iter().chain(diff.updates) {
            store.upsert_assistance_listing(listing);
        }
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

    const EXTRACT: &str = r#"<?xml version="1.0"?>
        <soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
          <soap:Body>
            <ns1:getProgramsResponse xmlns:ns1="http://cfda.example/">
              <ns1:assistanceListing>
                <ns1:programNumber>12.340</ns1:programNumber>
                <ns1:programTitle>Basic research</ns1:programTitle>
                <ns1:publishedDate>2013-04-27</ns1:publishedDate>
                <ns1:archivedDate>2013-12-31</ns1:archivedDate>
              </ns1:assistanceListing>
              <ns1:assistanceListing>
                <ns1:programNumber>10.001</ns1:programNumber>
                <ns1:programTitle>Agricultural research</ns1:programTitle>
                <ns1:publishedDate>2005-01-10</ns1:publishedDate>
              </ns1:assistanceListing>
            </ns1:getProgramsResponse>
          </soap:Body>
        </soap:Envelope>"#;

    #[test]
    fn soap_extract_parses_through_namespace_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        let counts = AssistanceListingLoader::new()
            .apply(&mut store, &artifact(&dir, "programs.xml", EXTRACT))
            .unwrap();

        assert_eq!(counts.inserted, 2);
        let listing = store.assistance_listing("12.340").unwrap();
        assert_eq!(listing.program_title, "Basic research");
        assert_eq!(
            listing.archived_date,
            chrono::NaiveDate::from_ymd_opt(2013, 12, 31)
        );
        assert!(store.assistance_listing("10.001").unwrap().archived_date.is_none());
    }

    #[test]
    fn vanished_programs_are_retained() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        let loader = AssistanceListingLoader::new();
        loader
            .apply(&mut store, &artifact(&dir, "full.xml", EXTRACT))
            .unwrap();

        let shrunk = r#"<programs>
            <program>
              <programNumber>10.001</programNumber>
              <programTitle>Agricultural research</programTitle>
              <publishedDate>2005-01-10</publishedDate>
            </program>
          </programs>"#;
        let counts = loader
            .apply(&mut store, &artifact(&dir, "shrunk.xml", shrunk))
            .unwrap();

        assert_eq!(counts.deactivated, 0);
        assert_eq!(counts.unchanged, 1);
        // 12.340 no longer in the extract but still resolvable
        assert!(store.assistance_listing("12.340").is_some());
    }

    #[test]
    fn extract_without_programs_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        let err = AssistanceListingLoader::new()
            .apply(&mut store, &artifact(&dir, "empty.xml", "<programs/>"))
            .unwrap_err();
        assert!(matches!(err, ReferenceError::Parse { .. }));
    }
}
