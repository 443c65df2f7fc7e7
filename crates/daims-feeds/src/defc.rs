//! Disaster and emergency fund codes.
//!
//! The feed is a small CSV of code, group, and `;`-joined public-law
//! citations. Short titles and enactment dates come from a public-law
//! source (govinfo in production); the earliest enactment date is kept so
//! rules can bound when a code could first legitimately appear. Two codes
//! never arrive on the feed but must resolve for error messages: the
//! retired `9` and the GTAS placeholder `QQQ`, both carried as invalid.

use chrono::NaiveDate;
use serde::Deserialize;

use daims_model::reference::{DefcCode, DefcGroup};
use daims_reference::diff::{DiffCounts, diff_rows};
use daims_reference::error::{ReferenceError, Result};
use daims_reference::loader::{FeedLoader, FetchedArtifact};
use daims_reference::store::ReferenceStore;
use daims_reference::tables::read_csv;

/// Resolved public-law metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicLawInfo {
    pub short_title: String,
    pub enactment_date: Option<NaiveDate>,
}

/// Looks up a public-law citation (`117-2` style). The production source
/// is the govinfo bulk API; tests and offline runs substitute their own.
pub trait PublicLawSource {
    fn resolve(&self, citation: &str) -> Result<Option<PublicLawInfo>>;
}

/// Leaves every citation unresolved; titles fall back to the citation
/// text.
#[derive(Debug, Default)]
pub struct NoPublicLaws;

impl PublicLawSource for NoPublicLaws {
    fn resolve(&self, _citation: &str) -> Result<Option<PublicLawInfo>> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct DefcFeedRow {
    code: String,
    #[serde(default)]
    group: String,
    #[serde(default)]
    public_laws: String,
}

fn parse_group(raw: &str, artifact: &FetchedArtifact) -> Result<Option<DefcGroup>> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "covid" => Ok(Some(DefcGroup::Covid)),
        "infrastructure" => Ok(Some(DefcGroup::Infrastructure)),
        other => Err(ReferenceError::Parse {
            path: artifact.local_path.clone(),
            message: format!("unknown DEFC group {other:?}"),
        }),
    }
}

fn placeholder_codes() -> Vec<DefcCode> {
    let bare = |code: &str| DefcCode {
        code: code.to_string(),
        group: None,
        public_laws: Vec::new(),
        public_law_titles: Vec::new(),
        earliest_public_law_enactment: None,
        is_valid: false,
    };
    vec![bare("9"), bare("QQQ")]
}

pub struct DefcLoader {
    laws: Box<dyn PublicLawSource>,
}

impl DefcLoader {
    pub fn new(laws: Box<dyn PublicLawSource>) -> Self {
        Self { laws }
    }

    /// No public-law resolution; titles echo the citations.
    pub fn offline() -> Self {
        Self::new(Box::new(NoPublicLaws))
    }

    fn build_code(&self, row: DefcFeedRow, artifact: &FetchedArtifact) -> Result<DefcCode> {
        let group = parse_group(&row.group, artifact)?;
        let citations: Vec<String> = row
            .public_laws
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let mut titles = Vec::with_capacity(citations.len());
        let mut earliest: Option<NaiveDate> = None;
        for citation in &citations {
            match self.laws.resolve(citation)? {
                Some(info) => {
                    titles.push(info.short_title);
                    earliest = match (earliest, info.enactment_date) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    };
                }
                None => titles.push(citation.clone()),
            }
        }

        Ok(DefcCode {
            code: row.code.trim().to_ascii_uppercase(),
            group,
            public_laws: citations,
            public_law_titles: titles,
            earliest_public_law_enactment: earliest,
            is_valid: true,
        })
    }
}

impl FeedLoader for DefcLoader {
    fn feed_key(&self) -> &'static str {
        "defc"
    }

    fn apply(&self, store: &mut ReferenceStore, artifact: &FetchedArtifact) -> Result<DiffCounts> {
        let rows: Vec<DefcFeedRow> = read_csv(&artifact.local_path)?;
        let mut codes = rows
            .into_iter()
            .map(|row| self.build_code(row, artifact))
            .collect::<Result<Vec<DefcCode>>>()?;
        for placeholder in placeholder_codes() {
            if !codes.iter().any(|c| c.code == placeholder.code) {
                codes.push(placeholder);
            }
        }

        let current: Vec<DefcCode> = store.defc_codes().cloned().collect();
        let counts = diff_rows(&current, &codes).counts();
        store.set_defc(codes);
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use daims_reference::hash::sha256_hex;
    use daims_reference::loader::ArtifactRef;

    struct FixedLaws(HashMap<&'static str, PublicLawInfo>);

    impl PublicLawSource for FixedLaws {
        fn resolve(&self, citation: &str) -> Result<Option<PublicLawInfo>> {
            Ok(self.0.get(citation).cloned())
        }
    }

    fn law(title: &str, date: (i32, u32, u32)) -> PublicLawInfo {
        PublicLawInfo {
            short_title: title.to_string(),
            enactment_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
        }
    }

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
    fn codes_resolve_laws_and_keep_the_earliest_enactment() {
        let laws = FixedLaws(HashMap::from([
            ("116-136", law("CARES Act", (2020, 3, 27))),
            ("116-123", law("Coronavirus Preparedness Act", (2020, 3, 6))),
        ]));
        let body = "code,group,public_laws\n\
                    L,covid,116-123;116-136\n\
                    A,,\n";

        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        DefcLoader::new(Box::new(laws))
            .apply(&mut store, &artifact(&dir, "defc.csv", body))
            .unwrap();

        let l = store.defc("L").unwrap();
        assert_eq!(l.group, Some(DefcGroup::Covid));
        assert_eq!(
            l.public_law_titles,
            vec!["Coronavirus Preparedness Act", "CARES Act"]
        );
        assert_eq!(
            l.earliest_public_law_enactment,
            NaiveDate::from_ymd_opt(2020, 3, 6)
        );
        assert!(l.is_valid);
        assert!(store.defc("A").unwrap().public_laws.is_empty());
    }

    #[test]
    fn retired_and_placeholder_codes_resolve_as_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        DefcLoader::offline()
            .apply(&mut store, &artifact(&dir, "defc.csv", "code,group,public_laws\nQ,,\n"))
            .unwrap();

        assert!(store.defc("Q").unwrap().is_valid);
        assert!(!store.defc("9").unwrap().is_valid);
        assert!(!store.defc("QQQ").unwrap().is_valid);
    }

    #[test]
    fn unresolved_citations_fall_back_to_the_citation_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        DefcLoader::offline()
            .apply(
                &mut store,
                &artifact(&dir, "defc.csv", "code,group,public_laws\nZ,infrastructure,117-58\n"),
            )
            .unwrap();

        let z = store.defc("Z").unwrap();
        assert_eq!(z.public_law_titles, vec!["117-58"]);
        assert_eq!(z.earliest_public_law_enactment, None);
    }

    #[test]
    fn unknown_group_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        let err = DefcLoader::offline()
            .apply(
                &mut store,
                &artifact(&dir, "defc.csv", "code,group,public_laws\nB,wildfire,\n"),
            )
            .unwrap_err();
        assert!(matches!(err, ReferenceError::Parse { .. }));
    }
}
