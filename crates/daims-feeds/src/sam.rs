//! SAM recipient extracts.
//!
//! Extract files are pipe-delimited `.dat` files framed by `BOF`/`EOF`
//! lines. Daily deltas tag each record `A`/`E`/`2`/`3` (upsert) or `1`
//! (delete); monthly extracts may leave the tag blank, which reads as an
//! upsert. Within a monthly file the first occurrence of a key wins,
//! within a daily file the last. V1 extracts key rows by legacy DUNS, V2
//! by UEI; an upsert never overwrites either identifier with null.

use chrono::NaiveDate;
use tracing::debug;

use daims_model::reference::{ExecutiveCompensation, SamRecipient};
use daims_reference::diff::DiffCounts;
use daims_reference::error::{ReferenceError, Result};
use daims_reference::loader::{FeedLoader, FetchedArtifact, read_artifact_text};
use daims_reference::store::ReferenceStore;
use daims_reference::tables;

use crate::dates::parse_feed_date;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cadence {
    Monthly,
    Daily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    V1,
    V2,
}

#[derive(Debug, Clone, Copy)]
struct ExtractKind {
    cadence: Cadence,
    version: Version,
    file_date: NaiveDate,
}

/// Reads cadence, layout version, and file date out of an extract name
/// like `SAM_PUBLIC_MONTHLY_V2_20170101.dat`.
fn classify(artifact: &FetchedArtifact) -> Result<ExtractKind> {
    let upper = artifact.reference.name.to_ascii_uppercase();
    let cadence = if upper.contains("MONTHLY") {
        Cadence::Monthly
    } else if upper.contains("DAILY") {
        Cadence::Daily
    } else {
        return Err(parse_error(artifact, "name carries neither MONTHLY nor DAILY"));
    };
    let version = if upper.contains("V2") {
        Version::V2
    } else if upper.contains("V1") {
        Version::V1
    } else {
        return Err(parse_error(artifact, "name carries neither V1 nor V2"));
    };
    let file_date = digits_run(&upper, 8)
        .and_then(|run| NaiveDate::parse_from_str(&run, "%Y%m%d").ok())
        .ok_or_else(|| parse_error(artifact, "name carries no YYYYMMDD file date"))?;
    Ok(ExtractKind {
        cadence,
        version,
        file_date,
    })
}

/// First run of exactly `len` consecutive digits.
fn digits_run(text: &str, len: usize) -> Option<String> {
    let bytes = text.as_bytes();
    let mut start = None;
    for (index, byte) in bytes.iter().enumerate() {
        if byte.is_ascii_digit() {
            let from = *start.get_or_insert(index);
            if index + 1 - from == len
                && bytes.get(index + 1).is_none_or(|b| !b.is_ascii_digit())
            {
                return Some(text[from..=index].to_string());
            }
        } else {
            start = None;
        }
    }
    None
}

fn parse_error(artifact: &FetchedArtifact, message: &str) -> ReferenceError {
    ReferenceError::Parse {
        path: artifact.local_path.clone(),
        message: message.to_string(),
    }
}

#[derive(Debug)]
enum Action {
    Upsert(Box<SamRecipient>),
    Delete { uei: Option<String>, duns: Option<String> },
}

/// One parsed record line plus its dedupe key.
struct Line {
    key: String,
    action: Action,
}

fn parse_line(raw: &str, version: Version) -> Option<Line> {
    let fields: Vec<&str> = raw.split('|').collect();
    let get = |index: usize| fields.get(index).map_or("", |f| f.trim());
    let opt = |index: usize| {
        let value = get(index);
        (!value.is_empty()).then(|| value.to_string())
    };

    let flag = get(0);
    // V1 extracts predate the UEI; their identifier column is the DUNS
    let (uei, duns, base) = match version {
        Version::V2 => (opt(1), opt(2), 3usize),
        Version::V1 => (None, opt(1), 2usize),
    };
    let key = uei
        .clone()
        .or_else(|| duns.clone())?
        .to_ascii_uppercase();

    match flag {
        "1" => Some(Line {
            key,
            action: Action::Delete { uei, duns },
        }),
        "" | "A" | "E" | "2" | "3" => {
            let business_types_codes = opt(base + 13)
                .map(|joined| {
                    joined
                        .split('~')
                        .map(str::trim)
                        .filter(|code| !code.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            // V1 extracts have no parent-UEI column, so the tail shifts
            let (parent_uei, parent_duns, parent_name, exec_index) = match version {
                Version::V2 => (opt(base + 14), opt(base + 15), opt(base + 16), base + 17),
                Version::V1 => (None, opt(base + 14), opt(base + 15), base + 16),
            };
            let executive_compensation = parse_executive_compensation(get(exec_index));

            let recipient = SamRecipient {
                uei,
                awardee_or_recipient_uniqu: duns,
                legal_business_name: get(base).to_string(),
                dba_name: opt(base + 1),
                registration_date: parse_feed_date(get(base + 2)),
                activation_date: parse_feed_date(get(base + 3)),
                expiration_date: parse_feed_date(get(base + 4)),
                deactivation_date: None,
                ultimate_parent_uei: parent_uei,
                ultimate_parent_unique_ide: parent_duns,
                ultimate_parent_legal_enti: parent_name,
                address_line_1: opt(base + 5),
                address_line_2: opt(base + 6),
                city: opt(base + 7),
                state: opt(base + 8),
                zip: opt(base + 9),
                zip4: opt(base + 10),
                congressional_district: opt(base + 11),
                country_code: opt(base + 12),
                business_types_codes,
                executive_compensation,
                historic: false,
            };
            Some(Line {
                key,
                action: Action::Upsert(Box::new(recipient)),
            })
        }
        other => {
            debug!(flag = other, "unknown SAM record flag, skipping row");
            None
        }
    }
}

/// Up to five `name^amount` pairs joined by `~`.
fn parse_executive_compensation(raw: &str) -> Vec<ExecutiveCompensation> {
    raw.split('~')
        .filter(|pair| !pair.trim().is_empty())
        .take(5)
        .map(|pair| {
            let (name, amount) = pair.split_once('^').unwrap_or((pair, ""));
            ExecutiveCompensation {
                full_name: name.trim().to_string(),
                amount: amount.trim().parse().ok(),
            }
        })
        .collect()
}

/// Loader for the registered-recipient extracts.
#[derive(Debug, Default)]
pub struct SamRecipientLoader;

impl FeedLoader for SamRecipientLoader {
    fn feed_key(&self) -> &'static str {
        "sam"
    }

    fn apply(&self, store: &mut ReferenceStore, artifact: &FetchedArtifact) -> Result<DiffCounts> {
        let kind = classify(artifact)?;
        let body = read_artifact_text(artifact)?;

        let mut lines: Vec<Line> = Vec::new();
        let mut positions: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for raw in body.lines() {
            let trimmed = raw.trim_end_matches(['\r']);
            if trimmed.is_empty() || trimmed.starts_with("BOF") || trimmed.starts_with("EOF") {
                continue;
            }
            let Some(line) = parse_line(trimmed, kind.version) else {
                continue;
            };
            match positions.get(&line.key) {
                // monthly: first occurrence of a key wins; daily: last wins
                Some(_) if kind.cadence == Cadence::Monthly => {}
                Some(&at) => lines[at] = line,
                None => {
                    positions.insert(line.key.clone(), lines.len());
                    lines.push(line);
                }
            }
        }

        let mut counts = DiffCounts::default();
        let sam = store.sam_mut();
        for line in lines {
            match line.action {
                Action::Upsert(recipient) => {
                    if sam.upsert(*recipient) {
                        counts.inserted += 1;
                    } else {
                        counts.updated += 1;
                    }
                }
                Action::Delete { uei, duns } => {
                    if sam.deactivate(uei.as_deref(), duns.as_deref(), kind.file_date) {
                        counts.deactivated += 1;
                    } else {
                        debug!(key = line.key, "delete for unknown recipient, ignoring");
                    }
                }
            }
        }
        Ok(counts)
    }
}

/// Loader for the unregistered-entity endpoint: known to SAM but not
/// actively registered. Truncate and reload, no diff.
#[derive(Debug, Default)]
pub struct SamUnregisteredLoader;

impl FeedLoader for SamUnregisteredLoader {
    fn feed_key(&self) -> &'static str {
        "sam_unregistered"
    }

    fn apply(&self, store: &mut ReferenceStore, artifact: &FetchedArtifact) -> Result<DiffCounts> {
        let rows: Vec<SamRecipient> = tables::read_json(&artifact.local_path)?;
        let previous = store.sam_unregistered().len();
        let incoming = rows.len();
        store.replace_sam_unregistered(rows);
        Ok(DiffCounts {
            inserted: incoming,
            deactivated: previous,
            ..DiffCounts::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(dir: &tempfile::TempDir, name: &str, body: &str) -> FetchedArtifact {
        let local_path = dir.path().join(name);
        std::fs::write(&local_path, body).unwrap();
        FetchedArtifact {
            reference: daims_reference::loader::ArtifactRef {
                name: name.to_string(),
                updated: None,
            },
            local_path,
            sha256: daims_reference::hash::sha256_hex(body.as_bytes()),
        }
    }

    #[test]
    fn classifies_extract_names() {
        let dir = tempfile::tempdir().unwrap();
        let monthly = artifact(&dir, "SAM_PUBLIC_MONTHLY_V2_20170101.dat", "BOF\nEOF\n");
        let kind = classify(&monthly).unwrap();
        assert_eq!(kind.cadence, Cadence::Monthly);
        assert_eq!(kind.version, Version::V2);
        assert_eq!(
            kind.file_date,
            NaiveDate::from_ymd_opt(2017, 1, 1).unwrap()
        );

        let odd = artifact(&dir, "SAM_WEEKLY.dat", "");
        assert!(classify(&odd).is_err());
    }

    #[test]
    fn monthly_keeps_first_occurrence_daily_keeps_last() {
        let dir = tempfile::tempdir().unwrap();
        let monthly_body = "BOF PUBLIC\n\
            A|UEI000000001||FIRST NAME\n\
            A|UEI000000001||SECOND NAME\n\
            EOF\n";
        let mut store = ReferenceStore::new();
        SamRecipientLoader
            .apply(
                &mut store,
                &artifact(&dir, "SAM_PUBLIC_MONTHLY_V2_20170101.dat", monthly_body),
            )
            .unwrap();
        assert_eq!(
            store
                .sam()
                .recipient(Some("UEI000000001"), None)
                .unwrap()
                .legal_business_name,
            "FIRST NAME"
        );

        let daily_body = "BOF PUBLIC\n\
            E|UEI000000002||EARLY\n\
            E|UEI000000002||LATE\n\
            EOF\n";
        SamRecipientLoader
            .apply(
                &mut store,
                &artifact(&dir, "SAM_PUBLIC_DAILY_V2_20170102.dat", daily_body),
            )
            .unwrap();
        assert_eq!(
            store
                .sam()
                .recipient(Some("UEI000000002"), None)
                .unwrap()
                .legal_business_name,
            "LATE"
        );
    }

    #[test]
    fn v1_rows_key_by_duns_and_merge_without_nulling_uei() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();

        let v2 = "A|UEIAAAAAAAA1|123456789|ACME\n";
        SamRecipientLoader
            .apply(&mut store, &artifact(&dir, "SAM_DAILY_V2_20220101.dat", v2))
            .unwrap();

        // legacy-format update addressed by DUNS only
        let v1 = "E|123456789|ACME RENAMED\n";
        let counts = SamRecipientLoader
            .apply(&mut store, &artifact(&dir, "SAM_DAILY_V1_20220102.dat", v1))
            .unwrap();
        assert_eq!(counts.updated, 1);
        assert_eq!(counts.inserted, 0);

        let row = store.sam().recipient(Some("UEIAAAAAAAA1"), None).unwrap();
        assert_eq!(row.legal_business_name, "ACME RENAMED");
        assert_eq!(row.uei.as_deref(), Some("UEIAAAAAAAA1"));
        assert_eq!(row.awardee_or_recipient_uniqu.as_deref(), Some("123456789"));
    }

    #[test]
    fn delete_flag_deactivates_with_the_file_date() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        SamRecipientLoader
            .apply(
                &mut store,
                &artifact(&dir, "SAM_MONTHLY_V2_20170101.dat", "A|UEI000000003||GOING AWAY\n"),
            )
            .unwrap();

        let counts = SamRecipientLoader
            .apply(
                &mut store,
                &artifact(&dir, "SAM_DAILY_V2_20170215.dat", "1|UEI000000003||GOING AWAY\n"),
            )
            .unwrap();
        assert_eq!(counts.deactivated, 1);
        let row = store.sam().recipient(Some("UEI000000003"), None).unwrap();
        assert_eq!(
            row.deactivation_date,
            Some(NaiveDate::from_ymd_opt(2017, 2, 15).unwrap())
        );
    }

    #[test]
    fn rich_rows_carry_address_types_and_compensation() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        let body = "A|UEI000000004|987654321|WIDGETS INC|WIDGETS|20150601|20150602|20260601|\
            1 MAIN ST|STE 4|SPRINGFIELD|IL|62701|1234|13|USA|2X~MF|PARENTUEI001|111222333|\
            PARENT CORP|JANE DOE^250000.00~JOHN ROE^175000.00\n";
        SamRecipientLoader
            .apply(&mut store, &artifact(&dir, "SAM_MONTHLY_V2_20170101.dat", body))
            .unwrap();

        let row = store.sam().recipient(Some("UEI000000004"), None).unwrap();
        assert_eq!(row.city.as_deref(), Some("SPRINGFIELD"));
        assert_eq!(row.congressional_district.as_deref(), Some("13"));
        assert_eq!(row.business_types_codes, vec!["2X", "MF"]);
        assert_eq!(row.ultimate_parent_uei.as_deref(), Some("PARENTUEI001"));
        assert_eq!(row.executive_compensation.len(), 2);
        assert_eq!(row.executive_compensation[0].full_name, "JANE DOE");
        assert_eq!(
            row.executive_compensation[0].amount.map(|a| a.to_string()),
            Some("250000.00".to_string())
        );
        assert_eq!(
            row.registration_date,
            Some(NaiveDate::from_ymd_opt(2015, 6, 1).unwrap())
        );
    }

    #[test]
    fn unregistered_endpoint_truncates_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        let first = serde_json::to_string(&vec![SamRecipient {
            uei: Some("UNREG0000001".into()),
            legal_business_name: "NOT REGISTERED".into(),
            ..SamRecipient::default()
        }])
        .unwrap();
        SamUnregisteredLoader
            .apply(&mut store, &artifact(&dir, "unregistered_20170101.json", &first))
            .unwrap();
        assert_eq!(store.sam_unregistered().len(), 1);

        let second = serde_json::to_string(&Vec::<SamRecipient>::new()).unwrap();
        let counts = SamUnregisteredLoader
            .apply(&mut store, &artifact(&dir, "unregistered_20170201.json", &second))
            .unwrap();
        assert_eq!(counts.deactivated, 1);
        assert!(store.sam_unregistered().is_empty());
    }
}
