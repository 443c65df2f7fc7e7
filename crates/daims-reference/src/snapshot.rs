#![deny(unsafe_code)]

//! Reference snapshots: every loaded dimension written to one directory
//! with a TOML manifest pinning a SHA-256 per file.
//!
//! Loading verifies the manifest before trusting anything in the
//! directory: schema and version, one file per role, well-formed digests,
//! bare relative paths, no files on disk the manifest does not claim, and
//! a digest match for every claimed file. A snapshot that fails any of
//! these checks is rejected whole.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use daims_model::reference::{
    AssistanceListing, CgacAgency, CountryCode, DefcCode, FrecAgency, ObjectClass,
    ProgramActivity, SamRecipient, Sf133Balance, SubTierAgency, SubmissionWindow, ZipLocal,
};

use crate::error::{ReferenceError, Result};
use crate::hash::sha256_hex_file;
use crate::stamps::LoadStamps;
use crate::store::{Dimension, ReferenceStore, ZipTables};
use crate::tables;
use crate::tables::TasRecord;

pub const MANIFEST_FILE: &str = "manifest.toml";
pub const MANIFEST_SCHEMA: &str = "daims-broker/reference-snapshot";
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Manifest shape
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub manifest: ManifestHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestHeader {
    pub schema: String,
    pub schema_version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Csv,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFile {
    pub path: String,
    pub sha256: String,
    pub kind: FileKind,
    pub role: String,
    pub rows: u64,
}

impl Manifest {
    pub fn read_from(path: &Path) -> Result<Self> {
        let body = fs::read_to_string(path).map_err(|e| ReferenceError::io(path, e))?;
        toml::from_str(&body).map_err(|e| ReferenceError::Toml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let body = toml::to_string_pretty(self).map_err(|e| ReferenceError::Serialize {
            what: path.display().to_string(),
            message: e.to_string(),
        })?;
        fs::write(path, body).map_err(|e| ReferenceError::io(path, e))
    }
}

/// Role strings a manifest may carry, each with the file kind it must use.
fn expected_kind(role: &str) -> Option<FileKind> {
    match role {
        "defc" | "sam_recipients" | "sam_unregistered" | "stamps" => Some(FileKind::Json),
        "tas" | "cgac" | "frec" | "sub_tier_agencies" | "assistance_listings" | "countries"
        | "zips" | "object_classes" | "program_activity" | "submission_windows" | "sf133" => {
            Some(FileKind::Csv)
        }
        _ => None,
    }
}

// ============================================================================
// Writing
// ============================================================================

/// Writes every loaded dimension plus the load stamps under `dir` and pins
/// them in `manifest.toml`. An earlier snapshot in the same directory is
/// replaced; any file neither snapshot claims aborts the write.
pub fn write_snapshot(store: &ReferenceStore, dir: &Path) -> Result<Manifest> {
    fs::create_dir_all(dir).map_err(|e| ReferenceError::io(dir, e))?;
    clear_previous(dir)?;
    refuse_foreign_files(dir)?;

    let mut files = Vec::new();

    if store.is_loaded(Dimension::Tas) {
        let mut rows: Vec<TasRecord> = store.tas_accounts().iter().map(TasRecord::from).collect();
        rows.sort_by(|a, b| {
            (
                &a.agency_identifier,
                &a.main_account_code,
                &a.sub_account_code,
                &a.beginning_period_of_availa,
                &a.availability_type_code,
            )
                .cmp(&(
                    &b.agency_identifier,
                    &b.main_account_code,
                    &b.sub_account_code,
                    &b.beginning_period_of_availa,
                    &b.availability_type_code,
                ))
        });
        files.push(write_csv_role(dir, "tas", "tas.csv", &rows)?);
    }

    if store.is_loaded(Dimension::Agencies) {
        let cgac: Vec<&CgacAgency> = store.cgac_agencies().collect();
        files.push(write_csv_role(dir, "cgac", "cgac.csv", &cgac)?);
        let frec: Vec<&FrecAgency> = store.frec_agencies().collect();
        files.push(write_csv_role(dir, "frec", "frec.csv", &frec)?);
        let mut sub_tier: Vec<&SubTierAgency> = store.sub_tier_agencies().collect();
        sub_tier.sort_by(|a, b| a.sub_tier_code.cmp(&b.sub_tier_code));
        files.push(write_csv_role(
            dir,
            "sub_tier_agencies",
            "sub_tier_agencies.csv",
            &sub_tier,
        )?);
    }

    if store.is_loaded(Dimension::AssistanceListings) {
        let listings: Vec<&AssistanceListing> = store.assistance_listings().collect();
        files.push(write_csv_role(
            dir,
            "assistance_listings",
            "assistance_listings.csv",
            &listings,
        )?);
    }

    if store.is_loaded(Dimension::Defc) {
        let mut codes: Vec<&DefcCode> = store.defc_codes().collect();
        codes.sort_by(|a, b| a.code.cmp(&b.code));
        let count = codes.len() as u64;
        files.push(write_json_role(dir, "defc", "defc.json", &codes, count)?);
    }

    if store.is_loaded(Dimension::Countries) {
        let mut countries: Vec<&CountryCode> = store.countries().collect();
        countries.sort_by(|a, b| a.country_code.cmp(&b.country_code));
        files.push(write_csv_role(dir, "countries", "countries.csv", &countries)?);
    }

    if store.is_loaded(Dimension::Zips) {
        let mut zips: Vec<&ZipLocal> = store.zip().zips.iter().collect();
        zips.sort_by(|a, b| {
            (&a.zip5, &a.zip_last4, &a.state_abbreviation, &a.county_number)
                .cmp(&(&b.zip5, &b.zip_last4, &b.state_abbreviation, &b.county_number))
        });
        files.push(write_csv_role(dir, "zips", "zips.csv", &zips)?);
    }

    if store.is_loaded(Dimension::SamRecipients) {
        let mut recipients: Vec<&SamRecipient> = store.sam().rows().iter().collect();
        recipients.sort_by(|a, b| {
            (&a.uei, &a.awardee_or_recipient_uniqu)
                .cmp(&(&b.uei, &b.awardee_or_recipient_uniqu))
        });
        let count = recipients.len() as u64;
        files.push(write_json_role(
            dir,
            "sam_recipients",
            "sam_recipients.json",
            &recipients,
            count,
        )?);
        let mut unregistered: Vec<&SamRecipient> = store.sam_unregistered().iter().collect();
        unregistered.sort_by(|a, b| {
            (&a.uei, &a.awardee_or_recipient_uniqu)
                .cmp(&(&b.uei, &b.awardee_or_recipient_uniqu))
        });
        let count = unregistered.len() as u64;
        files.push(write_json_role(
            dir,
            "sam_unregistered",
            "sam_unregistered.json",
            &unregistered,
            count,
        )?);
    }

    if store.is_loaded(Dimension::ObjectClasses) {
        let classes: Vec<&ObjectClass> = store.object_classes().collect();
        files.push(write_csv_role(
            dir,
            "object_classes",
            "object_classes.csv",
            &classes,
        )?);
    }

    if store.is_loaded(Dimension::ProgramActivity) {
        let mut rows: Vec<&ProgramActivity> = store.program_activities().iter().collect();
        rows.sort_by(|a, b| {
            (
                a.fiscal_year,
                &a.agency_identifier,
                &a.program_activity_code,
                &a.program_activity_name,
            )
                .cmp(&(
                    b.fiscal_year,
                    &b.agency_identifier,
                    &b.program_activity_code,
                    &b.program_activity_name,
                ))
        });
        files.push(write_csv_role(
            dir,
            "program_activity",
            "program_activity.csv",
            &rows,
        )?);
    }

    if store.is_loaded(Dimension::SubmissionWindows) {
        let windows: Vec<&SubmissionWindow> = store.submission_windows().collect();
        files.push(write_csv_role(
            dir,
            "submission_windows",
            "submission_windows.csv",
            &windows,
        )?);
    }

    if store.is_loaded(Dimension::Sf133) {
        let mut rows: Vec<&Sf133Balance> = store.sf133().all_rows().collect();
        rows.sort_by(|a, b| {
            (
                a.fiscal_year,
                a.period,
                &a.tas,
                a.line_number,
                &a.disaster_emergency_fund_code,
            )
                .cmp(&(
                    b.fiscal_year,
                    b.period,
                    &b.tas,
                    b.line_number,
                    &b.disaster_emergency_fund_code,
                ))
        });
        files.push(write_csv_role(dir, "sf133", "sf133.csv", &rows)?);
    }

    files.push(write_json_role(dir, "stamps", "stamps.json", &store.stamps, 0)?);

    let manifest = Manifest {
        manifest: ManifestHeader {
            schema: MANIFEST_SCHEMA.to_string(),
            schema_version: MANIFEST_SCHEMA_VERSION,
        },
        notes: None,
        files,
    };
    manifest.write_to(&dir.join(MANIFEST_FILE))?;
    Ok(manifest)
}

fn write_csv_role<T: Serialize>(
    dir: &Path,
    role: &str,
    file_name: &str,
    rows: &[T],
) -> Result<ManifestFile> {
    let path = dir.join(file_name);
    tables::write_csv(&path, rows)?;
    Ok(ManifestFile {
        path: file_name.to_string(),
        sha256: sha256_hex_file(&path)?,
        kind: FileKind::Csv,
        role: role.to_string(),
        rows: rows.len() as u64,
    })
}

fn write_json_role<T: Serialize>(
    dir: &Path,
    role: &str,
    file_name: &str,
    value: &T,
    rows: u64,
) -> Result<ManifestFile> {
    let path = dir.join(file_name);
    tables::write_json(&path, value)?;
    Ok(ManifestFile {
        path: file_name.to_string(),
        sha256: sha256_hex_file(&path)?,
        kind: FileKind::Json,
        role: role.to_string(),
        rows,
    })
}

/// Removes the files an earlier snapshot in `dir` pinned, manifest last.
fn clear_previous(dir: &Path) -> Result<()> {
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        return Ok(());
    }
    let previous = Manifest::read_from(&manifest_path)?;
    for file in &previous.files {
        validate_manifest_path(&file.path).map_err(|message| ReferenceError::InvalidPath {
            path: PathBuf::from(&file.path),
            message,
        })?;
        let path = dir.join(&file.path);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| ReferenceError::io(&path, e))?;
        }
    }
    fs::remove_file(&manifest_path).map_err(|e| ReferenceError::io(&manifest_path, e))
}

/// A snapshot directory must hold nothing we did not put there.
fn refuse_foreign_files(dir: &Path) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| ReferenceError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ReferenceError::io(dir, e))?;
        return Err(ReferenceError::UnexpectedFile { path: entry.path() });
    }
    Ok(())
}

// ============================================================================
// Verifying and loading
// ============================================================================

#[derive(Debug)]
pub struct VerifiedSnapshot {
    pub store: ReferenceStore,
    pub manifest: Manifest,
    pub files_verified: usize,
}

/// Verifies the manifest and every pinned file, then materializes a store.
pub fn verify_and_load(dir: &Path) -> Result<VerifiedSnapshot> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest = Manifest::read_from(&manifest_path)?;

    if manifest.manifest.schema != MANIFEST_SCHEMA {
        return Err(ReferenceError::InvalidManifest {
            message: format!(
                "unknown schema {:?} (expected {MANIFEST_SCHEMA:?})",
                manifest.manifest.schema
            ),
        });
    }
    if manifest.manifest.schema_version != MANIFEST_SCHEMA_VERSION {
        return Err(ReferenceError::InvalidManifest {
            message: format!(
                "unsupported schema version {} (expected {MANIFEST_SCHEMA_VERSION})",
                manifest.manifest.schema_version
            ),
        });
    }

    let mut seen_roles = BTreeSet::new();
    let mut claimed_paths = BTreeSet::new();
    for file in &manifest.files {
        if !seen_roles.insert(file.role.clone()) {
            return Err(ReferenceError::DuplicateDimension {
                name: file.role.clone(),
            });
        }
        let Some(kind) = expected_kind(&file.role) else {
            return Err(ReferenceError::InvalidManifest {
                message: format!("unknown role {:?}", file.role),
            });
        };
        if kind != file.kind {
            return Err(ReferenceError::InvalidManifest {
                message: format!("role {:?} must be stored as {kind:?}", file.role),
            });
        }
        validate_sha256_format(&file.sha256).map_err(|message| ReferenceError::InvalidSha256 {
            path: PathBuf::from(&file.path),
            message,
        })?;
        validate_manifest_path(&file.path).map_err(|message| ReferenceError::InvalidPath {
            path: PathBuf::from(&file.path),
            message,
        })?;
        claimed_paths.insert(file.path.clone());
    }

    // nothing on disk the manifest does not claim
    let entries = fs::read_dir(dir).map_err(|e| ReferenceError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ReferenceError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == MANIFEST_FILE {
            continue;
        }
        let is_claimed_file = claimed_paths.contains(&name)
            && entry
                .file_type()
                .map_err(|e| ReferenceError::io(entry.path(), e))?
                .is_file();
        if !is_claimed_file {
            return Err(ReferenceError::UnexpectedFile { path: entry.path() });
        }
    }

    let mut files_verified = 0;
    for file in &manifest.files {
        let path = dir.join(&file.path);
        if !path.is_file() {
            return Err(ReferenceError::MissingFile { path });
        }
        let actual = sha256_hex_file(&path)?;
        if actual != file.sha256 {
            return Err(ReferenceError::Sha256Mismatch {
                path,
                expected: file.sha256.clone(),
                actual,
            });
        }
        files_verified += 1;
    }

    let store = materialize(dir, &manifest)?;
    Ok(VerifiedSnapshot {
        store,
        manifest,
        files_verified,
    })
}

fn materialize(dir: &Path, manifest: &Manifest) -> Result<ReferenceStore> {
    let mut store = ReferenceStore::new();
    let mut cgac: Option<Vec<CgacAgency>> = None;
    let mut frec: Option<Vec<FrecAgency>> = None;
    let mut sub_tier: Option<Vec<SubTierAgency>> = None;

    for file in &manifest.files {
        let path = dir.join(&file.path);
        match file.role.as_str() {
            "tas" => {
                let rows: Vec<TasRecord> = tables::read_csv(&path)?;
                store.set_tas_accounts(rows.into_iter().map(Into::into).collect());
            }
            "cgac" => cgac = Some(tables::read_csv(&path)?),
            "frec" => frec = Some(tables::read_csv(&path)?),
            "sub_tier_agencies" => sub_tier = Some(tables::read_csv(&path)?),
            "assistance_listings" => {
                store.set_assistance_listings(tables::read_csv(&path)?);
            }
            "defc" => store.set_defc(tables::read_json(&path)?),
            "countries" => store.set_countries(tables::read_csv(&path)?),
            "zips" => {
                let rows: Vec<ZipLocal> = tables::read_csv(&path)?;
                store.swap_zip_tables(ZipTables::derive(rows));
            }
            "sam_recipients" => {
                let rows: Vec<SamRecipient> = tables::read_json(&path)?;
                let sam = store.sam_mut();
                for row in rows {
                    sam.upsert(row);
                }
            }
            "sam_unregistered" => {
                store.replace_sam_unregistered(tables::read_json(&path)?);
            }
            "object_classes" => store.set_object_classes(tables::read_csv(&path)?),
            "program_activity" => store.set_program_activity(tables::read_csv(&path)?),
            "submission_windows" => store.set_submission_windows(tables::read_csv(&path)?),
            "sf133" => {
                let rows: Vec<Sf133Balance> = tables::read_csv(&path)?;
                let mut by_period: std::collections::BTreeMap<(u16, u8), Vec<Sf133Balance>> =
                    std::collections::BTreeMap::new();
                for row in rows {
                    by_period
                        .entry((row.fiscal_year, row.period))
                        .or_default()
                        .push(row);
                }
                let sf133 = store.sf133_mut();
                for ((fiscal_year, period), period_rows) in by_period {
                    sf133.set_period(fiscal_year, period, period_rows);
                }
            }
            "stamps" => {
                let stamps: LoadStamps = tables::read_json(&path)?;
                store.stamps = stamps;
            }
            // expected_kind already rejected anything else
            other => {
                return Err(ReferenceError::InvalidManifest {
                    message: format!("unknown role {other:?}"),
                });
            }
        }
    }

    if cgac.is_some() || frec.is_some() || sub_tier.is_some() {
        store.set_agencies(
            cgac.unwrap_or_default(),
            frec.unwrap_or_default(),
            sub_tier.unwrap_or_default(),
        );
    }
    Ok(store)
}

// ============================================================================
// Field validation
// ============================================================================

fn validate_sha256_format(digest: &str) -> std::result::Result<(), String> {
    if digest.len() != 64 {
        return Err(format!("must be 64 hex digits, found {}", digest.len()));
    }
    if !digest
        .chars()
        .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    {
        return Err("must be lowercase hex".to_string());
    }
    Ok(())
}

fn validate_manifest_path(raw: &str) -> std::result::Result<(), String> {
    if raw.is_empty() {
        return Err("must not be empty".to_string());
    }
    if raw.contains('\\') {
        return Err("backslashes are not allowed".to_string());
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        return Err("must be relative".to_string());
    }
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err("must be a bare file name".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_format_is_strict() {
        let ok = "a".repeat(64);
        assert!(validate_sha256_format(&ok).is_ok());
        assert!(validate_sha256_format("abc").is_err());
        let upper = "A".repeat(64);
        assert!(validate_sha256_format(&upper).is_err());
        let non_hex = "g".repeat(64);
        assert!(validate_sha256_format(&non_hex).is_err());
    }

    #[test]
    fn manifest_paths_must_be_bare_names() {
        assert!(validate_manifest_path("zips.csv").is_ok());
        assert!(validate_manifest_path("").is_err());
        assert!(validate_manifest_path("/etc/passwd").is_err());
        assert!(validate_manifest_path("../outside.csv").is_err());
        assert!(validate_manifest_path("sub/dir.csv").is_err());
        assert!(validate_manifest_path("win\\style.csv").is_err());
    }

    #[test]
    fn every_known_role_has_one_kind() {
        for role in [
            "tas",
            "cgac",
            "frec",
            "sub_tier_agencies",
            "assistance_listings",
            "countries",
            "zips",
            "object_classes",
            "program_activity",
            "submission_windows",
            "sf133",
        ] {
            assert_eq!(expected_kind(role), Some(FileKind::Csv), "{role}");
        }
        for role in ["defc", "sam_recipients", "sam_unregistered", "stamps"] {
            assert_eq!(expected_kind(role), Some(FileKind::Json), "{role}");
        }
        assert_eq!(expected_kind("surprise"), None);
    }
}
