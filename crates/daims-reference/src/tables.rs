#![deny(unsafe_code)]

//! Flat-file readers and writers for dimension tables.
//!
//! Dimensions whose rows are flat go to CSV with a fixed column order;
//! the two with nested payloads (DEFC public laws, SAM registrations) go
//! to JSON. Rows are sorted before writing so two snapshots of the same
//! store are byte-identical.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use daims_model::reference::TasAccount;
use daims_model::tas::TasComponents;

use crate::error::{ReferenceError, Result};

// ============================================================================
// Generic helpers
// ============================================================================

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, &e))?;
    for row in rows {
        writer.serialize(row).map_err(|e| csv_error(path, &e))?;
    }
    writer.flush().map_err(|e| ReferenceError::io(path, e))?;
    Ok(())
}

pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, &e))?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record.map_err(|e| csv_error(path, &e))?);
    }
    Ok(rows)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value).map_err(|e| ReferenceError::Serialize {
        what: path.display().to_string(),
        message: e.to_string(),
    })?;
    fs::write(path, body).map_err(|e| ReferenceError::io(path, e))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let body = fs::read(path).map_err(|e| ReferenceError::io(path, e))?;
    serde_json::from_slice(&body).map_err(|e| ReferenceError::Serialize {
        what: path.display().to_string(),
        message: e.to_string(),
    })
}

fn csv_error(path: &Path, error: &csv::Error) -> ReferenceError {
    ReferenceError::Csv {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}

// ============================================================================
// TAS records (components flattened to columns)
// ============================================================================

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct TasRecord {
    pub account_num: u64,
    pub allocation_transfer_agency: String,
    pub agency_identifier: String,
    pub beginning_period_of_availa: String,
    pub ending_period_of_availabil: String,
    pub availability_type_code: String,
    pub main_account_code: String,
    pub sub_account_code: String,
    pub internal_start_date: Option<chrono::NaiveDate>,
    pub internal_end_date: Option<chrono::NaiveDate>,
}

impl From<&TasAccount> for TasRecord {
    fn from(account: &TasAccount) -> Self {
        let c = &account.components;
        Self {
            account_num: account.account_num,
            allocation_transfer_agency: c.allocation_transfer_agency.clone(),
            agency_identifier: c.agency_identifier.clone(),
            beginning_period_of_availa: c.beginning_period_of_availa.clone(),
            ending_period_of_availabil: c.ending_period_of_availabil.clone(),
            availability_type_code: c.availability_type_code.clone(),
            main_account_code: c.main_account_code.clone(),
            sub_account_code: c.sub_account_code.clone(),
            internal_start_date: account.internal_start_date,
            internal_end_date: account.internal_end_date,
        }
    }
}

impl From<TasRecord> for TasAccount {
    fn from(record: TasRecord) -> Self {
        Self {
            account_num: record.account_num,
            components: TasComponents {
                allocation_transfer_agency: record.allocation_transfer_agency,
                agency_identifier: record.agency_identifier,
                beginning_period_of_availa: record.beginning_period_of_availa,
                ending_period_of_availabil: record.ending_period_of_availabil,
                availability_type_code: record.availability_type_code,
                main_account_code: record.main_account_code,
                sub_account_code: record.sub_account_code,
            },
            internal_start_date: record.internal_start_date,
            internal_end_date: record.internal_end_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daims_model::reference::{CountryCode, ZipLocal};

    #[test]
    fn csv_round_trips_optional_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zips.csv");
        let rows = vec![
            ZipLocal {
                zip5: "12345".into(),
                zip_last4: Some("6789".into()),
                state_abbreviation: "NY".into(),
                county_number: "001".into(),
                congressional_district_no: Some("04".into()),
            },
            ZipLocal {
                zip5: "96799".into(),
                zip_last4: None,
                state_abbreviation: "AS".into(),
                county_number: "010".into(),
                congressional_district_no: None,
            },
        ];
        write_csv(&path, &rows).unwrap();
        let back: Vec<ZipLocal> = read_csv(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn tas_records_flatten_and_restore_components() {
        let account = TasAccount {
            account_num: 42,
            components: TasComponents::from_submitted("", "097", "2016", "2017", "", "0804", "001"),
            internal_start_date: Some(chrono::NaiveDate::from_ymd_opt(2015, 10, 1).unwrap()),
            internal_end_date: None,
        };
        let record = TasRecord::from(&account);
        let restored = TasAccount::from(record);
        assert_eq!(restored, account);
    }

    #[test]
    fn json_round_trips_nested_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("countries.json");
        let rows = vec![CountryCode {
            country_code: "CAN".into(),
            country_name: "CANADA".into(),
            territory_free_state: false,
        }];
        write_json(&path, &rows).unwrap();
        let back: Vec<CountryCode> = read_json(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn missing_file_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.csv");
        let err = read_csv::<ZipLocal>(&path).unwrap_err();
        assert!(err.to_string().contains("absent.csv"));
    }
}
