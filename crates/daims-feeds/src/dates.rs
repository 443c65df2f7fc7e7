//! Date parsing for feed payloads: ISO `YYYY-MM-DD` first, then the
//! submitted-data formats (`YYYYMMDD`, `MM/DD/YYYY`).

use chrono::NaiveDate;

pub fn parse_feed_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| daims_model::dates::parse_submitted_date(trimmed))
}
