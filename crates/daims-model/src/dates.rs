//! Permissive date parsing for submitted fields.
//!
//! Submitters report dates as `YYYYMMDD` or `MM/DD/YYYY`. Format conformance
//! is itself a validation rule (the d4 family), not a precondition: a
//! malformed date parses to `None` and the row simply drops out of
//! date-dependent rules instead of failing the run.

use chrono::NaiveDate;

/// Parses a submitted date, accepting `YYYYMMDD` and `MM/DD/YYYY`.
///
/// Returns `None` for blank or malformed input, including real-looking
/// strings that name impossible dates (`20231301`).
pub fn parse_submitted_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.len() == 8 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(trimmed, "%Y%m%d").ok();
    }
    if trimmed.contains('/') {
        return NaiveDate::parse_from_str(trimmed, "%m/%d/%Y").ok();
    }
    None
}

/// True when the raw text is non-blank and fails to parse as a date.
/// Blank is not a format violation; requiredness is a separate rule.
pub fn is_malformed_date(raw: &str) -> bool {
    !raw.trim().is_empty() && parse_submitted_date(raw).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn accepts_both_submitted_formats() {
        assert_eq!(parse_submitted_date("20140111"), Some(date(2014, 1, 11)));
        assert_eq!(parse_submitted_date("01/11/2014"), Some(date(2014, 1, 11)));
        assert_eq!(parse_submitted_date(" 20140111 "), Some(date(2014, 1, 11)));
    }

    #[test]
    fn malformed_dates_become_none() {
        assert_eq!(parse_submitted_date(""), None);
        assert_eq!(parse_submitted_date("2014-01-11"), None);
        assert_eq!(parse_submitted_date("20231301"), None);
        assert_eq!(parse_submitted_date("13/45/2014"), None);
        assert_eq!(parse_submitted_date("11 Jan 2014"), None);
    }

    #[test]
    fn blank_is_not_malformed() {
        assert!(!is_malformed_date("   "));
        assert!(is_malformed_date("202401"));
        assert!(!is_malformed_date("20240101"));
    }
}
