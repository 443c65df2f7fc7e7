//! Treasury Account Symbol components and rendering.
//!
//! The seven TAS components join into a fixed-width display string used as
//! the cross-file and reference join key: widths 3, 3, 4, 4, 1, 4, 3 with
//! empty numeric components zero-padded and a blank availability type
//! rendered as a single space. Component text is trimmed and zero-padded
//! before any comparison, so `"5"`, `"05"`, and `"005"` name the same
//! agency.

use serde::{Deserialize, Serialize};

use crate::codes::pad_left_zero;

/// The seven submitted TAS components, normalized at construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TasComponents {
    pub allocation_transfer_agency: String,
    pub agency_identifier: String,
    pub beginning_period_of_availa: String,
    pub ending_period_of_availabil: String,
    pub availability_type_code: String,
    pub main_account_code: String,
    pub sub_account_code: String,
}

impl TasComponents {
    /// Builds from raw submitted fields, applying trim + padding rules.
    #[allow(clippy::too_many_arguments)]
    pub fn from_submitted(
        ata: &str,
        aid: &str,
        bpoa: &str,
        epoa: &str,
        a_type: &str,
        main: &str,
        sub: &str,
    ) -> Self {
        Self {
            allocation_transfer_agency: pad_component(ata, 3),
            agency_identifier: pad_component(aid, 3),
            beginning_period_of_availa: pad_component(bpoa, 4),
            ending_period_of_availabil: pad_component(epoa, 4),
            availability_type_code: a_type.trim().to_ascii_uppercase(),
            main_account_code: pad_component(main, 4),
            sub_account_code: pad_component(sub, 3),
        }
    }

    /// "X" — available until expended, no period of availability.
    pub fn is_no_year(&self) -> bool {
        self.availability_type_code == "X"
    }

    /// Fixed-width display string (3,3,4,4,1,4,3), blank availability type
    /// as one space. This is the string SF-133 and File B/C joins key on.
    pub fn display(&self) -> String {
        let a_type = if self.availability_type_code.is_empty() {
            " "
        } else {
            &self.availability_type_code
        };
        format!(
            "{:0>3}{:0>3}{:0>4}{:0>4}{}{:0>4}{:0>3}",
            blank_to_zero(&self.allocation_transfer_agency, 3),
            blank_to_zero(&self.agency_identifier, 3),
            blank_to_zero(&self.beginning_period_of_availa, 4),
            blank_to_zero(&self.ending_period_of_availabil, 4),
            a_type,
            blank_to_zero(&self.main_account_code, 4),
            blank_to_zero(&self.sub_account_code, 3),
        )
    }

    /// Fiscal-year bounds parsed from BPOA/EPOA; `None` for no-year accounts
    /// or non-numeric periods.
    pub fn availability_years(&self) -> Option<(u16, u16)> {
        if self.is_no_year() {
            return None;
        }
        let begin = self.beginning_period_of_availa.parse::<u16>().ok()?;
        let end = self.ending_period_of_availabil.parse::<u16>().ok()?;
        Some((begin, end))
    }
}

fn pad_component(raw: &str, width: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        pad_left_zero(trimmed, width)
    }
}

fn blank_to_zero(component: &str, width: usize) -> String {
    if component.is_empty() {
        "0".repeat(width)
    } else {
        component.to_string()
    }
}
