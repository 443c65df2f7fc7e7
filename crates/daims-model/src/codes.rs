//! Code normalization shared by staging, rules, and feed parsing.
//!
//! Every code comparison in the system is trim + ASCII-case-insensitive, so
//! the canonical form produced here (trimmed, uppercased) is applied once at
//! staging and assumed everywhere downstream.

use serde::{Deserialize, Serialize};

/// Canonical code form: trimmed, ASCII-uppercased.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Blank and null are equivalent for every "is blank" test.
pub fn is_blank(raw: &str) -> bool {
    raw.trim().is_empty()
}

/// Left-pads with zeros up to `width`; longer inputs pass through unchanged.
pub fn pad_left_zero(raw: &str, width: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= width {
        trimmed.to_string()
    } else {
        format!("{trimmed:0>width$}")
    }
}

// ============================================================================
// Correction / delete indicator
// ============================================================================

/// FABS correction/delete indicator.
///
/// Blank means a new record, `C` corrects a prior published record, `D`
/// deletes one. The retired late indicator `L` is normalized to blank at
/// staging. Anything else is out of vocabulary and surfaces through the
/// domain rule, not through a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CorrectionDeleteIndicator {
    #[default]
    Blank,
    Correction,
    Delete,
}

impl CorrectionDeleteIndicator {
    /// Parses the submitted value; `None` for out-of-vocabulary codes.
    pub fn from_raw(raw: &str) -> Option<Self> {
        match normalize_code(raw).as_str() {
            "" | "L" => Some(Self::Blank),
            "C" => Some(Self::Correction),
            "D" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blank => "",
            Self::Correction => "C",
            Self::Delete => "D",
        }
    }

    pub fn is_delete(self) -> bool {
        matches!(self, Self::Delete)
    }

    pub fn is_correction(self) -> bool {
        matches!(self, Self::Correction)
    }
}
