//! Rule identifiers with natural ordering.
//!
//! A rule id is an alphabetic prefix (`A`, `B`, `C`, `FABS`) followed by
//! dotted numeric segments: `A3`, `B12.1`, `FABS31.4.2`. Ordering is prefix
//! first, then segments compared numerically, so `A3 < A9 < A10` and
//! `FABS31.4.2 < FABS31.10`. Report ordering and engine determinism both key
//! on this ordering.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId {
    prefix: String,
    segments: Vec<u32>,
}

impl RuleId {
    pub fn new(prefix: &str, segments: &[u32]) -> Result<Self, ModelError> {
        if prefix.is_empty()
            || segments.is_empty()
            || !prefix.bytes().all(|b| b.is_ascii_uppercase())
        {
            return Err(ModelError::InvalidRuleId(format!("{prefix}{segments:?}")));
        }
        Ok(Self { prefix: prefix.to_string(), segments: segments.to_vec() })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn segments(&self) -> &[u32] {
        &self.segments
    }
}

impl FromStr for RuleId {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let split = raw.find(|c: char| c.is_ascii_digit());
        let Some(split) = split else {
            return Err(ModelError::InvalidRuleId(raw.to_string()));
        };
        let (prefix, rest) = raw.split_at(split);
        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(ModelError::InvalidRuleId(raw.to_string()));
        }
        let mut segments = Vec::new();
        for part in rest.split('.') {
            let value = part
                .parse::<u32>()
                .map_err(|_| ModelError::InvalidRuleId(raw.to_string()))?;
            segments.push(value);
        }
        Ok(Self { prefix: prefix.to_ascii_uppercase(), segments })
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix)?;
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl Serialize for RuleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RuleId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}
