use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid fiscal period {0} (expected 2..=12)")]
    InvalidPeriod(u8),
    #[error("invalid quarter {0} (expected 1..=4)")]
    InvalidQuarter(u8),
    #[error("invalid rule id: {0:?}")]
    InvalidRuleId(String),
    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
