pub mod cancel;
pub mod codes;
pub mod dates;
pub mod error;
pub mod fiscal;
pub mod issue;
pub mod lookup;
pub mod money;
pub mod reference;
pub mod rule_id;
pub mod staging;
pub mod tas;

pub use cancel::CancelToken;
pub use codes::CorrectionDeleteIndicator;
pub use error::{ModelError, Result};
pub use fiscal::{FiscalPeriod, FiscalYear};
pub use issue::{RuleSummary, Severity, SkippedRule, ValidationIssue};
pub use lookup::{CaseInsensitiveMap, CaseInsensitiveSet};
pub use money::{Money, MoneyCell, MoneyCellError};
pub use reference::{
    AssistanceListing, CdCountyGrouped, CdStateGrouped, CdZipsGrouped, CgacAgency, CountryCode,
    DefcCode, DefcGroup, ExecutiveCompensation, FrecAgency, ObjectClass, ProgramActivity,
    SamRecipient, Sf133Balance, SubTierAgency, SubmissionWindow, TasAccount, ZipLocal,
    ZipsGrouped,
};
pub use rule_id::RuleId;
pub use staging::{
    AppropriationRow, AssistanceRow, AwardFinancialRow, FieldValue, ProgramBalancesRow,
    ProgramColumns, PublishedAssistance, PublishedStore, PublishedSubmission, StagedRow,
    StagedSubmission, Submission, SubmissionFile, UssglColumns,
};
pub use tas::TasComponents;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_serializes() {
        let issue = ValidationIssue {
            rule_id: "FABS31.4.2".parse().expect("rule id"),
            severity: Severity::Warning,
            file: SubmissionFile::Fabs,
            row_number: Some(12),
            field_values: vec![("uei".to_string(), "TESTUEI00001".to_string())],
            message: "recipient is not registered".to_string(),
            unique_id: "0_1234_fain_".to_string(),
        };
        let json = serde_json::to_string(&issue).expect("serialize issue");
        let round: ValidationIssue = serde_json::from_str(&json).expect("deserialize issue");
        assert_eq!(round, issue);
        assert!(json.contains("\"FABS31.4.2\""));
    }
}
