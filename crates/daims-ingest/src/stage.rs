//! Staging: submitted tabular data into typed rows.
//!
//! Values stay as close to the submitted text as the row types allow: codes
//! and identifiers are trimmed but otherwise untouched, monetary text parses
//! into [`MoneyCell`] (keeping unparseable text verbatim), and the only
//! derived fields are the TAS display string, the FABS transaction key, and
//! the parsed action date.

use std::collections::BTreeMap;
use std::path::Path;

use daims_model::codes::CorrectionDeleteIndicator;
use daims_model::dates::parse_submitted_date;
use daims_model::money::MoneyCell;
use daims_model::staging::{
    AppropriationRow, AssistanceRow, AwardFinancialRow, ProgramBalancesRow, ProgramColumns,
    StagedSubmission, SubmissionFile, UssglColumns,
};
use daims_model::tas::TasComponents;
use polars::prelude::*;

use crate::error::Result;
use crate::layout::{layout_for, resolve_columns};
use crate::read::read_submitted_csv;

/// Resolved text columns for one submitted file, keyed by staging name.
struct StagedColumns {
    height: usize,
    columns: BTreeMap<&'static str, Vec<String>>,
}

impl StagedColumns {
    fn from_frame(df: &DataFrame, file: SubmissionFile, path: &Path) -> Result<Self> {
        let headers: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let layout = layout_for(file);
        let resolved = resolve_columns(&layout, &headers, file, path)?;

        let frame_columns = df.get_columns();
        let mut columns = BTreeMap::new();
        for (staging, idx) in resolved {
            columns.insert(staging, text_column(&frame_columns[idx])?);
        }
        Ok(Self {
            height: df.height(),
            columns,
        })
    }

    /// Trimmed cell text; nulls and absent optional columns read as blank.
    fn text(&self, staging: &'static str, row: usize) -> &str {
        self.columns
            .get(staging)
            .and_then(|values| values.get(row))
            .map_or("", String::as_str)
    }

    fn owned(&self, staging: &'static str, row: usize) -> String {
        self.text(staging, row).to_string()
    }

    fn money(&self, staging: &'static str, row: usize) -> MoneyCell {
        MoneyCell::parse(self.text(staging, row))
    }

    fn tas(&self, row: usize) -> TasComponents {
        TasComponents::from_submitted(
            self.text("allocation_transfer_agency", row),
            self.text("agency_identifier", row),
            self.text("beginning_period_of_availa", row),
            self.text("ending_period_of_availabil", row),
            self.text("availability_type_code", row),
            self.text("main_account_code", row),
            self.text("sub_account_code", row),
        )
    }

    fn program(&self, row: usize) -> ProgramColumns {
        ProgramColumns {
            object_class: self.owned("object_class", row),
            program_activity_code: self.owned("program_activity_code", row),
            program_activity_name: self.owned("program_activity_name", row),
            by_direct_reimbursable_fun: self.owned("by_direct_reimbursable_fun", row),
            disaster_emergency_fund_code: self.owned("disaster_emergency_fund_code", row),
            prior_year_adjustment: self.owned("prior_year_adjustment", row),
        }
    }

    fn ussgl(&self, row: usize) -> UssglColumns {
        UssglColumns {
            ussgl480100_undelivered_or_fyb: self.money("ussgl480100_undelivered_or_fyb", row),
            ussgl480100_undelivered_or_cpe: self.money("ussgl480100_undelivered_or_cpe", row),
            ussgl483100_undelivered_or_cpe: self.money("ussgl483100_undelivered_or_cpe", row),
            ussgl487100_downward_adjus_cpe: self.money("ussgl487100_downward_adjus_cpe", row),
            ussgl488100_upward_adjustm_cpe: self.money("ussgl488100_upward_adjustm_cpe", row),
            obligations_undelivered_or_fyb: self.money("obligations_undelivered_or_fyb", row),
            obligations_undelivered_or_cpe: self.money("obligations_undelivered_or_cpe", row),
            ussgl490100_delivered_orde_fyb: self.money("ussgl490100_delivered_orde_fyb", row),
            ussgl490100_delivered_orde_cpe: self.money("ussgl490100_delivered_orde_cpe", row),
            ussgl493100_delivered_orde_cpe: self.money("ussgl493100_delivered_orde_cpe", row),
            ussgl497100_downward_adjus_cpe: self.money("ussgl497100_downward_adjus_cpe", row),
            ussgl498100_upward_adjustm_cpe: self.money("ussgl498100_upward_adjustm_cpe", row),
            obligations_delivered_orde_fyb: self.money("obligations_delivered_orde_fyb", row),
            obligations_delivered_orde_cpe: self.money("obligations_delivered_orde_cpe", row),
            ussgl480200_undelivered_or_fyb: self.money("ussgl480200_undelivered_or_fyb", row),
            ussgl480200_undelivered_or_cpe: self.money("ussgl480200_undelivered_or_cpe", row),
            ussgl483200_undelivered_or_cpe: self.money("ussgl483200_undelivered_or_cpe", row),
            ussgl488200_upward_adjustm_cpe: self.money("ussgl488200_upward_adjustm_cpe", row),
            gross_outlays_undelivered_fyb: self.money("gross_outlays_undelivered_fyb", row),
            gross_outlays_undelivered_cpe: self.money("gross_outlays_undelivered_cpe", row),
            ussgl490200_delivered_orde_cpe: self.money("ussgl490200_delivered_orde_cpe", row),
            ussgl490800_authority_outl_fyb: self.money("ussgl490800_authority_outl_fyb", row),
            ussgl490800_authority_outl_cpe: self.money("ussgl490800_authority_outl_cpe", row),
            ussgl498200_upward_adjustm_cpe: self.money("ussgl498200_upward_adjustm_cpe", row),
            gross_outlays_delivered_or_fyb: self.money("gross_outlays_delivered_or_fyb", row),
            gross_outlays_delivered_or_cpe: self.money("gross_outlays_delivered_or_cpe", row),
            ussgl487200_downward_adjus_cpe: self.money("ussgl487200_downward_adjus_cpe", row),
            ussgl497200_downward_adjus_cpe: self.money("ussgl497200_downward_adjus_cpe", row),
        }
    }
}

/// Casts one column to text and materializes trimmed values.
fn text_column(column: &Column) -> Result<Vec<String>> {
    let cast = column.cast(&DataType::String)?;
    let values = cast.str()?;
    Ok(values
        .iter()
        .map(|cell| cell.unwrap_or("").trim().to_string())
        .collect())
}

/// Rows are numbered from 1 in submitted order; the header row is not
/// counted.
fn row_number(idx: usize) -> u32 {
    u32::try_from(idx + 1).unwrap_or(u32::MAX)
}

/// Stages a submitted File A (appropriation account balances).
pub fn stage_appropriations(df: &DataFrame, path: &Path) -> Result<Vec<AppropriationRow>> {
    let cols = StagedColumns::from_frame(df, SubmissionFile::A, path)?;
    let mut rows = Vec::with_capacity(cols.height);
    for i in 0..cols.height {
        let tas_components = cols.tas(i);
        let tas = tas_components.display();
        rows.push(AppropriationRow {
            row_number: row_number(i),
            tas_components,
            tas,
            total_budgetary_resources_cpe: cols.money("total_budgetary_resources_cpe", i),
            budget_authority_appropria_cpe: cols.money("budget_authority_appropria_cpe", i),
            budget_authority_unobligat_fyb: cols.money("budget_authority_unobligat_fyb", i),
            adjustments_to_unobligated_cpe: cols.money("adjustments_to_unobligated_cpe", i),
            other_budgetary_resources_cpe: cols.money("other_budgetary_resources_cpe", i),
            contract_authority_amount_cpe: cols.money("contract_authority_amount_cpe", i),
            borrowing_authority_amount_cpe: cols.money("borrowing_authority_amount_cpe", i),
            spending_authority_from_of_cpe: cols.money("spending_authority_from_of_cpe", i),
            status_of_budgetary_resour_cpe: cols.money("status_of_budgetary_resour_cpe", i),
            obligations_incurred_total_cpe: cols.money("obligations_incurred_total_cpe", i),
            unobligated_balance_cpe: cols.money("unobligated_balance_cpe", i),
            gross_outlay_amount_by_tas_cpe: cols.money("gross_outlay_amount_by_tas_cpe", i),
            deobligations_recoveries_r_cpe: cols.money("deobligations_recoveries_r_cpe", i),
        });
    }
    Ok(rows)
}

/// Stages a submitted File B (object class and program activity balances).
pub fn stage_program_balances(df: &DataFrame, path: &Path) -> Result<Vec<ProgramBalancesRow>> {
    let cols = StagedColumns::from_frame(df, SubmissionFile::B, path)?;
    let mut rows = Vec::with_capacity(cols.height);
    for i in 0..cols.height {
        let tas_components = cols.tas(i);
        let tas = tas_components.display();
        rows.push(ProgramBalancesRow {
            row_number: row_number(i),
            tas_components,
            tas,
            program: cols.program(i),
            ussgl: cols.ussgl(i),
            gross_outlay_amount_by_pro_fyb: cols.money("gross_outlay_amount_by_pro_fyb", i),
            gross_outlay_amount_by_pro_cpe: cols.money("gross_outlay_amount_by_pro_cpe", i),
            obligations_incurred_by_pr_cpe: cols.money("obligations_incurred_by_pr_cpe", i),
            deobligations_recov_by_pro_cpe: cols.money("deobligations_recov_by_pro_cpe", i),
        });
    }
    Ok(rows)
}

/// Stages a submitted File C (award financial detail).
pub fn stage_award_financial(df: &DataFrame, path: &Path) -> Result<Vec<AwardFinancialRow>> {
    let cols = StagedColumns::from_frame(df, SubmissionFile::C, path)?;
    let mut rows = Vec::with_capacity(cols.height);
    for i in 0..cols.height {
        let tas_components = cols.tas(i);
        let tas = tas_components.display();
        rows.push(AwardFinancialRow {
            row_number: row_number(i),
            tas_components,
            tas,
            program: cols.program(i),
            ussgl: cols.ussgl(i),
            piid: cols.owned("piid", i),
            parent_award_id: cols.owned("parent_award_id", i),
            fain: cols.owned("fain", i),
            uri: cols.owned("uri", i),
            transaction_obligated_amou: cols.money("transaction_obligated_amou", i),
            gross_outlay_amount_by_awa_fyb: cols.money("gross_outlay_amount_by_awa_fyb", i),
            gross_outlay_amount_by_awa_cpe: cols.money("gross_outlay_amount_by_awa_cpe", i),
            obligations_incurred_byawa_cpe: cols.money("obligations_incurred_byawa_cpe", i),
            deobligations_recov_by_awa_cpe: cols.money("deobligations_recov_by_awa_cpe", i),
        });
    }
    Ok(rows)
}

/// Stages a submitted FABS file (financial assistance transactions).
///
/// The transaction key is derived here from its four components. An
/// out-of-vocabulary correction/delete indicator stages as blank; the raw
/// text is kept alongside for reporting.
pub fn stage_assistance(df: &DataFrame, path: &Path) -> Result<Vec<AssistanceRow>> {
    let cols = StagedColumns::from_frame(df, SubmissionFile::Fabs, path)?;
    let mut rows = Vec::with_capacity(cols.height);
    for i in 0..cols.height {
        let fain = cols.owned("fain", i);
        let uri = cols.owned("uri", i);
        let award_modification_amendme = cols.owned("award_modification_amendme", i);
        let awarding_sub_tier_agency_c = cols.owned("awarding_sub_tier_agency_c", i);
        let afa_generated_unique = AssistanceRow::derive_unique_id(
            &award_modification_amendme,
            &awarding_sub_tier_agency_c,
            &fain,
            &uri,
        );
        let action_date = cols.owned("action_date", i);
        let action_date_parsed = parse_submitted_date(&action_date);
        let correction_delete_indicatr = cols.owned("correction_delete_indicatr", i);
        let cdi =
            CorrectionDeleteIndicator::from_raw(&correction_delete_indicatr).unwrap_or_default();

        rows.push(AssistanceRow {
            row_number: row_number(i),
            afa_generated_unique,
            fain,
            uri,
            award_modification_amendme,
            awarding_sub_tier_agency_c,
            action_date,
            action_date_parsed,
            action_type: cols.owned("action_type", i),
            assistance_type: cols.owned("assistance_type", i),
            record_type: cols.owned("record_type", i),
            correction_delete_indicatr,
            cdi,
            uei: cols.owned("uei", i),
            awardee_or_recipient_uniqu: cols.owned("awardee_or_recipient_uniqu", i),
            awardee_or_recipient_legal: cols.owned("awardee_or_recipient_legal", i),
            legal_entity_address_line1: cols.owned("legal_entity_address_line1", i),
            legal_entity_city_name: cols.owned("legal_entity_city_name", i),
            legal_entity_state_code: cols.owned("legal_entity_state_code", i),
            legal_entity_zip5: cols.owned("legal_entity_zip5", i),
            legal_entity_zip_last4: cols.owned("legal_entity_zip_last4", i),
            legal_entity_congressional: cols.owned("legal_entity_congressional", i),
            legal_entity_country_code: cols.owned("legal_entity_country_code", i),
            place_of_performance_code: cols.owned("place_of_performance_code", i),
            place_of_performance_zip4a: cols.owned("place_of_performance_zip4a", i),
            place_of_performance_congr: cols.owned("place_of_performance_congr", i),
            place_of_perform_country_c: cols.owned("place_of_perform_country_c", i),
            cfda_number: cols.owned("cfda_number", i),
            business_types: cols.owned("business_types", i),
            award_description: cols.owned("award_description", i),
            period_of_performance_star: cols.owned("period_of_performance_star", i),
            period_of_performance_curr: cols.owned("period_of_performance_curr", i),
            federal_action_obligation: cols.money("federal_action_obligation", i),
            face_value_loan_guarantee: cols.money("face_value_loan_guarantee", i),
            original_loan_subsidy_cost: cols.money("original_loan_subsidy_cost", i),
        });
    }
    Ok(rows)
}

/// Reads one submitted file from disk and stages it into `staged`. Returns
/// the number of rows staged.
pub fn ingest_file(
    staged: &mut StagedSubmission,
    file: SubmissionFile,
    path: &Path,
) -> Result<usize> {
    let df = read_submitted_csv(path)?;
    let count = match file {
        SubmissionFile::A => {
            staged.appropriations = stage_appropriations(&df, path)?;
            staged.appropriations.len()
        }
        SubmissionFile::B => {
            staged.program_balances = stage_program_balances(&df, path)?;
            staged.program_balances.len()
        }
        SubmissionFile::C => {
            staged.award_financial = stage_award_financial(&df, path)?;
            staged.award_financial.len()
        }
        SubmissionFile::Fabs => {
            staged.assistance = stage_assistance(&df, path)?;
            staged.assistance.len()
        }
    };
    tracing::info!(
        file = %file,
        path = %path.display(),
        rows = count,
        "staged submitted file"
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use daims_model::fiscal::{FiscalPeriod, FiscalYear};
    use daims_model::money::Money;
    use daims_model::staging::Submission;
    use std::str::FromStr;
    use tempfile::NamedTempFile;

    use crate::layout::layout_for;

    /// Writes a CSV under the published header spellings; each row supplies
    /// (staging name, value) pairs and every other column is blank.
    fn submitted_csv(file: SubmissionFile, rows: &[&[(&str, &str)]]) -> NamedTempFile {
        let layout = layout_for(file);
        let header: Vec<&str> = layout
            .iter()
            .map(|spec| spec.aliases.first().copied().unwrap_or(spec.staging))
            .collect();
        let mut text = header.join(",");
        text.push('\n');
        for row in rows {
            let line: Vec<&str> = layout
                .iter()
                .map(|spec| {
                    row.iter()
                        .find(|(staging, _)| *staging == spec.staging)
                        .map_or("", |(_, value)| *value)
                })
                .collect();
            text.push_str(&line.join(","));
            text.push('\n');
        }

        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(text.as_bytes()).unwrap();
        tmp
    }

    fn money(text: &str) -> MoneyCell {
        MoneyCell::Value(Money::from_str(text).unwrap())
    }

    #[test]
    fn appropriation_rows_stage_with_derived_tas() {
        let tmp = submitted_csv(
            SubmissionFile::A,
            &[
                &[
                    ("agency_identifier", "97"),
                    ("beginning_period_of_availa", "2016"),
                    ("ending_period_of_availabil", "2017"),
                    ("main_account_code", "804"),
                    ("sub_account_code", "1"),
                    ("total_budgetary_resources_cpe", "1000.00"),
                    ("budget_authority_appropria_cpe", "12x"),
                ],
                &[
                    ("agency_identifier", "97"),
                    ("availability_type_code", "x"),
                    ("main_account_code", "100"),
                    ("total_budgetary_resources_cpe", "-250.5"),
                ],
            ],
        );
        let df = read_submitted_csv(tmp.path()).unwrap();
        let rows = stage_appropriations(&df, tmp.path()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_number, 1);
        assert_eq!(rows[0].tas, "00009720162017 0804001");
        assert_eq!(rows[0].total_budgetary_resources_cpe, money("1000.00"));
        assert_eq!(
            rows[0].budget_authority_appropria_cpe,
            MoneyCell::Invalid("12x".to_string())
        );
        assert!(rows[0].other_budgetary_resources_cpe.is_blank());

        assert_eq!(rows[1].row_number, 2);
        assert_eq!(rows[1].tas_components.availability_type_code, "X");
        assert_eq!(rows[1].total_budgetary_resources_cpe, money("-250.5"));
    }

    #[test]
    fn program_balance_rows_stage_ussgl_and_program_columns() {
        let tmp = submitted_csv(
            SubmissionFile::B,
            &[&[
                ("agency_identifier", "97"),
                ("main_account_code", "804"),
                ("object_class", "0254"),
                ("program_activity_code", "0001"),
                ("program_activity_name", "PROGRAM ONE"),
                ("by_direct_reimbursable_fun", "D"),
                ("disaster_emergency_fund_code", "N"),
                ("prior_year_adjustment", "X"),
                ("ussgl480100_undelivered_or_fyb", "5"),
                ("gross_outlays_undelivered_cpe", "7.25"),
                ("obligations_incurred_by_pr_cpe", "-12"),
            ]],
        );
        let df = read_submitted_csv(tmp.path()).unwrap();
        let rows = stage_program_balances(&df, tmp.path()).unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.program.object_class, "0254");
        assert_eq!(row.program.program_activity_name, "PROGRAM ONE");
        assert_eq!(row.program.prior_year_adjustment, "X");
        assert_eq!(row.ussgl.ussgl480100_undelivered_or_fyb, money("5"));
        assert_eq!(row.ussgl.gross_outlays_undelivered_cpe, money("7.25"));
        assert!(row.ussgl.ussgl497200_downward_adjus_cpe.is_blank());
        assert_eq!(row.obligations_incurred_by_pr_cpe, money("-12"));
    }

    #[test]
    fn award_financial_rows_stage_award_ids() {
        let tmp = submitted_csv(
            SubmissionFile::C,
            &[&[
                ("agency_identifier", "97"),
                ("main_account_code", "804"),
                ("disaster_emergency_fund_code", "Q"),
                ("piid", "CONT-1"),
                ("fain", "FAIN-1"),
                ("transaction_obligated_amou", "-10.5"),
            ]],
        );
        let df = read_submitted_csv(tmp.path()).unwrap();
        let rows = stage_award_financial(&df, tmp.path()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].piid, "CONT-1");
        assert_eq!(rows[0].fain, "FAIN-1");
        assert_eq!(rows[0].uri, "");
        assert_eq!(rows[0].transaction_obligated_amou, money("-10.5"));
        assert_eq!(rows[0].program.disaster_emergency_fund_code, "Q");
    }

    #[test]
    fn assistance_rows_derive_the_transaction_key() {
        let tmp = submitted_csv(
            SubmissionFile::Fabs,
            &[
                &[
                    ("fain", "ABC-123"),
                    ("award_modification_amendme", "0"),
                    ("awarding_sub_tier_agency_c", "1234"),
                    ("action_date", "20170104"),
                    ("correction_delete_indicatr", "L"),
                    ("federal_action_obligation", "12.34"),
                ],
                &[
                    ("uri", "URI-9"),
                    ("awarding_sub_tier_agency_c", "1234"),
                    ("action_date", "01/04/2017"),
                    ("correction_delete_indicatr", "C"),
                ],
            ],
        );
        let df = read_submitted_csv(tmp.path()).unwrap();
        let rows = stage_assistance(&df, tmp.path()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].afa_generated_unique, "0_1234_abc-123_");
        assert_eq!(rows[0].cdi, CorrectionDeleteIndicator::Blank);
        assert_eq!(rows[0].correction_delete_indicatr, "L");
        assert_eq!(
            rows[0].action_date_parsed,
            chrono::NaiveDate::from_ymd_opt(2017, 1, 4)
        );
        assert_eq!(rows[0].federal_action_obligation, money("12.34"));

        assert_eq!(rows[1].afa_generated_unique, "_1234__uri-9");
        assert_eq!(rows[1].cdi, CorrectionDeleteIndicator::Correction);
        assert_eq!(
            rows[1].action_date_parsed,
            chrono::NaiveDate::from_ymd_opt(2017, 1, 4)
        );
    }

    #[test]
    fn fabs_without_a_uei_column_stages_blank_uei() {
        let mut tmp = NamedTempFile::new().unwrap();
        let layout = layout_for(SubmissionFile::Fabs);
        let header: Vec<&str> = layout
            .iter()
            .filter(|spec| spec.staging != "uei")
            .map(|spec| spec.aliases.first().copied().unwrap_or(spec.staging))
            .collect();
        let blanks = vec![""; header.len() - 1];
        writeln!(tmp, "{}", header.join(",")).unwrap();
        writeln!(tmp, "FAIN-1,{}", blanks.join(",")).unwrap();

        let df = read_submitted_csv(tmp.path()).unwrap();
        let rows = stage_assistance(&df, tmp.path()).unwrap();
        assert_eq!(rows[0].fain, "FAIN-1");
        assert_eq!(rows[0].uei, "");
    }

    #[test]
    fn out_of_vocabulary_indicator_stages_as_blank_with_raw_text() {
        let tmp = submitted_csv(
            SubmissionFile::Fabs,
            &[&[("fain", "F-1"), ("correction_delete_indicatr", "Z")]],
        );
        let df = read_submitted_csv(tmp.path()).unwrap();
        let rows = stage_assistance(&df, tmp.path()).unwrap();
        assert_eq!(rows[0].cdi, CorrectionDeleteIndicator::Blank);
        assert_eq!(rows[0].correction_delete_indicatr, "Z");
    }

    #[test]
    fn ingest_file_fills_the_staged_submission() {
        let submission = Submission {
            submission_id: 7,
            agency_code: "097".to_string(),
            fiscal_year: FiscalYear(2017),
            fiscal_period: FiscalPeriod::new(6).unwrap(),
            is_quarter_format: true,
        };
        let mut staged = StagedSubmission::new(submission);

        let tmp = submitted_csv(
            SubmissionFile::A,
            &[
                &[("agency_identifier", "97"), ("main_account_code", "804")],
                &[("agency_identifier", "97"), ("main_account_code", "805")],
            ],
        );
        let count = ingest_file(&mut staged, SubmissionFile::A, tmp.path()).unwrap();

        assert_eq!(count, 2);
        assert_eq!(staged.row_count(SubmissionFile::A), 2);
        assert_eq!(staged.present_files(), vec![SubmissionFile::A]);
    }
}
