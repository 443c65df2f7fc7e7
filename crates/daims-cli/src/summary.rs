use std::collections::BTreeMap;

use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use daims_model::Severity;

use crate::types::{LoadResult, ValidateResult};

pub fn print_validation_summary(result: &ValidateResult) {
    let submission = &result.submission;
    let cadence = if submission.is_quarter_format {
        "quarterly"
    } else {
        "monthly"
    };
    println!(
        "Submission: agency {} FY{} P{:02} ({cadence})",
        submission.agency_code,
        submission.fiscal_year.0,
        submission.fiscal_period.get()
    );
    for (file, rows) in &result.staged_counts {
        println!("  File {file}: {rows} rows");
    }
    println!("Error report: {}", result.error_report.display());
    println!("Warning report: {}", result.warning_report.display());
    println!("Run summary: {}", result.run_summary.display());

    if result.run.summaries.is_empty() {
        println!("No rule violations.");
    } else {
        let mut table = Table::new();
        table.set_header(vec![
            header_cell("Rule"),
            header_cell("File"),
            header_cell("Severity"),
            header_cell("Violations"),
            header_cell("Unique IDs"),
        ]);
        apply_summary_table_style(&mut table);
        align_column(&mut table, 3, CellAlignment::Right);
        align_column(&mut table, 4, CellAlignment::Right);
        for summary in &result.run.summaries {
            table.add_row(vec![
                rule_cell(&summary.rule_id.to_string()),
                Cell::new(summary.file),
                severity_cell(summary.severity),
                count_cell(summary.violations, severity_color(summary.severity)),
                Cell::new(summary.unique_id_count),
            ]);
        }
        table.add_row(vec![
            Cell::new("TOTAL")
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold),
            dim_cell("-"),
            dim_cell("-"),
            count_cell(result.run.issues.len(), Color::Red).add_attribute(Attribute::Bold),
            dim_cell("-"),
        ]);
        println!("{table}");
    }

    if !result.run.skipped.is_empty() {
        let mut by_dimension: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for skipped in &result.run.skipped {
            by_dimension
                .entry(skipped.missing.as_str())
                .or_default()
                .push(skipped.rule_id.to_string());
        }
        println!("Skipped rules (reference data not loaded):");
        for (dimension, rules) in by_dimension {
            println!("- {dimension}: {}", rules.join(", "));
        }
    }
    println!(
        "{} fatal, {} warning",
        result.run.fatal_count(),
        result.run.warning_count()
    );
}

pub fn print_load_summary(result: &LoadResult) {
    let outcome = &result.outcome;
    println!("Feed: {}", outcome.feed);
    println!("Snapshot: {}", result.snapshot.display());
    println!(
        "Window: {} .. {}",
        outcome.window.started.format("%Y-%m-%d %H:%M:%S"),
        outcome.window.finished.format("%Y-%m-%d %H:%M:%S")
    );
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Applied"),
        header_cell("Skipped"),
        header_cell("Inserted"),
        header_cell("Updated"),
        header_cell("Deactivated"),
        header_cell("Unchanged"),
    ]);
    apply_summary_table_style(&mut table);
    for index in 0..6 {
        align_column(&mut table, index, CellAlignment::Right);
    }
    table.add_row(vec![
        Cell::new(outcome.applied.len()),
        Cell::new(outcome.skipped.len()),
        count_cell(outcome.counts.inserted, Color::Green),
        count_cell(outcome.counts.updated, Color::Cyan),
        count_cell(outcome.counts.deactivated, Color::Yellow),
        Cell::new(outcome.counts.unchanged),
    ]);
    println!("{table}");
    if !outcome.applied.is_empty() {
        println!("Applied artifacts:");
        for artifact in &outcome.applied {
            println!("- {artifact}");
        }
    }
    if !outcome.skipped.is_empty() {
        println!("Skipped artifacts (already loaded):");
        for artifact in &outcome.skipped {
            println!("- {artifact}");
        }
    }
    println!("Manifest entries: {}", result.files_pinned);
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn rule_cell(id: &str) -> Cell {
    Cell::new(id).fg(Color::Blue).add_attribute(Attribute::Bold)
}

pub fn severity_cell(severity: Severity) -> Cell {
    match severity {
        Severity::Fatal => Cell::new("FATAL")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
        Severity::Warning => Cell::new("WARN").fg(Color::Yellow),
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Fatal => Color::Red,
        Severity::Warning => Color::Yellow,
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
