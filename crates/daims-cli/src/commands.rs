use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::{Duration, Utc};
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{info, info_span};

use daims_feeds::{
    AgencyLoader, AssistanceListingLoader, CountryLoader, DefcLoader, NoPublicLaws,
    ObjectClassLoader, ProgramActivityLoader, SamRecipientLoader, SamUnregisteredLoader,
    Sf133Loader, SubmissionWindowLoader, TasLoader, UspsZipLoader,
};
use daims_ingest::ingest_file;
use daims_model::{
    CancelToken, FiscalPeriod, FiscalYear, PublishedStore, PublishedSubmission, Severity,
    StagedSubmission, Submission, SubmissionFile,
};
use daims_reference::{
    FeedLoader, FeedLocks, LoadOptions, LoadRunner, LocalDirSource, MANIFEST_FILE, ReferenceStore,
    SystemClock, verify_and_load, write_snapshot,
};
use daims_rules::RuleCatalog;
use daims_validate::{Resolver, validate, write_report_csv, write_run_json};

use crate::cli::{FeedArg, FileArg, LoadArgs, RulesArgs, StatusArgs, ValidateArgs};
use crate::summary::apply_table_style;
use crate::types::{LoadResult, ValidateResult};

pub fn run_validate(args: &ValidateArgs) -> Result<ValidateResult> {
    if args.file_a.is_none() && args.file_b.is_none() && args.file_c.is_none() && args.fabs.is_none()
    {
        bail!("nothing to validate: pass --file-a/--file-b/--file-c or --fabs");
    }
    let fiscal_period = FiscalPeriod::new(args.period).context("invalid fiscal period")?;
    let submission = Submission {
        submission_id: 1,
        agency_code: args.agency.clone(),
        fiscal_year: FiscalYear(args.fiscal_year),
        fiscal_period,
        is_quarter_format: args.quarter,
    };
    let span = info_span!(
        "validate",
        agency = %submission.agency_code,
        fiscal_year = args.fiscal_year,
        period = args.period
    );
    let _guard = span.enter();

    let snapshot_start = Instant::now();
    let snapshot = verify_and_load(&args.snapshot).context("open reference snapshot")?;
    info!(
        snapshot = %args.snapshot.display(),
        files_verified = snapshot.files_verified,
        duration_ms = snapshot_start.elapsed().as_millis(),
        "reference snapshot verified"
    );
    if let Some(days) = args.max_stale_days {
        check_staleness(&snapshot.store, days)?;
    }

    let published = match &args.published {
        Some(path) => load_published(path)
            .with_context(|| format!("read published history {}", path.display()))?,
        None => PublishedStore::new(),
    };

    let mut staged = StagedSubmission::new(submission.clone());
    let mut staged_counts = Vec::new();
    for (file, path) in [
        (SubmissionFile::A, args.file_a.as_ref()),
        (SubmissionFile::B, args.file_b.as_ref()),
        (SubmissionFile::C, args.file_c.as_ref()),
        (SubmissionFile::Fabs, args.fabs.as_ref()),
    ] {
        let Some(path) = path else { continue };
        let rows = ingest_file(&mut staged, file, path)
            .with_context(|| format!("ingest file {file} from {}", path.display()))?;
        staged_counts.push((file, rows));
    }

    let catalog = RuleCatalog::standard().context("build rule catalog")?;
    let resolver = Resolver::new(&snapshot.store, &published, &staged);
    let cancel = CancelToken::new();
    let run_start = Instant::now();
    let run = validate(&catalog, &staged, &resolver, &cancel).context("run validation")?;
    info!(
        rules = catalog.len(),
        issues = run.issues.len(),
        fatal = run.fatal_count(),
        warnings = run.warning_count(),
        skipped = run.skipped.len(),
        duration_ms = run_start.elapsed().as_millis(),
        "validation complete"
    );

    fs::create_dir_all(&args.reports_dir)
        .with_context(|| format!("create reports dir {}", args.reports_dir.display()))?;
    let error_report = args.reports_dir.join("error_report.csv");
    let warning_report = args.reports_dir.join("warning_report.csv");
    let run_summary = args.reports_dir.join("validation_run.json");
    write_report_csv(&error_report, &run.issues, Some(Severity::Fatal))
        .context("write error report")?;
    write_report_csv(&warning_report, &run.issues, Some(Severity::Warning))
        .context("write warning report")?;
    write_run_json(&run_summary, &run).context("write run summary")?;

    Ok(ValidateResult {
        submission,
        staged_counts,
        run,
        error_report,
        warning_report,
        run_summary,
    })
}

pub fn run_load(args: &LoadArgs) -> Result<LoadResult> {
    let loader = feed_loader(args.feed);
    let feed = loader.feed_key();
    let span = info_span!("load", feed);
    let _guard = span.enter();

    let mut store = if args.snapshot.join(MANIFEST_FILE).exists() {
        verify_and_load(&args.snapshot)
            .context("open reference snapshot")?
            .store
    } else {
        ReferenceStore::new()
    };
    let source = LocalDirSource::new(&args.artifacts);
    let locks = FeedLocks::new();
    let clock = SystemClock;
    let runner = LoadRunner::new(&source, &locks, &clock);
    let cancel = CancelToken::new();

    let progress = load_spinner(feed);
    let start = Instant::now();
    let outcome = runner.run(
        loader.as_ref(),
        &mut store,
        &cancel,
        LoadOptions { force: args.force },
    );
    progress.finish_and_clear();
    let outcome = outcome.with_context(|| format!("load feed {feed}"))?;
    info!(
        feed = %outcome.feed,
        applied = outcome.applied.len(),
        skipped = outcome.skipped.len(),
        inserted = outcome.counts.inserted,
        updated = outcome.counts.updated,
        deactivated = outcome.counts.deactivated,
        duration_ms = start.elapsed().as_millis(),
        "feed load complete"
    );
    let manifest = write_snapshot(&store, &args.snapshot)
        .with_context(|| format!("write snapshot {}", args.snapshot.display()))?;
    Ok(LoadResult {
        outcome,
        snapshot: args.snapshot.clone(),
        files_pinned: manifest.files.len(),
    })
}

pub fn run_rules(args: &RulesArgs) -> Result<()> {
    let catalog = RuleCatalog::standard().context("build rule catalog")?;
    let want = args.file.map(submission_file);
    let mut table = Table::new();
    table.set_header(vec!["Rule", "File", "Severity", "Checks"]);
    apply_table_style(&mut table);
    let mut listed = 0usize;
    for rule in catalog.rules() {
        if let Some(file) = want
            && rule.file != file
        {
            continue;
        }
        table.add_row(vec![
            rule.id.to_string(),
            rule.file.to_string(),
            rule.severity.to_string(),
            rule.message.to_string(),
        ]);
        listed += 1;
    }
    println!("{table}");
    println!("{listed} rules");
    Ok(())
}

pub fn run_status(args: &StatusArgs) -> Result<()> {
    let snapshot = verify_and_load(&args.snapshot).context("open reference snapshot")?;
    println!("Snapshot: {}", args.snapshot.display());
    println!(
        "Schema: {} v{}",
        snapshot.manifest.manifest.schema, snapshot.manifest.manifest.schema_version
    );
    println!("Files verified: {}", snapshot.files_verified);
    if snapshot.store.stamps.is_empty() {
        println!("No feeds loaded yet.");
        return Ok(());
    }
    let now = Utc::now();
    let mut table = Table::new();
    table.set_header(vec!["Feed", "Loaded", "Artifacts", "Status"]);
    apply_table_style(&mut table);
    for (feed, stamp) in snapshot.store.stamps.iter() {
        let loaded = match &stamp.window {
            Some(window) => window.finished.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => "never".to_string(),
        };
        let status = match (args.max_stale_days, &stamp.window) {
            (Some(days), Some(_)) => {
                if snapshot.store.stamps.is_stale(feed, Duration::days(days), now) {
                    "stale"
                } else {
                    "fresh"
                }
            }
            _ => "-",
        };
        table.add_row(vec![
            feed.to_string(),
            loaded,
            stamp.applied_artifacts.len().to_string(),
            status.to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Historical published submissions, as exported by the publish side of the
/// broker. Each record keys one certified submission by agency and year.
#[derive(Debug, Deserialize)]
struct PublishedRecord {
    agency_code: String,
    fiscal_year: u16,
    submission: PublishedSubmission,
}

fn load_published(path: &Path) -> Result<PublishedStore> {
    let file = File::open(path)?;
    let records: Vec<PublishedRecord> = serde_json::from_reader(BufReader::new(file))?;
    let mut store = PublishedStore::new();
    for record in records {
        store.publish(
            &record.agency_code,
            FiscalYear(record.fiscal_year),
            record.submission,
        );
    }
    Ok(store)
}

fn check_staleness(store: &ReferenceStore, max_days: i64) -> Result<()> {
    let now = Utc::now();
    let max_age = Duration::days(max_days);
    let stale: Vec<&str> = store
        .stamps
        .iter()
        .filter(|(_, stamp)| stamp.window.is_some())
        .filter(|(feed, _)| store.stamps.is_stale(feed, max_age, now))
        .map(|(feed, _)| feed)
        .collect();
    if stale.is_empty() {
        Ok(())
    } else {
        bail!(
            "reference feeds older than {max_days} days: {}",
            stale.join(", ")
        );
    }
}

fn feed_loader(feed: FeedArg) -> Box<dyn FeedLoader> {
    match feed {
        FeedArg::Agencies => Box::new(AgencyLoader::new()),
        FeedArg::AssistanceListings => Box::new(AssistanceListingLoader::new()),
        FeedArg::Countries => Box::new(CountryLoader::new()),
        FeedArg::Defc => Box::new(DefcLoader::new(Box::new(NoPublicLaws))),
        FeedArg::ObjectClasses => Box::new(ObjectClassLoader::new()),
        FeedArg::ProgramActivity => Box::new(ProgramActivityLoader::new()),
        FeedArg::Sam => Box::new(SamRecipientLoader::default()),
        FeedArg::SamUnregistered => Box::new(SamUnregisteredLoader::default()),
        FeedArg::Sf133 => Box::new(Sf133Loader::new()),
        FeedArg::SubmissionWindows => Box::new(SubmissionWindowLoader::new()),
        FeedArg::Tas => Box::new(TasLoader::new()),
        FeedArg::UspsZip => Box::new(UspsZipLoader::new()),
    }
}

fn submission_file(file: FileArg) -> SubmissionFile {
    match file {
        FileArg::A => SubmissionFile::A,
        FileArg::B => SubmissionFile::B,
        FileArg::C => SubmissionFile::C,
        FileArg::Fabs => SubmissionFile::Fabs,
    }
}

fn load_spinner(feed: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(format!("loading {feed}"));
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));
    spinner
}

#[cfg(test)]
mod tests {
    use super::*;
    use daims_model::{Money, MoneyCell, PublishedAssistance};

    #[test]
    fn every_feed_choice_maps_to_its_loader() {
        let cases = [
            (FeedArg::Agencies, "agencies"),
            (FeedArg::AssistanceListings, "assistance_listings"),
            (FeedArg::Countries, "countries"),
            (FeedArg::Defc, "defc"),
            (FeedArg::ObjectClasses, "object_classes"),
            (FeedArg::ProgramActivity, "program_activity"),
            (FeedArg::Sam, "sam"),
            (FeedArg::SamUnregistered, "sam_unregistered"),
            (FeedArg::Sf133, "sf133"),
            (FeedArg::SubmissionWindows, "submission_windows"),
            (FeedArg::Tas, "tas"),
            (FeedArg::UspsZip, "usps_zip"),
        ];
        for (arg, key) in cases {
            assert_eq!(feed_loader(arg).feed_key(), key);
        }
    }

    #[test]
    fn published_history_files_feed_the_store() {
        let submission = PublishedSubmission {
            fiscal_period: 3,
            award_financial: Vec::new(),
            assistance: vec![PublishedAssistance {
                unique_id: "0_abc_fain1_".to_string(),
                fain: "FAIN1".to_string(),
                uri: String::new(),
                federal_action_obligation: MoneyCell::Value(Money::from_dollars(25)),
            }],
        };
        let records = serde_json::json!([{
            "agency_code": "097",
            "fiscal_year": 2017,
            "submission": serde_json::to_value(&submission).unwrap(),
        }]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("published.json");
        fs::write(&path, serde_json::to_vec_pretty(&records).unwrap()).unwrap();

        let store = load_published(&path).unwrap();
        assert!(!store.is_empty());
        assert_eq!(store.all_assistance().count(), 1);
    }
}
