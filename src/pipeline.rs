//! Enrichment run: walk the checkpoint table from its resume point, look each
//! pending title up through a [`DetailSource`], and persist progress.
//!
//! Everything is awaited in sequence on one task: at most one lookup is in
//! flight and every pause blocks the run.

use crate::checkpoint::{normalize_abstract, parse_impact_factor, CheckpointStore, CheckpointTable, TargetFields};
use crate::config::EnrichConfig;
use crate::error::Result;
use crate::matcher::TitleMatcher;
use crate::pacing::{RateGovernor, Sleeper, TokioSleeper};
use crate::partition::{partition, write_partition, Partition};
use crate::paths::OutputPaths;
use crate::retry::{AttemptOutcome, RetryPolicy};
use crate::source::{DetailSource, RawDetailRecord};
use std::collections::BTreeSet;
use tracing::{error, info, warn};

/// Separator for list fields in the table
const LIST_SEPARATOR: &str = ", ";

/// Row counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Rows looked at from the resume point (successes and failures)
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Already-complete rows past the resume point
    pub skipped: u64,
    /// Rows that went to the detail source
    pub lookups: u64,
}

/// Final table plus the rows that could not be enriched.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub table: CheckpointTable,
    /// Row indices (not sequence numbers) that failed this run
    pub failed: BTreeSet<usize>,
    pub stats: RunStats,
}

impl RunOutcome {
    pub fn partition(&self) -> Partition {
        partition(&self.table, &self.failed)
    }

    /// Partition and write the clean and abandon tables.
    pub fn write_outputs(&self, paths: &OutputPaths) -> Result<Partition> {
        let split = self.partition();
        write_partition(&split, &paths.clean, &paths.abandon)?;
        Ok(split)
    }
}

/// Drives one enrichment run against a detail source.
pub struct Enricher<S, Z = TokioSleeper> {
    source: S,
    sleeper: Z,
    retry: RetryPolicy,
    governor: RateGovernor,
    matcher: TitleMatcher,
    save_interval: u64,
    last_name: String,
}

impl<S: DetailSource> Enricher<S, TokioSleeper> {
    pub fn new(source: S, config: &EnrichConfig, last_name: impl Into<String>) -> Self {
        Self::with_sleeper(source, TokioSleeper, config, last_name)
    }
}

impl<S: DetailSource, Z: Sleeper> Enricher<S, Z> {
    pub fn with_sleeper(
        source: S,
        sleeper: Z,
        config: &EnrichConfig,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            source,
            sleeper,
            retry: RetryPolicy::from_config(config),
            governor: RateGovernor::from_config(config),
            matcher: TitleMatcher::new(config.match_threshold),
            save_interval: config.save_interval.max(1),
            last_name: last_name.into(),
        }
    }

    /// Replace the pacing governor (e.g. with a seeded one).
    pub fn with_governor(mut self, governor: RateGovernor) -> Self {
        self.governor = governor;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sleeper(&self) -> &Z {
        &self.sleeper
    }

    /// Enrich every incomplete row from the resume point onwards.
    ///
    /// Per-row failures are recorded in the outcome; only checkpoint storage
    /// errors end the run early.
    pub async fn run(&mut self, mut table: CheckpointTable, store: &CheckpointStore) -> Result<RunOutcome> {
        let start = table.resume_index();
        info!(
            resume_row = start + 1,
            total = table.len(),
            complete = table.complete_count(),
            "Starting enrichment"
        );

        let mut failed = BTreeSet::new();
        let mut stats = RunStats::default();

        for index in start..table.len() {
            let Some(row) = table.row(index) else {
                break;
            };
            if row.is_complete() {
                stats.skipped += 1;
                continue;
            }

            let sequence = row.sequence_number;
            let title = row.title.trim().to_string();
            info!(row = sequence, title = %title, "Processing");

            let record = if title.is_empty() {
                warn!(row = sequence, "Empty title, nothing to look up");
                None
            } else {
                self.governor.pause_before_lookup(&self.sleeper).await;
                stats.lookups += 1;
                self.lookup(&title).await
            };

            let row_failed = match record {
                Some(record) => {
                    table.set_fields(index, convert_record(&record))?;
                    stats.succeeded += 1;
                    info!(row = sequence, "Row enriched");
                    false
                }
                None => {
                    table.clear_fields(index)?;
                    failed.insert(index);
                    stats.failed += 1;
                    warn!(row = sequence, title = %title, "Row failed");
                    true
                }
            };

            stats.processed += 1;
            if row_failed || stats.processed % self.save_interval == 0 {
                checkpoint(store, &table)?;
            }

            self.governor.pause_after_row(&self.sleeper).await;
        }

        table.normalize_abstracts();
        checkpoint(store, &table)?;

        info!(
            processed = stats.processed,
            succeeded = stats.succeeded,
            failed = stats.failed,
            skipped = stats.skipped,
            lookups = stats.lookups,
            "Enrichment finished"
        );
        Ok(RunOutcome {
            table,
            failed,
            stats,
        })
    }

    async fn lookup(&self, title: &str) -> Option<RawDetailRecord> {
        let source = &self.source;
        let matcher = self.matcher;
        let last_name = self.last_name.as_str();
        self.retry
            .run(&self.sleeper, title, || lookup_once(source, matcher, title, last_name))
            .await
    }
}

/// One attempt: search, read the entered record, check its title.
async fn lookup_once<S: DetailSource + ?Sized>(
    source: &S,
    matcher: TitleMatcher,
    title: &str,
    last_name: &str,
) -> Result<AttemptOutcome<RawDetailRecord>> {
    let state = source.search(title).await?;
    if !state.entered() {
        return Ok(AttemptOutcome::Terminal("no search results".to_string()));
    }

    let record = source.fetch_details(last_name).await?;
    if !matcher.is_match(title, &record.title) {
        warn!(requested = %title, found = %record.title, "Title mismatch");
        return Ok(AttemptOutcome::Terminal("title mismatch".to_string()));
    }
    Ok(AttemptOutcome::Success(record))
}

/// Coerce a scraped record into table values.
pub fn convert_record(record: &RawDetailRecord) -> TargetFields {
    TargetFields {
        impact_factor: record.impact_factor.as_deref().and_then(parse_impact_factor),
        author_keywords: record.author_keywords.join(LIST_SEPARATOR),
        keywords_plus: record.keywords_plus.join(LIST_SEPARATOR),
        institution: record.address.institution.trim().to_string(),
        country: record.address.country.trim().to_string(),
        doi: record.doi.trim().to_string(),
        abstract_text: normalize_abstract(&record.abstract_text),
    }
}

/// Save, and on failure try once more before giving up.
fn checkpoint(store: &CheckpointStore, table: &CheckpointTable) -> Result<()> {
    let Err(e) = store.save(table) else {
        return Ok(());
    };
    error!(error = %e, "Checkpoint save failed, attempting emergency save");
    match store.save(table) {
        Ok(()) => warn!(path = %store.path().display(), "Emergency save written"),
        Err(emergency) => error!(error = %emergency, "Emergency save failed"),
    }
    Err(e)
}
