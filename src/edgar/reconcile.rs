use crate::edgar::config::YearRange;
use crate::edgar::master_index::MasterIndex;
use crate::edgar::model::{AggregatedLogRow, MergedRow, normalize_accession};
use crate::edgar::paths::EdgarPaths;
use crate::edgar::table::{read_aggregates, save_dataset};
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

pub struct ReconciliationEngine<'a> {
    paths: &'a EdgarPaths,
    log_years: YearRange,
    prefix: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub rows: Vec<MergedRow>,
    pub years_merged: usize,
    pub saved: bool,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(paths: &'a EdgarPaths, log_years: YearRange, prefix: &'a str) -> Self {
        Self {
            paths,
            log_years,
            prefix,
        }
    }

    /// Joins every persisted aggregate against `index` and saves the result.
    /// A failed save is logged; the rows are returned either way.
    pub fn merge(&self, index: &MasterIndex) -> MergeOutcome {
        if index.is_empty() {
            error!("master index is empty; cannot merge");
            return MergeOutcome::default();
        }

        info!(years = %self.log_years, "merging log data with master index");
        let mut outcome = MergeOutcome::default();
        for year in self.log_years.years() {
            let logs = self.load_year(year);
            if logs.is_empty() {
                warn!(year, "no processed log data; skipping year");
                continue;
            }
            let merged = join_with_index(logs, index);
            info!(year, rows = merged.len(), "year merged");
            outcome.rows.extend(merged);
            outcome.years_merged += 1;
        }

        if outcome.rows.is_empty() {
            warn!("no data was merged");
            return outcome;
        }

        sort_merged(&mut outcome.rows);
        match save_dataset(&self.paths.output_file, &outcome.rows) {
            Ok(()) => {
                outcome.saved = true;
                info!(
                    path = %self.paths.output_file.display(),
                    rows = outcome.rows.len(),
                    "final dataset saved"
                );
            }
            Err(err) => {
                error!(path = %self.paths.output_file.display(), err = %format!("{err:#}"), "failed to save final dataset");
            }
        }
        outcome
    }

    /// Loadable aggregate rows for one year. Unreadable or empty files are
    /// skipped with a warning.
    pub fn load_year(&self, year: i32) -> Vec<AggregatedLogRow> {
        let files = match self.processed_files(year) {
            Ok(files) => files,
            Err(err) => {
                warn!(year, err = %format!("{err:#}"), "cannot list processed log files");
                return Vec::new();
            }
        };

        let mut rows = Vec::new();
        for path in files {
            match read_aggregates(&path) {
                Ok(loaded) if loaded.is_empty() => {
                    warn!(path = %path.display(), "processed log file is empty; skipping");
                }
                Ok(loaded) => rows.extend(loaded),
                Err(err) => {
                    warn!(path = %path.display(), err = %format!("{err:#}"), "could not read processed log file; skipping");
                }
            }
        }
        rows
    }

    fn processed_files(&self, year: i32) -> Result<Vec<PathBuf>> {
        let dir = self.paths.year_dir(year);
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(self.prefix) && name.ends_with(".csv"));
            if matches && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Log rows are primary; a row without an index match is dropped and a row
/// with several matches yields one output row per match.
pub fn join_with_index(logs: Vec<AggregatedLogRow>, index: &MasterIndex) -> Vec<MergedRow> {
    let mut merged = Vec::with_capacity(logs.len());
    let mut unmatched = 0usize;
    for mut log in logs {
        log.accession = normalize_accession(&log.accession);
        let key = log.join_key();
        let before = merged.len();
        merged.extend(index.lookup(&key).map(|entry| MergedRow::from_parts(&log, entry)));
        if merged.len() == before {
            unmatched += 1;
        }
    }
    if unmatched > 0 {
        info!(unmatched, "dropped log rows without a matching filing");
    }
    merged
}

pub fn sort_merged(rows: &mut [MergedRow]) {
    rows.sort_by(|a, b| {
        a.cik
            .cmp(&b.cik)
            .then(a.date.cmp(&b.date))
            .then_with(|| a.form.cmp(&b.form))
    });
}
