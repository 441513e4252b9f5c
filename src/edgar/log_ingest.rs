use crate::edgar::aggregate::aggregate_file;
use crate::edgar::config::{HttpConfig, YearRange};
use crate::edgar::extract::LogArchive;
use crate::edgar::fetch::{Fetcher, list_archive_urls};
use crate::edgar::ip_filter::IpFilter;
use crate::edgar::paths::{EdgarPaths, processed_file_name};
use crate::edgar::scratch::ScratchFile;
use crate::edgar::table::write_aggregates;
use crate::error::EdgarError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearIngestOutcome {
    pub year: i32,
    pub archives_listed: usize,
    pub archives_failed: usize,
    pub members_processed: usize,
    pub members_failed: usize,
    pub files_written: usize,
    pub rows_written: usize,
}

pub struct LogIngestion<'a> {
    fetcher: &'a dyn Fetcher,
    http: &'a HttpConfig,
    paths: &'a EdgarPaths,
    prefix: &'a str,
    filter: &'a IpFilter,
}

fn archive_file_name(url: &str) -> &str {
    url.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("archive.zip")
}

impl<'a> LogIngestion<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        http: &'a HttpConfig,
        paths: &'a EdgarPaths,
        prefix: &'a str,
        filter: &'a IpFilter,
    ) -> Self {
        Self {
            fetcher,
            http,
            paths,
            prefix,
            filter,
        }
    }

    pub fn run(&self, years: YearRange) -> Vec<YearIngestOutcome> {
        info!(years = %years, "starting log download and processing");
        let outcomes = years
            .years()
            .map(|year| self.ingest_year(year))
            .collect::<Vec<_>>();
        info!("log download and processing finished");
        outcomes
    }

    pub fn ingest_year(&self, year: i32) -> YearIngestOutcome {
        info!(year, "processing logs");
        let mut outcome = YearIngestOutcome {
            year,
            ..YearIngestOutcome::default()
        };

        let urls = match list_archive_urls(self.fetcher, self.http, year) {
            Ok(urls) => urls,
            Err(err) => {
                error!(year, err = %format!("{err:#}"), "failed to list log archives");
                return outcome;
            }
        };
        if urls.is_empty() {
            warn!(year, page = %self.http.log_index_url(year), "no log archives found on index page");
            return outcome;
        }
        outcome.archives_listed = urls.len();

        let year_dir = self.paths.year_dir(year);
        for url in &urls {
            if let Err(err) = self.ingest_archive(url, &year_dir, &mut outcome) {
                outcome.archives_failed += 1;
                match err.downcast_ref::<EdgarError>() {
                    Some(EdgarError::CorruptArchive(path)) => {
                        error!(path, "bad zip file encountered; skipping");
                    }
                    _ => error!(url, err = %format!("{err:#}"), "failed during extraction or processing"),
                }
            }
        }

        info!(
            year,
            archives = outcome.archives_listed,
            failed = outcome.archives_failed,
            files = outcome.files_written,
            rows = outcome.rows_written,
            "year processed"
        );
        outcome
    }

    fn ingest_archive(&self, url: &str, year_dir: &Path, outcome: &mut YearIngestOutcome) -> Result<()> {
        let archive_file = ScratchFile::new(year_dir.join(archive_file_name(url)));
        if !self.fetcher.fetch_to_file(url, archive_file.path()) {
            return Err(EdgarError::Fetch {
                url: url.to_string(),
                reason: "download failed".to_string(),
            }
            .into());
        }

        let mut archive = LogArchive::open(archive_file.path())?;
        let members = archive.member_names(&self.http.member_suffix);
        if members.is_empty() {
            warn!(url, suffix = %self.http.member_suffix, "no log files found in archive");
            return Ok(());
        }

        for member in &members {
            let extracted = match archive.extract_member(member, year_dir) {
                Ok(extracted) => extracted,
                Err(err) => {
                    outcome.members_failed += 1;
                    error!(url, member, err = %format!("{err:#}"), "failed to extract log file");
                    continue;
                }
            };
            outcome.members_processed += 1;
            match self.process_member(extracted.path(), year_dir) {
                Ok(Some((path, rows))) => {
                    outcome.files_written += 1;
                    outcome.rows_written += rows;
                    debug!(path = %path.display(), rows, "wrote aggregated log file");
                }
                Ok(None) => debug!(member, "no rows left after filtering"),
                Err(err) => {
                    outcome.members_failed += 1;
                    error!(member, err = %format!("{err:#}"), "failed to process log file");
                }
            }
        }
        Ok(())
    }

    /// Aggregates one extracted daily file and writes the result next to it.
    /// Returns the written path and row count, or `None` when nothing survived
    /// filtering.
    pub fn process_member(&self, raw_path: &Path, year_dir: &Path) -> Result<Option<(PathBuf, usize)>> {
        let raw_name = raw_path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("unusable file name {}", raw_path.display()))?;
        let aggregate = aggregate_file(raw_path, self.filter)?;
        debug!(
            file = raw_name,
            read = aggregate.rows_read,
            kept = aggregate.rows_kept,
            "log file filtered"
        );
        if aggregate.rows.is_empty() {
            return Ok(None);
        }

        let out_path = year_dir.join(processed_file_name(self.prefix, raw_name));
        write_aggregates(&out_path, &aggregate.rows)?;
        Ok(Some((out_path, aggregate.rows.len())))
    }
}
