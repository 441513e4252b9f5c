use crate::edgar::config::{HttpConfig, YearRange};
use crate::edgar::fetch::Fetcher;
use crate::edgar::model::{MasterIndexEntry, join_key_from_index};
use crate::edgar::paths::{EdgarPaths, QUARTERS};
use crate::error::EdgarError;
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

pub const HEADER_SIGNATURE: &str = "CIK|Company Name|Form Type|Date Filed|Filename";
pub const DEFAULT_SKIP_LINES: usize = 9;
const EXPECTED_COLUMNS: [&str; 4] = ["CIK", "Form Type", "Date Filed", "Filename"];

/// One data line of a quarterly `master.idx`, still all text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub cik: String,
    pub form_type: String,
    pub date_filed: String,
    pub filename: String,
}

impl IndexRow {
    fn into_entry(self) -> Option<MasterIndexEntry> {
        if self.form_type.is_empty() || self.filename.is_empty() {
            return None;
        }
        let date_filed = parse_filing_date(&self.date_filed)?;
        Some(MasterIndexEntry {
            acc_path: join_key_from_index(&self.filename),
            form_type: self.form_type,
            date_filed,
        })
    }
}

fn parse_filing_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y%m%d"))
        .ok()
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Zero-based line number of the column header line.
pub fn locate_header(text: &str) -> Option<usize> {
    text.lines().position(|line| line.contains(HEADER_SIGNATURE))
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// Parses one quarterly extract. A header lacking expected columns is
/// `EdgarError::MissingColumns`; every other failure, including an empty or
/// truncated file with no header at all, is a plain error.
pub fn parse_quarter_file(path: &Path) -> Result<Vec<IndexRow>> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let text = decode_latin1(&bytes);

    let skip = match locate_header(&text) {
        Some(line) => line,
        None => {
            warn!(
                path = %path.display(),
                skip = DEFAULT_SKIP_LINES,
                "standard header not found; using default skip"
            );
            DEFAULT_SKIP_LINES
        }
    };
    let body: String = text.split_inclusive('\n').skip(skip).collect();

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .quoting(false)
        .flexible(true)
        .from_reader(body.as_bytes());
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(anyhow!("no header row in {}", path.display()));
    }

    let missing = EXPECTED_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .map(|col| col.to_string())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(EdgarError::missing_columns(path, missing).into());
    }
    let at = |name: &str| headers.iter().position(|h| h == name).unwrap_or_default();
    let (cik_at, form_at, date_at, file_at) = (
        at("CIK"),
        at("Form Type"),
        at("Date Filed"),
        at("Filename"),
    );

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("bad line {} in {}", line + skip + 2, path.display()))?;
        let field = |i: usize| record.get(i).map(str::trim).unwrap_or_default().to_string();
        rows.push(IndexRow {
            cik: field(cik_at),
            form_type: field(form_at),
            date_filed: field(date_at),
            filename: field(file_at),
        });
    }

    // the dashed separator under the header parses as a row
    if rows.first().is_some_and(|row| !is_numeric(&row.cik)) {
        rows.remove(0);
    }
    Ok(rows)
}

/// The deduplicated table of (form type, filing date, join key).
#[derive(Debug, Clone, Default)]
pub struct MasterIndex {
    entries: Vec<MasterIndexEntry>,
    by_key: HashMap<String, Vec<usize>>,
}

impl MasterIndex {
    pub fn from_entries(entries: Vec<MasterIndexEntry>) -> Self {
        let entries = dedup_entries(entries);
        let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            by_key.entry(entry.acc_path.clone()).or_default().push(i);
        }
        Self { entries, by_key }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[MasterIndexEntry] {
        &self.entries
    }

    pub fn lookup<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a MasterIndexEntry> + 'a {
        self.by_key
            .get(key)
            .into_iter()
            .flatten()
            .map(|&i| &self.entries[i])
    }
}

/// Drops exact-duplicate rows, keeping the first occurrence.
pub fn dedup_entries(entries: Vec<MasterIndexEntry>) -> Vec<MasterIndexEntry> {
    let mut seen = HashSet::with_capacity(entries.len());
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}

/// Verified quarterly tables collected across the whole year range.
#[derive(Debug, Default)]
pub struct IndexAccumulator {
    quarters: Vec<Vec<IndexRow>>,
}

impl IndexAccumulator {
    pub fn push(&mut self, rows: Vec<IndexRow>) {
        self.quarters.push(rows);
    }

    pub fn quarters(&self) -> usize {
        self.quarters.len()
    }

    /// `None` when nothing usable was accumulated.
    pub fn finish(self) -> Option<MasterIndex> {
        if self.quarters.is_empty() {
            error!("no master index data was successfully downloaded or processed");
            return None;
        }

        let mut skipped = 0usize;
        let mut entries = Vec::new();
        for row in self.quarters.into_iter().flatten() {
            match row.into_entry() {
                Some(entry) => entries.push(entry),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, "dropped master index rows without form, date or filename");
        }

        let index = MasterIndex::from_entries(entries);
        if index.is_empty() {
            error!("master index holds no usable rows");
            return None;
        }
        Some(index)
    }
}

pub struct MasterIndexBuilder<'a> {
    fetcher: &'a dyn Fetcher,
    http: &'a HttpConfig,
    paths: &'a EdgarPaths,
    backoff: Duration,
}

impl<'a> MasterIndexBuilder<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, http: &'a HttpConfig, paths: &'a EdgarPaths) -> Self {
        Self {
            fetcher,
            http,
            paths,
            backoff: Duration::from_secs(http.index_retry_backoff_secs),
        }
    }

    pub fn build(&self, years: YearRange) -> Option<MasterIndex> {
        info!(years = %years, "starting master index download");
        let mut acc = IndexAccumulator::default();
        for year in years.years() {
            info!(year, "downloading master index");
            for quarter in QUARTERS {
                if let Some(rows) = self.fetch_quarter(year, quarter) {
                    info!(year, quarter, rows = rows.len(), "master index quarter parsed");
                    acc.push(rows);
                }
            }
        }
        let quarters = acc.quarters();
        let index = acc.finish()?;
        info!(quarters, entries = index.len(), "master index ready");
        Some(index)
    }

    /// Fetch and parse with bounded retries. Missing columns abandon the
    /// quarter at once; other faults delete the local file and retry.
    pub fn fetch_quarter(&self, year: i32, quarter: &str) -> Option<Vec<IndexRow>> {
        let url = self.http.master_index_url(year, quarter);
        let path = self.paths.master_index_file(year, quarter);
        let max = self.http.index_max_retries;

        for attempt in 1..=max {
            if !self.fetcher.fetch_to_file(&url, &path) {
                if attempt < max {
                    warn!(url, attempt = attempt + 1, max, "retrying master index download");
                    thread::sleep(self.backoff);
                } else {
                    error!(url, max, "failed to download master index after retries");
                }
                continue;
            }

            match parse_quarter_file(&path) {
                Ok(rows) => return Some(rows),
                Err(err) => {
                    if let Some(EdgarError::MissingColumns { missing, .. }) =
                        err.downcast_ref::<EdgarError>()
                    {
                        error!(
                            path = %path.display(),
                            ?missing,
                            "master index is missing expected columns; skipping this file"
                        );
                        return None;
                    }
                    error!(path = %path.display(), err = %format!("{err:#}"), "error processing master index");
                    if path.exists() {
                        let _ = fs::remove_file(&path);
                    }
                    if attempt < max {
                        warn!(url, attempt = attempt + 1, max, "retrying master index download/processing");
                        thread::sleep(self.backoff);
                    } else {
                        error!(url, max, "failed to process master index after retries");
                    }
                }
            }
        }
        None
    }

    #[cfg(test)]
    fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}
