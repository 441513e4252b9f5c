use crate::edgar::ip_filter::IpFilter;
use crate::edgar::model::{AggregatedLogRow, FileTypeCounts, RawLogRow, ValidLogRow};
use crate::error::EdgarError;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::BTreeMap;
use std::path::Path;

pub const BATCH_ROWS: usize = 100_000;

#[derive(Debug, Clone, Copy)]
struct LogColumns {
    ip: usize,
    date: usize,
    cik: usize,
    accession: usize,
    extension: usize,
    code: usize,
    idx: usize,
    crawler: usize,
}

impl LogColumns {
    const REQUIRED: [&'static str; 8] = [
        "ip",
        "date",
        "cik",
        "accession",
        "extention",
        "code",
        "idx",
        "crawler",
    ];

    fn locate(headers: &StringRecord, path: &Path) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        let missing = Self::REQUIRED
            .iter()
            .filter(|name| find(name.trim()).is_none())
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(EdgarError::missing_columns(path, missing).into());
        }
        let at = |name: &str| find(name).unwrap_or_default();
        Ok(Self {
            ip: at("ip"),
            date: at("date"),
            cik: at("cik"),
            accession: at("accession"),
            extension: at("extention"),
            code: at("code"),
            idx: at("idx"),
            crawler: at("crawler"),
        })
    }

    fn raw_row(&self, record: &StringRecord) -> RawLogRow {
        let text = |i: usize| {
            record
                .get(i)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToOwned::to_owned)
        };
        let number = |i: usize| record.get(i).and_then(|v| v.trim().parse::<f64>().ok());
        RawLogRow {
            date: text(self.date),
            cik: text(self.cik),
            accession: text(self.accession),
            extension: text(self.extension),
            ip: text(self.ip),
            code: number(self.code),
            idx: number(self.idx),
            crawler: number(self.crawler),
        }
    }
}

pub fn drop_crawlers(rows: Vec<RawLogRow>) -> Vec<RawLogRow> {
    rows.into_iter().filter(|row| !row.is_crawler()).collect()
}

pub fn drop_index_pages(rows: Vec<RawLogRow>) -> Vec<RawLogRow> {
    rows.into_iter().filter(|row| !row.is_index_page()).collect()
}

pub fn drop_success_responses(rows: Vec<RawLogRow>) -> Vec<RawLogRow> {
    rows.into_iter()
        .filter(|row| !row.is_success_response())
        .collect()
}

pub fn drop_incomplete(rows: Vec<RawLogRow>) -> Vec<ValidLogRow> {
    rows.iter().filter_map(ValidLogRow::from_raw).collect()
}

pub fn keep_allowed_addresses(rows: Vec<ValidLogRow>, filter: &IpFilter) -> Vec<ValidLogRow> {
    if !filter.is_enabled() {
        return rows;
    }
    rows.into_iter().filter(|row| filter.matches(&row.ip)).collect()
}

/// Runs every filter stage in order, stopping as soon as a stage empties the batch.
pub fn filter_batch(rows: Vec<RawLogRow>, filter: &IpFilter) -> Vec<ValidLogRow> {
    let rows = drop_crawlers(rows);
    if rows.is_empty() {
        return Vec::new();
    }
    let rows = drop_index_pages(rows);
    if rows.is_empty() {
        return Vec::new();
    }
    let rows = drop_success_responses(rows);
    if rows.is_empty() {
        return Vec::new();
    }
    let rows = drop_incomplete(rows);
    if rows.is_empty() {
        return Vec::new();
    }
    keep_allowed_addresses(rows, filter)
}

#[derive(Debug, Default)]
pub struct LogAggregator {
    groups: BTreeMap<(NaiveDate, u64, String), FileTypeCounts>,
}

impl LogAggregator {
    pub fn absorb(&mut self, rows: Vec<ValidLogRow>) {
        for row in rows {
            let file_type = row.file_type();
            self.groups
                .entry((row.date, row.cik, row.accession))
                .or_default()
                .add(file_type);
        }
    }

    /// Rows come out ordered by (date, filer, accession).
    pub fn finish(self) -> Vec<AggregatedLogRow> {
        self.groups
            .into_iter()
            .map(|((date, cik, accession), counts)| {
                AggregatedLogRow::new(date, cik, accession, counts)
            })
            .collect()
    }
}

#[cfg(test)]
pub fn aggregate(rows: Vec<RawLogRow>, filter: &IpFilter) -> Vec<AggregatedLogRow> {
    let mut aggregator = LogAggregator::default();
    aggregator.absorb(filter_batch(rows, filter));
    aggregator.finish()
}

#[derive(Debug, Default)]
pub struct FileAggregate {
    pub rows: Vec<AggregatedLogRow>,
    pub rows_read: usize,
    pub rows_kept: usize,
}

/// Streams one daily log file through the filter stages in batches.
///
/// A file with no header at all yields an empty aggregate; a header lacking
/// any required column is an error.
pub fn aggregate_file(path: &Path, filter: &IpFilter) -> Result<FileAggregate> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .clone();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Ok(FileAggregate::default());
    }
    let columns = LogColumns::locate(&headers, path)?;

    let mut out = FileAggregate::default();
    let mut aggregator = LogAggregator::default();
    let mut batch = Vec::with_capacity(BATCH_ROWS);
    let mut record = StringRecord::new();

    loop {
        let more = reader
            .read_record(&mut record)
            .with_context(|| format!("malformed row in {}", path.display()))?;
        if more {
            batch.push(columns.raw_row(&record));
            out.rows_read += 1;
        }
        if batch.len() >= BATCH_ROWS || (!more && !batch.is_empty()) {
            let kept = filter_batch(std::mem::take(&mut batch), filter);
            out.rows_kept += kept.len();
            aggregator.absorb(kept);
        }
        if !more {
            break;
        }
    }

    out.rows = aggregator.finish();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::tempdir;

    fn row(ext: &str, code: f64, crawler: f64, idx: f64) -> RawLogRow {
        RawLogRow {
            date: Some("2017-01-01".to_string()),
            cik: Some("1000045".to_string()),
            accession: Some("0001193125-17-036701".to_string()),
            extension: Some(ext.to_string()),
            ip: Some("192.168.10.jja".to_string()),
            code: Some(code),
            idx: Some(idx),
            crawler: Some(crawler),
        }
    }

    const HEADER: &str = "ip,date,time,zone,cik,accession,extention,code,size,idx,norefer,noagent,find,crawler,browser\n";

    #[test]
    fn htm_and_xml_requests_collapse_into_one_row() {
        // code 200 rows are success responses and are dropped, so use redirects
        let rows = vec![row("htm", 301.0, 0.0, 0.0), row("xml", 301.0, 0.0, 0.0)];
        let out = aggregate(rows, &IpFilter::disabled());
        assert_eq!(out.len(), 1);
        let got = &out[0];
        assert_eq!(got.total, 2);
        assert_eq!(got.markup, 1);
        assert_eq!(got.other, 1);
        assert_eq!(got.plain_text, 0);
        assert_eq!(got.structured, 0);
    }

    #[test]
    fn success_responses_are_dropped() {
        let rows = vec![row("htm", 200.0, 0.0, 0.0), row("xml", 200.0, 0.0, 0.0)];
        assert!(aggregate(rows, &IpFilter::disabled()).is_empty());
    }

    #[test]
    fn crawler_rows_are_excluded() {
        let rows = vec![row("htm", 200.0, 1.0, 0.0), row("htm", 404.0, 1.0, 0.0)];
        assert!(aggregate(rows, &IpFilter::disabled()).is_empty());
    }

    #[test]
    fn index_page_rows_are_excluded() {
        let rows = vec![row("htm", 404.0, 0.0, 1.0)];
        assert!(aggregate(rows, &IpFilter::disabled()).is_empty());
    }

    #[test]
    fn incomplete_rows_are_excluded() {
        let mut no_cik = row("txt", 404.0, 0.0, 0.0);
        no_cik.cik = None;
        let mut no_ip = row("txt", 404.0, 0.0, 0.0);
        no_ip.ip = None;
        let kept = row("txt", 404.0, 0.0, 0.0);
        let out = aggregate(vec![no_cik, no_ip, kept], &IpFilter::disabled());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].plain_text, 1);
    }

    #[test]
    fn allow_list_keeps_only_matching_addresses() {
        let mut outsider = row("xbrl", 404.0, 0.0, 0.0);
        outsider.ip = Some("10.0.0.abc".to_string());
        let insider = row("xbrl", 404.0, 0.0, 0.0);
        let filter = IpFilter::from_prefixes(["192.168.10"]);
        let out = aggregate(vec![outsider, insider], &filter);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].structured, 1);
    }

    #[test]
    fn output_is_ordered_by_date_filer_accession() {
        let mut later = row("htm", 404.0, 0.0, 0.0);
        later.date = Some("2017-01-02".to_string());
        let mut small_cik = row("htm", 404.0, 0.0, 0.0);
        small_cik.cik = Some("20".to_string());
        let base = row("htm", 404.0, 0.0, 0.0);
        let out = aggregate(vec![later, base, small_cik], &IpFilter::disabled());
        let keys = out.iter().map(|r| (r.date.to_string(), r.cik)).collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![
                ("2017-01-01".to_string(), 20),
                ("2017-01-01".to_string(), 1000045),
                ("2017-01-02".to_string(), 1000045),
            ]
        );
    }

    #[test]
    fn file_aggregation_reads_edgar_log_columns() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("log20170101.csv");
        let body = format!(
            "{HEADER}\
             192.168.10.jja,2017-01-01,00:00:00,0.0,1000045.0,0001193125-17-036701,-index.htm,301.0,2000.0,0.0,0.0,0.0,10.0,0.0,\n\
             192.168.10.jja,2017-01-01,00:00:01,0.0,1000045.0,0001193125-17-036701,.txt,404.0,2000.0,0.0,0.0,0.0,10.0,0.0,\n\
             192.168.10.jja,2017-01-01,00:00:02,0.0,1000045.0,0001193125-17-036701,.txt,200.0,2000.0,0.0,0.0,0.0,10.0,0.0,\n\
             192.168.10.jja,2017-01-01,00:00:03,0.0,1000045.0,0001193125-17-036701,.txt,404.0,2000.0,0.0,0.0,0.0,10.0,1.0,\n\
             ,2017-01-01,00:00:04,0.0,1000045.0,0001193125-17-036701,.txt,404.0,2000.0,0.0,0.0,0.0,10.0,0.0,\n"
        );
        fs::write(&path, body).unwrap();

        let out = aggregate_file(&path, &IpFilter::disabled()).unwrap();
        assert_eq!(out.rows_read, 5);
        assert_eq!(out.rows_kept, 2);
        assert_eq!(out.rows.len(), 1);
        let got = &out.rows[0];
        assert_eq!(got.cik, 1000045);
        assert_eq!(got.total, 2);
        assert_eq!(got.markup, 1);
        assert_eq!(got.plain_text, 1);
    }

    #[test]
    fn file_without_required_columns_is_rejected() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("log20170101.csv");
        fs::write(&path, "ip,date,cik\n1.1.1.a,2017-01-01,5\n").unwrap();
        let err = aggregate_file(&path, &IpFilter::disabled()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EdgarError>(),
            Some(EdgarError::MissingColumns { .. })
        ));
    }

    #[test]
    fn empty_file_yields_nothing() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("log20170101.csv");
        fs::write(&path, "").unwrap();
        let out = aggregate_file(&path, &IpFilter::disabled()).unwrap();
        assert!(out.rows.is_empty());
    }

    fn arb_row() -> impl Strategy<Value = RawLogRow> {
        (
            0u8..3,
            1u64..4,
            prop::sample::select(vec!["a-1", "b-2"]),
            prop::sample::select(vec!["htm", ".txt", "xbrl", "xml", "-index.htm", ""]),
            prop::sample::select(vec!["10.0.0.x", "192.168.10.y", "172.16.4.z"]),
            prop::sample::select(vec![200.0, 301.0, 404.0, 500.0]),
            0u8..2,
            0u8..2,
        )
            .prop_map(|(day, cik, acc, ext, ip, code, idx, crawler)| RawLogRow {
                date: Some(format!("2017-01-0{}", day + 1)),
                cik: Some(cik.to_string()),
                accession: Some(acc.to_string()),
                extension: Some(ext.to_string()),
                ip: Some(ip.to_string()),
                code: Some(code),
                idx: Some(f64::from(idx)),
                crawler: Some(f64::from(crawler)),
            })
    }

    proptest! {
        #[test]
        fn totals_add_up_and_keys_are_unique(rows in prop::collection::vec(arb_row(), 0..60)) {
            let out = aggregate(rows, &IpFilter::disabled());
            let mut keys = std::collections::HashSet::new();
            for r in &out {
                prop_assert!(r.counts_are_consistent());
                prop_assert!(keys.insert((r.date, r.cik, r.accession.clone())));
            }
        }

        #[test]
        fn allow_list_never_adds_rows(rows in prop::collection::vec(arb_row(), 0..60)) {
            let unfiltered: u64 = aggregate(rows.clone(), &IpFilter::disabled())
                .iter()
                .map(|r| r.total)
                .sum();
            let filtered: u64 = aggregate(rows, &IpFilter::from_prefixes(["192.168.10"]))
                .iter()
                .map(|r| r.total)
                .sum();
            prop_assert!(filtered <= unfiltered);
        }
    }
}
