use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};

use crate::commands::CommandReport;
use crate::edgar::config::EdgarConfig;
use crate::edgar::model::MergedRow;
use crate::edgar::paths::resolve_paths;
use crate::edgar::table::load_dataset;

#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub top: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetSummary {
    pub rows: usize,
    pub filers: usize,
    pub first_date: Option<chrono::NaiveDate>,
    pub last_date: Option<chrono::NaiveDate>,
    pub total_requests: u64,
    pub top_forms: Vec<(String, usize)>,
}

pub fn summarize(rows: &[MergedRow], top: usize) -> DatasetSummary {
    let filers: BTreeSet<u64> = rows.iter().map(|r| r.cik).collect();
    let mut forms: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows {
        *forms.entry(row.form.as_str()).or_default() += 1;
    }
    let mut top_forms: Vec<(String, usize)> = forms
        .into_iter()
        .map(|(form, count)| (form.to_string(), count))
        .collect();
    top_forms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_forms.truncate(top);

    DatasetSummary {
        rows: rows.len(),
        filers: filers.len(),
        first_date: rows.iter().map(|r| r.date).min(),
        last_date: rows.iter().map(|r| r.date).max(),
        total_requests: rows.iter().map(|r| r.nr_total).sum(),
        top_forms,
    }
}

pub fn run(cfg: &EdgarConfig, opts: &SummaryOptions) -> Result<CommandReport> {
    let paths = resolve_paths(&cfg.pipeline);
    let mut report = CommandReport::new("summary");
    report.detail(format!("dataset={}", paths.output_file.display()));

    if !paths.output_file.is_file() {
        report.issue("dataset not found; run `edgar-visits run` or `merge` first");
        return Ok(report);
    }

    let rows = match load_dataset(&paths.output_file) {
        Ok(rows) => rows,
        Err(err) => {
            report.issue(format!("failed to load dataset: {err:#}"));
            return Ok(report);
        }
    };

    let summary = summarize(&rows, opts.top);
    report.detail(format!("rows={}", summary.rows));
    report.detail(format!("filers={}", summary.filers));
    report.detail(format!("requests={}", summary.total_requests));
    if let (Some(first), Some(last)) = (summary.first_date, summary.last_date) {
        report.detail(format!("date_span={first}..{last}"));
    }
    for (form, count) in &summary.top_forms {
        report.detail(format!("form {form}={count}"));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(cik: u64, d: u32, form: &str, total: u64) -> MergedRow {
        let date = NaiveDate::from_ymd_opt(2017, 3, d).unwrap();
        MergedRow {
            date,
            cik,
            accession: format!("{cik}-17-{d}"),
            nr_total: total,
            htm: total,
            txt: 0,
            xbrl: 0,
            other: 0,
            form: form.to_string(),
            filing_date: date,
        }
    }

    #[test]
    fn summary_counts_filers_span_and_forms() {
        let rows = vec![
            row(1, 4, "10-K", 3),
            row(1, 2, "8-K", 1),
            row(2, 9, "8-K", 2),
            row(3, 5, "4", 1),
        ];
        let summary = summarize(&rows, 2);
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.filers, 3);
        assert_eq!(summary.total_requests, 7);
        assert_eq!(summary.first_date, NaiveDate::from_ymd_opt(2017, 3, 2));
        assert_eq!(summary.last_date, NaiveDate::from_ymd_opt(2017, 3, 9));
        assert_eq!(
            summary.top_forms,
            vec![("8-K".to_string(), 2), ("10-K".to_string(), 1)]
        );
    }

    #[test]
    fn empty_dataset_has_no_span() {
        let summary = summarize(&[], 5);
        assert_eq!(summary, DatasetSummary::default());
    }
}
