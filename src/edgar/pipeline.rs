use crate::edgar::audit::append_event;
use crate::edgar::config::EdgarConfig;
use crate::edgar::fetch::Fetcher;
use crate::edgar::ip_filter::IpFilter;
use crate::edgar::log_ingest::{LogIngestion, YearIngestOutcome};
use crate::edgar::master_index::{MasterIndex, MasterIndexBuilder};
use crate::edgar::paths::{EdgarPaths, resolve_paths};
use crate::edgar::reconcile::{MergeOutcome, ReconciliationEngine};
use anyhow::Result;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        ingested: Vec<YearIngestOutcome>,
        merged: MergeOutcome,
    },
    /// The index stage produced nothing, so reconciliation never ran.
    HaltedWithoutIndex { ingested: Vec<YearIngestOutcome> },
}

/// Runs the three stages in order against one configuration.
pub struct PipelineDriver<'a> {
    cfg: &'a EdgarConfig,
    paths: EdgarPaths,
    fetcher: &'a dyn Fetcher,
    filter: IpFilter,
}

impl<'a> PipelineDriver<'a> {
    /// Creates the directory layout and loads the address allow-list.
    pub fn new(cfg: &'a EdgarConfig, fetcher: &'a dyn Fetcher) -> Result<Self> {
        let paths = resolve_paths(&cfg.pipeline);
        paths.ensure_layout(cfg.pipeline.log_years.years())?;
        let filter = IpFilter::load(cfg.pipeline.target_ip_list_path.as_deref());
        Ok(Self {
            cfg,
            paths,
            fetcher,
            filter,
        })
    }

    pub fn paths(&self) -> &EdgarPaths {
        &self.paths
    }

    pub fn filter(&self) -> &IpFilter {
        &self.filter
    }

    pub fn ingest_logs(&self) -> Vec<YearIngestOutcome> {
        let ingestion = LogIngestion::new(
            self.fetcher,
            &self.cfg.http,
            &self.paths,
            &self.cfg.pipeline.processed_log_prefix,
            &self.filter,
        );
        let outcomes = ingestion.run(self.cfg.pipeline.log_years);
        let files: usize = outcomes.iter().map(|o| o.files_written).sum();
        let failed: usize = outcomes.iter().map(|o| o.archives_failed).sum();
        let status = if failed == 0 { "ok" } else { "partial" };
        self.audit(
            "ingest-logs",
            status,
            &format!("years={} files_written={files} archives_failed={failed}", outcomes.len()),
        );
        outcomes
    }

    pub fn build_index(&self) -> Option<MasterIndex> {
        let builder = MasterIndexBuilder::new(self.fetcher, &self.cfg.http, &self.paths);
        let index = builder.build(self.cfg.pipeline.index_years);
        match &index {
            Some(index) => self.audit("build-index", "ok", &format!("entries={}", index.len())),
            None => self.audit("build-index", "failed", "no usable master index data"),
        }
        index
    }

    pub fn merge(&self, index: &MasterIndex) -> MergeOutcome {
        let engine = ReconciliationEngine::new(
            &self.paths,
            self.cfg.pipeline.log_years,
            &self.cfg.pipeline.processed_log_prefix,
        );
        let outcome = engine.merge(index);
        let status = match (outcome.rows.is_empty(), outcome.saved) {
            (true, _) => "empty",
            (false, true) => "ok",
            (false, false) => "unsaved",
        };
        self.audit(
            "merge",
            status,
            &format!("rows={} years={}", outcome.rows.len(), outcome.years_merged),
        );
        outcome
    }

    /// Ingest, then build the index, then merge. An empty index halts the run.
    pub fn run(&self) -> RunOutcome {
        info!("starting full pipeline");
        let ingested = self.ingest_logs();
        let Some(index) = self.build_index() else {
            error!("master index is empty; halting before merge");
            return RunOutcome::HaltedWithoutIndex { ingested };
        };
        let merged = self.merge(&index);
        info!(rows = merged.rows.len(), "pipeline finished");
        RunOutcome::Completed { ingested, merged }
    }

    fn audit(&self, stage: &str, status: &str, message: &str) {
        if let Err(err) = append_event(&self.paths, stage, status, message) {
            warn!(stage, err = %format!("{err:#}"), "failed to append audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edgar::audit::AuditEvent;
    use crate::edgar::config::{PipelineConfig, YearRange};
    use crate::edgar::table::load_dataset;
    use crate::edgar::testing::{LOG_HEADER, MemoryFetcher, log_line, master_index_text, zip_bytes};
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn config(tmp: &TempDir) -> EdgarConfig {
        let mut cfg = EdgarConfig {
            pipeline: PipelineConfig {
                data_base_dir: tmp.path().join("data"),
                log_years: YearRange::new(2017, 2017),
                index_years: YearRange::new(2017, 2017),
                target_ip_list_path: None,
                processed_log_prefix: "edgar_".to_string(),
            },
            ..EdgarConfig::default()
        };
        cfg.http.index_retry_backoff_secs = 0;
        cfg
    }

    fn audit_stages(paths: &EdgarPaths) -> Vec<(String, String)> {
        fs::read_to_string(&paths.audit_log)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str::<AuditEvent>(line).unwrap())
            .map(|event| (event.stage, event.status))
            .collect()
    }

    #[test]
    fn full_run_joins_logs_with_the_index() {
        let tmp = tempdir().unwrap();
        let cfg = config(&tmp);
        let http = &cfg.http;
        let archive = format!("{}2017/Qtr1/log20170105.zip", http.archive_url_prefix);
        let log = format!(
            "{LOG_HEADER}\n{}\n{}\n{}\n",
            log_line("5.6.7.jcd", "2017-01-05", "1000045.0", "0001193125-17-036701", ".htm", "404.0"),
            log_line("5.6.7.jcd", "2017-01-05", "1000045.0", "0001193125-17-036701", "-index.xbrl", "404.0"),
            log_line("5.6.7.jcd", "2017-01-05", "2000.0", "0000002000-17-000009", ".txt", "404.0"),
        );
        let master = master_index_text(&[(
            "1000045",
            "NICHOLAS FINANCIAL INC",
            "10-Q",
            "2017-01-04",
            "edgar/data/1000045/0001193125-17-036701.txt",
        )]);
        let fetcher = MemoryFetcher::default()
            .with(&http.log_index_url(2017), format!("<a href=\"{archive}\">x</a>"))
            .with(&archive, zip_bytes(&[("log20170105.csv", &log)]))
            .with(&http.master_index_url(2017, "QTR1"), master);

        let driver = PipelineDriver::new(&cfg, &fetcher).unwrap();
        let RunOutcome::Completed { ingested, merged: outcome } = driver.run() else {
            panic!("pipeline halted");
        };
        assert_eq!(ingested[0].files_written, 1);
        assert_eq!(outcome.rows.len(), 1);
        let row = &outcome.rows[0];
        assert_eq!(row.cik, 1000045);
        assert_eq!(row.nr_total, 2);
        assert_eq!(row.htm, 1);
        assert_eq!(row.xbrl, 1);
        assert_eq!(row.form, "10-Q");
        assert_eq!(load_dataset(&driver.paths().output_file).unwrap(), outcome.rows);

        let stages = audit_stages(driver.paths());
        assert_eq!(
            stages,
            vec![
                ("ingest-logs".to_string(), "ok".to_string()),
                ("build-index".to_string(), "ok".to_string()),
                ("merge".to_string(), "ok".to_string()),
            ]
        );
    }

    #[test]
    fn empty_index_halts_before_merge() {
        let tmp = tempdir().unwrap();
        let cfg = config(&tmp);
        let fetcher = MemoryFetcher::default();

        let driver = PipelineDriver::new(&cfg, &fetcher).unwrap();
        let outcome = driver.run();
        assert!(matches!(outcome, RunOutcome::HaltedWithoutIndex { .. }));
        assert!(!driver.paths().output_file.exists());
        assert!(driver.paths().year_dir(2017).is_dir());
        assert!(driver.paths().master_index_dir.is_dir());

        let stages = audit_stages(driver.paths());
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[1], ("build-index".to_string(), "failed".to_string()));
    }

    #[test]
    fn missing_allow_list_disables_filtering() {
        let tmp = tempdir().unwrap();
        let mut cfg = config(&tmp);
        cfg.pipeline.target_ip_list_path = Some(tmp.path().join("absent.csv"));
        let fetcher = MemoryFetcher::default();
        let driver = PipelineDriver::new(&cfg, &fetcher).unwrap();
        assert!(!driver.filter().is_enabled());
    }
}
