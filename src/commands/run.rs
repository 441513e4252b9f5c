use anyhow::Result;

use crate::commands::{CommandReport, report_ingestion, report_merge};
use crate::edgar::config::EdgarConfig;
use crate::edgar::fetch::HttpFetcher;
use crate::edgar::pipeline::{PipelineDriver, RunOutcome};

pub fn run(cfg: &EdgarConfig) -> Result<CommandReport> {
    let fetcher = HttpFetcher::new(&cfg.http)?;
    let driver = PipelineDriver::new(cfg, &fetcher)?;
    let mut report = CommandReport::new("run");

    report.detail(format!("data_dir={}", driver.paths().base_dir.display()));
    report.detail(format!("log_years={}", cfg.pipeline.log_years));
    report.detail(format!("index_years={}", cfg.pipeline.index_years));

    match driver.run() {
        RunOutcome::Completed { ingested, merged } => {
            report_ingestion(&mut report, &ingested);
            report_merge(&mut report, &merged, &driver.paths().output_file);
        }
        RunOutcome::HaltedWithoutIndex { ingested } => {
            report_ingestion(&mut report, &ingested);
            report.issue("master index is empty; pipeline halted before merge");
        }
    }
    Ok(report)
}
