use anyhow::Result;

use crate::commands::{CommandReport, report_ingestion};
use crate::edgar::config::EdgarConfig;
use crate::edgar::fetch::HttpFetcher;
use crate::edgar::pipeline::PipelineDriver;

pub fn run(cfg: &EdgarConfig) -> Result<CommandReport> {
    let fetcher = HttpFetcher::new(&cfg.http)?;
    let driver = PipelineDriver::new(cfg, &fetcher)?;
    let mut report = CommandReport::new("ingest-logs");

    report.detail(format!("log_years={}", cfg.pipeline.log_years));
    report.detail(format!("ip_filter_enabled={}", driver.filter().is_enabled()));
    report.detail(format!("ip_prefixes={}", driver.filter().prefixes().count()));

    let outcomes = driver.ingest_logs();
    report_ingestion(&mut report, &outcomes);
    Ok(report)
}
