use anyhow::Result;

use crate::commands::{CommandReport, report_merge};
use crate::edgar::config::EdgarConfig;
use crate::edgar::fetch::HttpFetcher;
use crate::edgar::pipeline::PipelineDriver;

pub fn run(cfg: &EdgarConfig) -> Result<CommandReport> {
    let fetcher = HttpFetcher::new(&cfg.http)?;
    let driver = PipelineDriver::new(cfg, &fetcher)?;
    let mut report = CommandReport::new("merge");

    let Some(index) = driver.build_index() else {
        report.issue("master index is empty; nothing to merge against");
        return Ok(report);
    };
    report.detail(format!("index_entries={}", index.len()));

    let outcome = driver.merge(&index);
    report_merge(&mut report, &outcome, &driver.paths().output_file);
    Ok(report)
}
