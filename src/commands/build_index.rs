use anyhow::Result;
use std::collections::BTreeSet;

use crate::commands::CommandReport;
use crate::edgar::config::EdgarConfig;
use crate::edgar::fetch::HttpFetcher;
use crate::edgar::pipeline::PipelineDriver;

pub fn run(cfg: &EdgarConfig) -> Result<CommandReport> {
    let fetcher = HttpFetcher::new(&cfg.http)?;
    let driver = PipelineDriver::new(cfg, &fetcher)?;
    let mut report = CommandReport::new("build-index");

    report.detail(format!("index_years={}", cfg.pipeline.index_years));
    report.detail(format!(
        "master_index_dir={}",
        driver.paths().master_index_dir.display()
    ));

    match driver.build_index() {
        Some(index) => {
            let forms: BTreeSet<&str> = index
                .entries()
                .iter()
                .map(|entry| entry.form_type.as_str())
                .collect();
            report.detail(format!("entries={}", index.len()));
            report.detail(format!("form_types={}", forms.len()));
        }
        None => report.issue("no master index data was downloaded or parsed"),
    }
    Ok(report)
}
