use anyhow::Result;

use crate::commands::CommandReport;
use crate::edgar::config::EdgarConfig;
use crate::edgar::paths::resolve_paths;

pub fn run(cfg: &EdgarConfig) -> Result<CommandReport> {
    let paths = resolve_paths(&cfg.pipeline);
    let p = &cfg.pipeline;
    let mut report = CommandReport::new("status");

    report.detail(format!("data_dir={}", paths.base_dir.display()));
    report.detail(format!("master_index_dir={}", paths.master_index_dir.display()));
    report.detail(format!("output_file={}", paths.output_file.display()));
    report.detail(format!("audit_log={}", paths.audit_log.display()));
    report.detail(format!("log_years={}", p.log_years));
    report.detail(format!("index_years={}", p.index_years));
    report.detail(format!("processed_log_prefix={}", p.processed_log_prefix));
    report.detail(format!("log_index_url={}", cfg.http.log_index_url_template));
    report.detail(format!("master_index_url={}", cfg.http.master_index_url_template));
    match &p.target_ip_list_path {
        Some(path) => {
            report.detail(format!("ip_list={}", path.display()));
            if !path.is_file() {
                report.issue(format!(
                    "ip list {} not found; filtering will be disabled",
                    path.display()
                ));
            }
        }
        None => report.detail("ip_list=none"),
    }

    if !paths.base_dir.exists() {
        report.issue("missing data dir (created on first pipeline run)");
    }
    if !paths.master_index_dir.exists() {
        report.issue("missing master index dir");
    }
    let missing_years: Vec<String> = p
        .log_years
        .years()
        .filter(|year| !paths.year_dir(*year).is_dir())
        .map(|year| year.to_string())
        .collect();
    if !missing_years.is_empty() {
        report.issue(format!("missing log year dirs: {}", missing_years.join(",")));
    }
    report.detail(format!("output_present={}", paths.output_file.is_file()));

    Ok(report)
}
