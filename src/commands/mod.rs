pub mod build_index;
pub mod ingest_logs;
pub mod merge;
pub mod run;
pub mod status;
pub mod summary;

use serde::Serialize;

use crate::edgar::log_ingest::YearIngestOutcome;
use crate::edgar::reconcile::MergeOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

pub fn report_ingestion(report: &mut CommandReport, outcomes: &[YearIngestOutcome]) {
    for o in outcomes {
        report.detail(format!(
            "year={} archives={} archives_failed={} files_written={} rows_written={}",
            o.year, o.archives_listed, o.archives_failed, o.files_written, o.rows_written
        ));
        if o.archives_listed == 0 {
            report.issue(format!("no log archives ingested for {}", o.year));
        } else if o.archives_failed > 0 || o.members_failed > 0 {
            report.issue(format!(
                "{} archives and {} log files failed for {}",
                o.archives_failed, o.members_failed, o.year
            ));
        }
    }
}

pub fn report_merge(report: &mut CommandReport, outcome: &MergeOutcome, output: &std::path::Path) {
    report.detail(format!("merged_rows={}", outcome.rows.len()));
    report.detail(format!("years_merged={}", outcome.years_merged));
    if outcome.rows.is_empty() {
        report.issue("no rows were merged");
    } else if outcome.saved {
        report.detail(format!("dataset={}", output.display()));
    } else {
        report.issue(format!("failed to save dataset to {}", output.display()));
    }
}
