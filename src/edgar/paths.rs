use crate::edgar::config::PipelineConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const QUARTERS: [&str; 4] = ["QTR1", "QTR2", "QTR3", "QTR4"];

#[derive(Debug, Clone)]
pub struct EdgarPaths {
    pub base_dir: PathBuf,
    pub master_index_dir: PathBuf,
    pub output_file: PathBuf,
    pub audit_log: PathBuf,
}

pub fn resolve_paths(cfg: &PipelineConfig) -> EdgarPaths {
    let base_dir = cfg.data_base_dir.clone();
    let output_name = format!(
        "{}visiting_details_{}_{}.csv.gz",
        cfg.processed_log_prefix, cfg.log_years.start, cfg.log_years.end
    );
    EdgarPaths {
        master_index_dir: base_dir.join("sec_master"),
        output_file: base_dir.join(output_name),
        audit_log: base_dir.join("audit.log"),
        base_dir,
    }
}

impl EdgarPaths {
    pub fn year_dir(&self, year: i32) -> PathBuf {
        self.base_dir.join(year.to_string())
    }

    pub fn master_index_file(&self, year: i32, quarter: &str) -> PathBuf {
        self.master_index_dir
            .join(format!("master_index_{year}_{quarter}.txt"))
    }

    /// Creates the base, master index and per-log-year directories.
    pub fn ensure_layout(&self, log_years: impl IntoIterator<Item = i32>) -> Result<()> {
        create_dir(&self.base_dir)?;
        create_dir(&self.master_index_dir)?;
        for year in log_years {
            create_dir(&self.year_dir(year))?;
        }
        Ok(())
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
}

/// `log20170101.csv` becomes `{prefix}20170101.csv`.
pub fn processed_file_name(prefix: &str, raw_file_name: &str) -> String {
    format!("{prefix}{}", raw_file_name.replace("log", ""))
}
