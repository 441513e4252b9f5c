use crate::error::EdgarError;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Inclusive range of calendar years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start..=self.end
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for YearRange {
    type Err = anyhow::Error;

    /// Accepts `2011-2017` or a single year `2015`.
    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (start, end) = match trimmed.split_once('-') {
            Some((a, b)) => (a.trim(), b.trim()),
            None => (trimmed, trimmed),
        };
        let start = start
            .parse::<i32>()
            .map_err(|_| anyhow!("invalid year range `{raw}`: expected START-END"))?;
        let end = end
            .parse::<i32>()
            .map_err(|_| anyhow!("invalid year range `{raw}`: expected START-END"))?;
        Ok(Self { start, end })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub log_index_url_template: String,
    pub archive_url_prefix: String,
    pub archive_suffix: String,
    pub member_suffix: String,
    pub master_index_url_template: String,
    pub index_max_retries: u32,
    pub index_retry_backoff_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "edgar-visits research crawler admin@example.com".to_string(),
            log_index_url_template: "https://www.sec.gov/files/edgar{year}.html".to_string(),
            archive_url_prefix: "https://www.sec.gov/dera/data/Public-EDGAR-log-file-data/"
                .to_string(),
            archive_suffix: ".zip".to_string(),
            member_suffix: ".csv".to_string(),
            master_index_url_template:
                "https://www.sec.gov/Archives/edgar/full-index/{year}/{quarter}/master.idx"
                    .to_string(),
            index_max_retries: 3,
            index_retry_backoff_secs: 2,
            timeout_secs: 300,
        }
    }
}

impl HttpConfig {
    pub fn log_index_url(&self, year: i32) -> String {
        self.log_index_url_template
            .replace("{year}", &year.to_string())
    }

    pub fn master_index_url(&self, year: i32, quarter: &str) -> String {
        self.master_index_url_template
            .replace("{year}", &year.to_string())
            .replace("{quarter}", quarter)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_base_dir: PathBuf,
    pub log_years: YearRange,
    pub index_years: YearRange,
    pub target_ip_list_path: Option<PathBuf>,
    pub processed_log_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_base_dir: PathBuf::from("./data"),
            log_years: YearRange::new(2011, 2017),
            index_years: YearRange::new(2010, 2017),
            target_ip_list_path: None,
            processed_log_prefix: "processed_".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EdgarConfig {
    pub pipeline: PipelineConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialEdgarConfig {
    pipeline: Option<PipelineConfig>,
    http: Option<HttpConfig>,
}

/// Values supplied on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub data_base_dir: Option<PathBuf>,
    pub log_years: Option<YearRange>,
    pub index_years: Option<YearRange>,
    pub target_ip_list_path: Option<PathBuf>,
    pub processed_log_prefix: Option<String>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u32(var: &str, fallback: u32) -> u32 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u32>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_years(var: &str, fallback: YearRange) -> YearRange {
    match env::var(var) {
        Ok(v) => v.parse::<YearRange>().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => None,
    }
}

pub fn validate(cfg: &EdgarConfig) -> Result<()> {
    let invalid = |msg: String| -> Result<()> { Err(EdgarError::InvalidConfig(msg).into()) };

    let p = &cfg.pipeline;
    if p.log_years.start > p.log_years.end {
        return invalid(format!("log years {} are inverted", p.log_years));
    }
    if p.index_years.start > p.index_years.end {
        return invalid(format!("index years {} are inverted", p.index_years));
    }
    if p.processed_log_prefix.trim().is_empty() {
        return invalid("processed log prefix cannot be empty".to_string());
    }
    if p.processed_log_prefix.contains(['/', '\\']) {
        return invalid("processed log prefix cannot contain path separators".to_string());
    }

    let h = &cfg.http;
    if !h.log_index_url_template.contains("{year}") {
        return invalid("log index url template needs a {year} placeholder".to_string());
    }
    if !h.master_index_url_template.contains("{year}")
        || !h.master_index_url_template.contains("{quarter}")
    {
        return invalid(
            "master index url template needs {year} and {quarter} placeholders".to_string(),
        );
    }
    if h.index_max_retries == 0 {
        return invalid("index max retries must be >= 1".to_string());
    }
    if h.user_agent.trim().is_empty() {
        return invalid("user agent cannot be empty".to_string());
    }
    Ok(())
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(custom) = env_path("EDGAR_CONFIG_PATH") {
        return Some(custom);
    }
    Some(PathBuf::from("edgar.toml"))
}

fn merge_file_config(base: &mut EdgarConfig, path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path)
        .map_err(|err| anyhow!("failed to read edgar config {}: {err}", path.display()))?;
    let parsed: PartialEdgarConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse edgar config {}: {err}", path.display()))?;
    if let Some(pipeline) = parsed.pipeline {
        base.pipeline = pipeline;
    }
    if let Some(http) = parsed.http {
        base.http = http;
    }
    Ok(())
}

fn apply_env(cfg: &mut EdgarConfig) {
    let p = &mut cfg.pipeline;
    if let Some(dir) = env_path("EDGAR_DATA_DIR") {
        p.data_base_dir = dir;
    }
    p.log_years = env_or_years("EDGAR_LOG_YEARS", p.log_years);
    p.index_years = env_or_years("EDGAR_INDEX_YEARS", p.index_years);
    if let Some(ip_list) = env_path("EDGAR_IP_LIST") {
        p.target_ip_list_path = Some(ip_list);
    }
    p.processed_log_prefix = env_or_string("EDGAR_PREFIX", &p.processed_log_prefix);

    let h = &mut cfg.http;
    h.user_agent = env_or_string("EDGAR_USER_AGENT", &h.user_agent);
    h.log_index_url_template = env_or_string("EDGAR_LOG_INDEX_URL", &h.log_index_url_template);
    h.archive_url_prefix = env_or_string("EDGAR_ARCHIVE_URL_PREFIX", &h.archive_url_prefix);
    h.master_index_url_template =
        env_or_string("EDGAR_MASTER_INDEX_URL", &h.master_index_url_template);
    h.index_max_retries = env_or_u32("EDGAR_INDEX_MAX_RETRIES", h.index_max_retries);
    h.index_retry_backoff_secs =
        env_or_u64("EDGAR_INDEX_RETRY_BACKOFF_SECS", h.index_retry_backoff_secs);
    h.timeout_secs = env_or_u64("EDGAR_HTTP_TIMEOUT_SECS", h.timeout_secs);
}

fn apply_overrides(cfg: &mut EdgarConfig, overrides: &ConfigOverrides) {
    let p = &mut cfg.pipeline;
    if let Some(dir) = &overrides.data_base_dir {
        p.data_base_dir = dir.clone();
    }
    if let Some(years) = overrides.log_years {
        p.log_years = years;
    }
    if let Some(years) = overrides.index_years {
        p.index_years = years;
    }
    if let Some(path) = &overrides.target_ip_list_path {
        p.target_ip_list_path = Some(path.clone());
    }
    if let Some(prefix) = &overrides.processed_log_prefix {
        p.processed_log_prefix = prefix.clone();
    }
}

pub fn load_config(overrides: &ConfigOverrides) -> Result<EdgarConfig> {
    let mut cfg = EdgarConfig::default();

    let explicit = overrides.config_path.as_deref();
    if let Some(path) = resolve_config_path(explicit) {
        if path.exists() {
            merge_file_config(&mut cfg, &path)?;
        } else if explicit.is_some() {
            return Err(EdgarError::InvalidConfig(format!(
                "config file {} does not exist",
                path.display()
            ))
            .into());
        }
    }

    apply_env(&mut cfg);
    apply_overrides(&mut cfg, overrides);

    validate(&cfg)?;
    Ok(cfg)
}
