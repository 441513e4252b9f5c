use crate::edgar::config::HttpConfig;
use crate::error::EdgarError;
use anyhow::{Context, Result};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).expect("href pattern compiles")
});

pub trait Fetcher {
    /// Downloads `url` into `dest`. Failures are logged, partial output is
    /// removed, and `false` is returned.
    fn fetch_to_file(&self, url: &str, dest: &Path) -> bool;

    fn fetch_text(&self, url: &str) -> Result<String>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(cfg: &HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert(
            "X-Requested-With",
            HeaderValue::from_static("XMLHttpRequest"),
        );
        let client = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("failed to build http client")?;
        Ok(Self { client })
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self.client.get(url).send().map_err(|err| EdgarError::Fetch {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(EdgarError::Fetch {
                url: url.to_string(),
                reason: format!("status {}", response.status()),
            }
            .into());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file =
            File::create(dest).with_context(|| format!("failed to create {}", dest.display()))?;
        let bytes = response
            .copy_to(&mut file)
            .with_context(|| format!("failed to stream {url} into {}", dest.display()))?;
        Ok(bytes)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_to_file(&self, url: &str, dest: &Path) -> bool {
        match self.download(url, dest) {
            Ok(bytes) => {
                debug!(url, bytes, dest = %dest.display(), "downloaded");
                true
            }
            Err(err) => {
                warn!(url, err = %format!("{err:#}"), "failed to download");
                if dest.exists() {
                    let _ = fs::remove_file(dest);
                }
                false
            }
        }
    }

    fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().map_err(|err| EdgarError::Fetch {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(EdgarError::Fetch {
                url: url.to_string(),
                reason: format!("status {}", response.status()),
            }
            .into());
        }
        response
            .text()
            .with_context(|| format!("failed to read body of {url}"))
    }
}

/// Links in `html` that start with `prefix` and end with `suffix`, first
/// occurrence order, without repeats.
pub fn extract_links(html: &str, prefix: &str, suffix: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    HREF.captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|href| href.starts_with(prefix) && href.ends_with(suffix))
        .filter(|href| seen.insert(href.to_string()))
        .map(ToOwned::to_owned)
        .collect()
}

pub fn list_archive_urls(fetcher: &dyn Fetcher, cfg: &HttpConfig, year: i32) -> Result<Vec<String>> {
    let index_url = cfg.log_index_url(year);
    let html = fetcher
        .fetch_text(&index_url)
        .with_context(|| format!("failed to fetch log index page for {year}"))?;
    Ok(extract_links(&html, &cfg.archive_url_prefix, &cfg.archive_suffix))
}
