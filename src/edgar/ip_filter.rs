use anyhow::{Context, Result, anyhow};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{error, info, warn};

const NETBLOCK_COLUMN: &str = "netblock";

/// Address allow-list built from a CSV of netblocks.
///
/// Each netblock is reduced to a textual prefix: the part before `/` with its
/// last two characters dropped, so `192.168.10.0/24` becomes `192.168.10`.
/// This assumes dotted-quad text and is kept as-is; it is a heuristic, not a
/// CIDR match.
#[derive(Debug, Clone, Default)]
pub struct IpFilter {
    prefixes: BTreeSet<String>,
}

impl IpFilter {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Never fails: every problem degrades to a disabled filter with a log line.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("no target ip list configured; ip filtering skipped");
            return Self::disabled();
        };
        if !path.exists() {
            warn!(path = %path.display(), "target ip list not found; ip filtering skipped");
            return Self::disabled();
        }

        match read_netblocks(path) {
            Ok(Some(netblocks)) => {
                let (prefixes, unusable): (Vec<String>, Vec<String>) = netblocks
                    .iter()
                    .map(|n| netblock_prefix(n))
                    .partition(|prefix| !prefix.is_empty());
                if !unusable.is_empty() {
                    warn!(
                        path = %path.display(),
                        skipped = unusable.len(),
                        "netblocks too short to yield a prefix were skipped"
                    );
                }
                let filter = Self::from_prefixes(prefixes);
                info!(
                    path = %path.display(),
                    prefixes = filter.prefixes.len(),
                    "loaded target ip prefixes"
                );
                filter
            }
            Ok(None) => {
                warn!(
                    path = %path.display(),
                    column = NETBLOCK_COLUMN,
                    "column not found in target ip list; ip filtering skipped"
                );
                Self::disabled()
            }
            Err(err) => {
                error!(
                    path = %path.display(),
                    err = %format!("{err:#}"),
                    "failed to load target ip prefixes; ip filtering skipped"
                );
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.prefixes.is_empty()
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(String::as_str)
    }

    /// Everything matches when no prefixes were loaded.
    pub fn matches(&self, address: &str) -> bool {
        if self.prefixes.is_empty() {
            return true;
        }
        self.prefixes
            .iter()
            .any(|prefix| address.starts_with(prefix.as_str()))
    }
}

fn read_netblocks(path: &Path) -> Result<Option<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .clone();
    let Some(column) = headers.iter().position(|h| h.trim() == NETBLOCK_COLUMN) else {
        return Ok(None);
    };

    let mut out = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("malformed row in {}", path.display()))?;
        let value = record
            .get(column)
            .ok_or_else(|| anyhow!("short row in {}", path.display()))?
            .trim();
        // an empty prefix would match every address
        if value.is_empty() {
            warn!(path = %path.display(), line = line + 2, "blank netblock skipped");
            continue;
        }
        out.push(value.to_string());
    }
    Ok(Some(out))
}

pub fn netblock_prefix(netblock: &str) -> String {
    let address = netblock.split('/').next().unwrap_or_default();
    let keep = address.chars().count().saturating_sub(2);
    address.chars().take(keep).collect()
}
