use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One HTTP request line from a daily log file, before validation.
///
/// Every field is optional because upstream files routinely carry blanks.
/// Flags keep their numeric form (`"1.0"` parses as `1.0`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawLogRow {
    pub date: Option<String>,
    pub cik: Option<String>,
    pub accession: Option<String>,
    pub extension: Option<String>,
    pub ip: Option<String>,
    pub code: Option<f64>,
    pub idx: Option<f64>,
    pub crawler: Option<f64>,
}

impl RawLogRow {
    pub fn is_crawler(&self) -> bool {
        self.crawler == Some(1.0)
    }

    pub fn is_index_page(&self) -> bool {
        self.idx == Some(1.0)
    }

    /// Status below 300 means a plain successful page view. An unreadable code
    /// is not below 300 and survives.
    pub fn is_success_response(&self) -> bool {
        self.code.is_some_and(|code| code < 300.0)
    }
}

/// A log row whose filer, accession, date and address are all present and
/// well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidLogRow {
    pub date: NaiveDate,
    pub cik: u64,
    pub accession: String,
    pub extension: Option<String>,
    pub ip: String,
}

impl ValidLogRow {
    pub fn from_raw(raw: &RawLogRow) -> Option<Self> {
        let date = NaiveDate::parse_from_str(raw.date.as_deref()?.trim(), DATE_FORMAT).ok()?;
        let cik = parse_cik(raw.cik.as_deref()?)?;
        let accession = normalize_accession(raw.accession.as_deref()?);
        if accession.is_empty() {
            return None;
        }
        let ip = raw.ip.as_deref()?.trim();
        if ip.is_empty() {
            return None;
        }
        Some(Self {
            date,
            cik,
            accession,
            extension: raw.extension.clone(),
            ip: ip.to_string(),
        })
    }

    pub fn file_type(&self) -> FileType {
        FileType::from_extension(self.extension.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Markup,
    PlainText,
    StructuredData,
    Other,
}

impl FileType {
    /// Classifies on the text after the final `.`, lower-cased. A missing
    /// extension lands in `Other`.
    pub fn from_extension(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Other;
        };
        let ext = raw.rsplit('.').next().unwrap_or_default().trim();
        match ext.to_ascii_lowercase().as_str() {
            "htm" => Self::Markup,
            "txt" => Self::PlainText,
            "xbrl" => Self::StructuredData,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTypeCounts {
    pub markup: u64,
    pub plain_text: u64,
    pub structured: u64,
    pub other: u64,
}

impl FileTypeCounts {
    pub fn add(&mut self, file_type: FileType) {
        match file_type {
            FileType::Markup => self.markup += 1,
            FileType::PlainText => self.plain_text += 1,
            FileType::StructuredData => self.structured += 1,
            FileType::Other => self.other += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.markup + self.plain_text + self.structured + self.other
    }
}

/// Request counts for one (date, filer, accession).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedLogRow {
    pub date: NaiveDate,
    #[serde(deserialize_with = "lenient_u64")]
    pub cik: u64,
    pub accession: String,
    #[serde(rename = "nr_total", deserialize_with = "lenient_u64")]
    pub total: u64,
    #[serde(rename = "htm", deserialize_with = "lenient_u64")]
    pub markup: u64,
    #[serde(rename = "txt", deserialize_with = "lenient_u64")]
    pub plain_text: u64,
    #[serde(rename = "xbrl", deserialize_with = "lenient_u64")]
    pub structured: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub other: u64,
}

impl AggregatedLogRow {
    pub fn new(date: NaiveDate, cik: u64, accession: String, counts: FileTypeCounts) -> Self {
        Self {
            date,
            cik,
            accession,
            total: counts.total(),
            markup: counts.markup,
            plain_text: counts.plain_text,
            structured: counts.structured,
            other: counts.other,
        }
    }

    #[cfg(test)]
    pub fn counts_are_consistent(&self) -> bool {
        self.total == self.markup + self.plain_text + self.structured + self.other
    }

    pub fn join_key(&self) -> String {
        join_key_from_log(self.cik, &self.accession)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MasterIndexEntry {
    pub form_type: String,
    pub date_filed: NaiveDate,
    pub acc_path: String,
}

/// Final output row: log counts annotated with the filing's form and date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRow {
    pub date: NaiveDate,
    pub cik: u64,
    pub accession: String,
    pub nr_total: u64,
    pub htm: u64,
    pub txt: u64,
    pub xbrl: u64,
    pub other: u64,
    pub form: String,
    pub filing_date: NaiveDate,
}

impl MergedRow {
    pub fn from_parts(log: &AggregatedLogRow, entry: &MasterIndexEntry) -> Self {
        Self {
            date: log.date,
            cik: log.cik,
            accession: log.accession.clone(),
            nr_total: log.total,
            htm: log.markup,
            txt: log.plain_text,
            xbrl: log.structured,
            other: log.other,
            form: entry.form_type.clone(),
            filing_date: entry.date_filed,
        }
    }
}

/// Accepts `1234` as well as float-coerced `1234.0`.
pub fn parse_cik(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<u64>() {
        return Some(value);
    }
    let value = trimmed.parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 {
        Some(value as u64)
    } else {
        None
    }
}

/// Strips the trailing `.0` left behind when an accession was read as a number.
pub fn normalize_accession(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_suffix(".0").unwrap_or(trimmed).to_string()
}

pub fn join_key_from_log(cik: u64, accession: &str) -> String {
    format!(
        "edgar/data/{cik}/{}",
        normalize_accession(accession).replace('-', "")
    )
}

/// `edgar/data/1000045/0001193125-17-036701.txt` becomes
/// `edgar/data/1000045/000119312517036701`.
pub fn join_key_from_index(filename: &str) -> String {
    let trimmed = filename.trim();
    let stem = trimmed.split('.').next().unwrap_or_default();
    stem.replace('-', "")
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_cik(&raw).ok_or_else(|| de::Error::custom(format!("not a non-negative integer: {raw}")))
}
