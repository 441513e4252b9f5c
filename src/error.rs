use thiserror::Error;

#[derive(Debug, Error)]
pub enum EdgarError {
    #[error("config invalid: {0}")]
    InvalidConfig(String),
    #[error("corrupt archive {0}")]
    CorruptArchive(String),
    #[error("{path} is missing expected columns: {missing:?}")]
    MissingColumns { path: String, missing: Vec<String> },
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },
}

impl EdgarError {
    pub fn missing_columns(path: &std::path::Path, missing: Vec<String>) -> Self {
        Self::MissingColumns {
            path: path.display().to_string(),
            missing,
        }
    }
}
