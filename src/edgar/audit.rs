use crate::edgar::paths::EdgarPaths;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub at: String,
    pub stage: String,
    pub status: String,
    pub message: String,
}

pub fn append_event(paths: &EdgarPaths, stage: &str, status: &str, message: &str) -> Result<()> {
    fs::create_dir_all(&paths.base_dir)
        .with_context(|| format!("failed to create {}", paths.base_dir.display()))?;
    let event = AuditEvent {
        at: Utc::now().to_rfc3339(),
        stage: stage.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.audit_log)
        .with_context(|| format!("failed to open {}", paths.audit_log.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}
