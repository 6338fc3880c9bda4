// src/config/mod.rs
//! File-backed settings and the source list.

pub mod dashboard;
pub mod sources;

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

pub use dashboard::DashboardConfig;
pub use sources::Source;

/// Immutable per-scan parameters handed to every worker of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    pub model: String,
    pub api_key: String,
    pub api_base: String,
    pub proxy: Option<String>,
    pub system_prompt: String,
}

impl RunConfiguration {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Pretty JSON via tmp file + rename, creating parent dirs as needed.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes())
}

pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp_name);
    let mut f = fs::File::create(&tmp).with_context(|| format!("writing {}", tmp.display()))?;
    f.write_all(contents)?;
    f.sync_all()?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}
