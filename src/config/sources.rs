// src/config/sources.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_SOURCES_PATH: &str = "FEED_DESK_SOURCES_PATH";
pub const DEFAULT_SOURCES_TOML: &str = "config/sources.toml";
pub const DEFAULT_SOURCES_JSON: &str = "config/sources.json";

fn default_enabled() -> bool {
    true
}

/// A configured feed. Names are display strings and need not be unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Seed list used when no source file exists yet.
pub fn default_sources() -> Vec<Source> {
    vec![Source::new("OpenAI Blog", "https://openai.com/news/rss.xml")]
}

/// Load sources from an explicit path. Supports TOML or JSON formats.
pub fn load_sources_from(path: &Path) -> Result<Vec<Source>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Where the source list lives: `$FEED_DESK_SOURCES_PATH`, else an existing
/// `config/sources.toml`, else `config/sources.json`.
pub fn sources_path_default() -> PathBuf {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        return PathBuf::from(p);
    }
    let toml_p = PathBuf::from(DEFAULT_SOURCES_TOML);
    if toml_p.exists() {
        return toml_p;
    }
    PathBuf::from(DEFAULT_SOURCES_JSON)
}

/// Load sources using env var + fallbacks:
/// 1) $FEED_DESK_SOURCES_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
/// 4) built-in default list
pub fn load_sources_default() -> Result<Vec<Source>> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        } else {
            return Err(anyhow!("{ENV_SOURCES_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from(DEFAULT_SOURCES_TOML);
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from(DEFAULT_SOURCES_JSON);
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Ok(default_sources())
}

/// Persist in the format the extension names: `[[sources]]` tables for
/// `.toml`, a JSON array otherwise.
pub fn save_sources_to(path: &Path, sources: &[Source]) -> Result<()> {
    if has_toml_ext(path) {
        #[derive(Serialize)]
        struct TomlOut<'a> {
            sources: &'a [Source],
        }
        let text = toml::to_string_pretty(&TomlOut { sources })?;
        return super::write_atomic(path, text.as_bytes());
    }
    super::write_json_atomic(path, sources)
}

fn has_toml_ext(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<Source>> {
    if hint_ext == "toml" {
        return parse_toml(s);
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    parse_toml(s).map_err(|_| anyhow!("unsupported sources format"))
}

fn parse_toml(s: &str) -> Result<Vec<Source>> {
    #[derive(Deserialize)]
    struct TomlSources {
        #[serde(default)]
        sources: Vec<Source>,
    }
    let v: TomlSources = toml::from_str(s)?;
    Ok(normalize_sources(v.sources))
}

fn parse_json(s: &str) -> Result<Vec<Source>> {
    let v: Vec<Source> = serde_json::from_str(s)?;
    Ok(normalize_sources(v))
}

/// Trim fields, drop rows without a URL, name unnamed rows after their URL.
pub fn normalize_sources(items: Vec<Source>) -> Vec<Source> {
    items
        .into_iter()
        .filter_map(|mut s| {
            s.url = s.url.trim().to_string();
            if s.url.is_empty() {
                return None;
            }
            s.name = s.name.trim().to_string();
            if s.name.is_empty() {
                s.name = s.url.clone();
            }
            Some(s)
        })
        .collect()
}
