// src/config/dashboard.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

use super::RunConfiguration;

pub const ENV_CONFIG_PATH: &str = "FEED_DESK_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/dashboard.json";

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a top Wall Street intelligence officer. \
Score every news item from 0 to 10. Give a terse logic chain and a trading call (Long/Short). \
Be blunt and purely profit-driven.";

/// Settings persisted between runs. Missing keys fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DashboardConfig {
    pub api_url: String,
    pub api_key: String,
    /// Empty means direct connection.
    pub proxy_url: String,
    pub models: Vec<String>,
    pub selected_model: String,
    pub system_prompt: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            proxy_url: String::new(),
            models: vec![DEFAULT_MODEL.to_string(), "gpt-4o-mini".to_string()],
            selected_model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl DashboardConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let cfg: DashboardConfig = serde_json::from_str(&data)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        Ok(cfg)
    }

    /// Write defaults when the file is missing; fall back to defaults when it
    /// cannot be read or parsed.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            let cfg = Self::default();
            if let Err(e) = cfg.save_to(path) {
                tracing::warn!("could not write default settings: {e:#}");
            }
            return cfg;
        }
        Self::load_from_file(path).unwrap_or_else(|e| {
            tracing::warn!("settings unreadable, using defaults: {e:#}");
            Self::default()
        })
    }

    /// $FEED_DESK_CONFIG_PATH or config/dashboard.json.
    pub fn default_path() -> PathBuf {
        env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Settings from `default_path()`, then env overrides.
    pub fn load_default() -> Self {
        let path = Self::default_path();
        let mut cfg = Self::load_or_create(&path);
        cfg.apply_env_overrides();
        // Safe diagnostics: never the key itself
        tracing::info!(
            path = %path.display(),
            api_url = %cfg.api_url,
            model = %cfg.selected_model(),
            proxy = !cfg.proxy_url.trim().is_empty(),
            key_len = cfg.api_key.len(),
            "settings loaded"
        );
        cfg
    }

    /// `OPENAI_API_KEY` fills an empty key; `FEED_DESK_API_URL` and
    /// `FEED_DESK_PROXY` replace their fields.
    pub fn apply_env_overrides(&mut self) {
        if self.api_key.trim().is_empty() {
            if let Ok(k) = env::var("OPENAI_API_KEY") {
                self.api_key = k;
            }
        }
        if let Ok(u) = env::var("FEED_DESK_API_URL") {
            if !u.trim().is_empty() {
                self.api_url = u;
            }
        }
        if let Ok(p) = env::var("FEED_DESK_PROXY") {
            self.proxy_url = p;
        }
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        super::write_json_atomic(path.as_ref(), self)
    }

    /// Selected model if it is listed, else the first listed, else the default.
    pub fn selected_model(&self) -> String {
        if self.models.iter().any(|m| m == &self.selected_model) {
            return self.selected_model.clone();
        }
        self.models
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn run_configuration(&self) -> RunConfiguration {
        let proxy = self.proxy_url.trim();
        RunConfiguration {
            model: self.selected_model(),
            api_key: self.api_key.trim().to_string(),
            api_base: self.api_url.trim().to_string(),
            proxy: (!proxy.is_empty()).then(|| proxy.to_string()),
            system_prompt: self.system_prompt.clone(),
        }
    }
}
