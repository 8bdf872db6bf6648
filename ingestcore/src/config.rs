//! Configuration loading: file config merged with environment overrides
//! (§6.4).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Per-stage LLM override: triage, stage1, stage2, relevance_ai,
/// enrichment_reextract can each pin a different provider/model (§6.4).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StageConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub default_provider: String,
    pub default_model: String,
    pub fallback_provider: Option<String>,
    pub fallback_model: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub ollama_base_url: String,
    pub stage_overrides: HashMap<String, StageConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: "anthropic".to_string(),
            default_model: "claude-sonnet-4-20250514".to_string(),
            fallback_provider: None,
            fallback_model: None,
            anthropic_api_key: None,
            ollama_base_url: "http://localhost:11434/v1".to_string(),
            stage_overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub fetch: String,
    pub extraction: String,
    pub enrichment: String,
    pub default: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            fetch: "fetch".to_string(),
            extraction: "extraction".to_string(),
            enrichment: "enrichment".to_string(),
            default: "default".to_string(),
        }
    }
}

/// Beat schedule cron expressions (§6.4): hourly fetch, 15-min stale sweep,
/// 5-min metrics rollup, 6-hour view refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatScheduleConfig {
    pub fetch_cron: String,
    pub stale_sweep_cron: String,
    pub metrics_rollup_cron: String,
    pub view_refresh_cron: String,
}

impl Default for BeatScheduleConfig {
    fn default() -> Self {
        Self {
            fetch_cron: "0 * * * *".to_string(),
            stale_sweep_cron: "*/15 * * * *".to_string(),
            metrics_rollup_cron: "*/5 * * * *".to_string(),
            view_refresh_cron: "0 */6 * * *".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub broker_url: Option<String>,
    pub result_backend_url: Option<String>,
    pub llm: LlmConfig,
    pub queues: QueueConfig,
    pub beat_schedule: BeatScheduleConfig,
}

impl Config {
    /// Fallback chain: explicit path, then `./.ingestd.yml`, then
    /// `~/.config/ingestd/ingestd.yml`, then defaults. Environment variables
    /// always win over whatever the file says (§6.4).
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = config_path {
            Self::load_from_file(path).with_context(|| format!("failed to load config from {}", path.display()))?
        } else {
            Self::load_from_discovered_path()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_discovered_path() -> Self {
        let local = PathBuf::from(".ingestd.yml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => return config,
                Err(err) => tracing::warn!(path = %local.display(), %err, "failed to load local config"),
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ingestd").join("ingestd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return config,
                    Err(err) => tracing::warn!(path = %user_config.display(), %err, "failed to load user config"),
                }
            }
        }

        tracing::info!("no config file found, using defaults plus environment");
        Self::default()
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("failed to parse config file")?;
        tracing::info!(path = %path.as_ref().display(), "loaded config file");
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("DATABASE_URL") {
            self.database_url = value;
        }
        if let Ok(value) = std::env::var("BROKER_URL") {
            self.broker_url = Some(value);
        }
        if let Ok(value) = std::env::var("RESULT_BACKEND_URL") {
            self.result_backend_url = Some(value);
        }
        if let Ok(value) = std::env::var("ANTHROPIC_API_KEY") {
            self.llm.anthropic_api_key = Some(value);
        }
        if let Ok(value) = std::env::var("OLLAMA_BASE_URL") {
            self.llm.ollama_base_url = value;
        }
        if let Ok(value) = std::env::var("DEFAULT_PROVIDER") {
            self.llm.default_provider = value;
        }
        if let Ok(value) = std::env::var("DEFAULT_MODEL") {
            self.llm.default_model = value;
        }
        if let Ok(value) = std::env::var("FALLBACK_PROVIDER") {
            self.llm.fallback_provider = Some(value);
        }
        if let Ok(value) = std::env::var("FALLBACK_MODEL") {
            self.llm.fallback_model = Some(value);
        }
    }
}
