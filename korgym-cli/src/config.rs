//! Harness configuration, read from `korgym.toml`.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use korgym_core::{GameServerConfig, ProviderConfig, SessionConfig};
use korgym_judge::JudgeConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "korgym.toml";

/// Harness configuration (TOML). Missing fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub server: GameServerConfig,
    pub session: SessionConfig,
    pub llm: LlmConfig,
    pub judge: JudgeConfig,
}

/// OpenAI-compatible endpoint used by both the agent and the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key; unset or empty means no auth
    pub api_key_env: String,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl LlmConfig {
    pub fn provider_config(&self) -> ProviderConfig {
        let api_key = std::env::var(&self.api_key_env).ok();
        ProviderConfig::local(self.base_url.clone(), self.model.clone())
            .with_api_key(api_key)
            .with_timeout(self.timeout_secs)
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(anyhow!("server.host must be non-empty"));
        }
        if self.server.timeout_secs == 0 {
            return Err(anyhow!("server.timeout_secs must be > 0"));
        }
        if self.llm.base_url.trim().is_empty() {
            return Err(anyhow!("llm.base_url must be non-empty"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        self.session.validate()?;
        self.judge.validate()?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serialize config toml")
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `HarnessConfig::default()`.
pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    if !path.exists() {
        let cfg = HarnessConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: HarnessConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
