// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Configuration management for the running coach

pub mod training;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::constants::{env_config, limits, llm, wahoo_api};

pub use training::{RunningParams, Time, TrainingConfig, WeekObjective};

const CONFIG_FILE: &str = "wahoo-coach/config.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "env_config::database_url")]
    pub database_url: String,
    #[serde(default)]
    pub wahoo: WahooConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub training: Option<TrainingConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WahooConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Fixed bearer token; bypasses the stored token pair when set
    pub access_token: Option<String>,
    #[serde(default = "env_config::wahoo_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "env_config::wahoo_api_base")]
    pub api_base: String,
    pub scopes: Option<Vec<String>>,
}

impl Default for WahooConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            access_token: None,
            redirect_uri: env_config::wahoo_redirect_uri(),
            api_base: wahoo_api::DEFAULT_API_BASE.to_string(),
            scopes: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    #[serde(default = "env_config::llm_model")]
    pub model: String,
    #[serde(default = "env_config::llm_base_url")]
    pub base_url: String,
    #[serde(default = "env_config::llm_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: llm::DEFAULT_MODEL.to_string(),
            base_url: llm::DEFAULT_BASE_URL.to_string(),
            temperature: llm::DEFAULT_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default = "env_config::page_size")]
    pub per_page: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            per_page: limits::DEFAULT_PAGE_SIZE,
        }
    }
}

fn default_config_path() -> String {
    dirs::config_dir()
        .map(|p| p.join(CONFIG_FILE))
        .unwrap_or_else(|| "config.toml".into())
        .to_string_lossy()
        .to_string()
}

impl Config {
    /// Load from a TOML file when one exists, otherwise from the environment
    pub fn load(path: Option<String>) -> Result<Self> {
        let config_path = path.unwrap_or_else(default_config_path);

        let config = if Path::new(&config_path).exists() {
            let content = fs::read_to_string(&config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            dotenv::dotenv().ok();
            Self::from_env()?
        };

        config.validate()?;
        Ok(config)
    }

    /// Build configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let training = match std::env::var("TRAINING_FILE") {
            Ok(path) => Some(TrainingConfig::load_from_file(&path)?),
            Err(_) => None,
        };

        Ok(Self {
            wahoo: WahooConfig {
                client_id: std::env::var("WAHOO_CLIENT_ID").ok(),
                client_secret: std::env::var("WAHOO_CLIENT_SECRET").ok(),
                access_token: std::env::var("WAHOO_ACCESS_TOKEN").ok(),
                redirect_uri: env_config::wahoo_redirect_uri(),
                api_base: env_config::wahoo_api_base(),
                scopes: None,
            },
            database_url: env_config::database_url(),
            llm: LlmConfig {
                api_key: std::env::var("LLM_API_KEY")
                    .or_else(|_| std::env::var("OPENAI_API_KEY"))
                    .ok(),
                model: env_config::llm_model(),
                base_url: env_config::llm_base_url(),
                temperature: env_config::llm_temperature(),
            },
            sync: SyncConfig {
                per_page: env_config::page_size(),
            },
            training,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let per_page = self.sync.per_page;
        if !(1..=limits::MAX_PAGE_SIZE).contains(&per_page) {
            anyhow::bail!(
                "sync.per_page must be between 1 and {}, got {per_page}",
                limits::MAX_PAGE_SIZE
            );
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("llm.temperature must be between 0 and 2, got {}", self.llm.temperature);
        }
        if let Some(training) = &self.training {
            training.validate().context("Invalid training configuration")?;
        }
        Ok(())
    }

    /// Training section, required by plan generation
    pub fn training(&self) -> Result<&TrainingConfig> {
        self.training
            .as_ref()
            .context("No training configuration; add a [training] section or set TRAINING_FILE")
    }
}
