//! Runtime configuration, persisted as TOML.
//!
//! Every field carries a serde default so a partial (or missing) config file
//! still yields a usable setup.

use std::path::Path;
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::GeminiConfig;
use crate::model::LocationHint;
use crate::search::OpenLibraryConfig;

/// Errors from configuration loading.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(scout::config::read),
        help("Ensure the config file is readable, or remove it to fall back to defaults.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(scout::config::parse),
        help("Check the TOML syntax. `shelfscout config init --force` rewrites the defaults.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(scout::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutConfig {
    /// Base URL of the bibliographic search service.
    #[serde(default = "default_catalog_url")]
    pub catalog_url: String,
    /// Maximum number of candidates shown per search.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Timeout for a catalog search, in seconds.
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
    /// Base URL of the generative API.
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    /// Model used for grounded holdings inference.
    #[serde(default = "default_text_model")]
    pub text_model: String,
    /// Image-capable model used for shelf views.
    #[serde(default = "default_image_model")]
    pub image_model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_inference_timeout")]
    pub inference_timeout_secs: u64,
    #[serde(default = "default_image_timeout")]
    pub image_timeout_secs: u64,
    /// Location used when no coordinates are available.
    #[serde(default = "default_location")]
    pub default_location: String,
    /// How many holdings the inference request asks for.
    #[serde(default = "default_max_holdings")]
    pub max_holdings: usize,
}

fn default_catalog_url() -> String {
    "https://openlibrary.org".into()
}
fn default_search_limit() -> usize {
    12
}
fn default_search_timeout() -> u64 {
    15
}
fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_text_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_image_model() -> String {
    "gemini-2.5-flash-image".into()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_inference_timeout() -> u64 {
    60
}
fn default_image_timeout() -> u64 {
    90
}
fn default_location() -> String {
    "New York, NY".into()
}
fn default_max_holdings() -> usize {
    3
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            catalog_url: default_catalog_url(),
            search_limit: default_search_limit(),
            search_timeout_secs: default_search_timeout(),
            llm_base_url: default_llm_base_url(),
            text_model: default_text_model(),
            image_model: default_image_model(),
            api_key_env: default_api_key_env(),
            inference_timeout_secs: default_inference_timeout(),
            image_timeout_secs: default_image_timeout(),
            default_location: default_location(),
            max_holdings: default_max_holdings(),
        }
    }
}

impl ScoutConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load from a TOML file, or return defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// The fallback location hint.
    pub fn fallback_location(&self) -> LocationHint {
        LocationHint::Named(self.default_location.clone())
    }

    /// Settings for the catalog search client.
    pub fn catalog(&self) -> OpenLibraryConfig {
        OpenLibraryConfig {
            base_url: self.catalog_url.clone(),
            timeout: Duration::from_secs(self.search_timeout_secs),
        }
    }

    /// Settings for the generative client. The API key is read from the
    /// configured environment variable; a missing key is left empty and
    /// surfaces as an upstream failure on first use.
    pub fn generative(&self) -> GeminiConfig {
        GeminiConfig {
            base_url: self.llm_base_url.clone(),
            api_key: std::env::var(&self.api_key_env).unwrap_or_default(),
            text_model: self.text_model.clone(),
            image_model: self.image_model.clone(),
            text_timeout_secs: self.inference_timeout_secs,
            image_timeout_secs: self.image_timeout_secs,
        }
    }
}
