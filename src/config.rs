use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub const ENV_API_KEY: &str = "YANDEX_GPT_API_KEY";
pub const ENV_MODEL_URI: &str = "YANDEX_GPT_MODEL_URI";
pub const ENV_SYSTEM_PROMPT: &str = "YANDEX_GPT_SYSTEM_PROMPT";
pub const ENV_FOLDER_ID: &str = "YANDEX_GPT_FOLDER_ID";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub map_proxy: MapProxyConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn notes_path(&self) -> PathBuf {
        self.data_dir.join("notes.json")
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssetsConfig {
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            public_dir: default_public_dir(),
        }
    }
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("./public")
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapProxyConfig {
    #[serde(default = "default_map_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_map_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MapProxyConfig {
    fn default() -> Self {
        Self {
            endpoint: default_map_endpoint(),
            user_agent: default_user_agent(),
            timeout_secs: default_map_timeout_secs(),
        }
    }
}

fn default_map_endpoint() -> String {
    "https://map.ru/api/kad/search".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}
fn default_map_timeout_secs() -> u64 {
    10
}

/// Language-model settings.
///
/// Endpoint and tuning come from the TOML file; credentials are never read
/// from it and are filled by [`LlmCredentials::from_env`] instead.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_api_url")]
    pub api_url: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(skip)]
    pub credentials: LlmCredentials,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_llm_api_url(),
            timeout_secs: default_llm_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            credentials: LlmCredentials::default(),
        }
    }
}

fn default_llm_api_url() -> String {
    "https://llm.api.cloud.yandex.net/foundationModels/v1/completion".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_temperature() -> f64 {
    0.25
}
fn default_max_tokens() -> u32 {
    1000
}

impl LlmConfig {
    /// The AI endpoint is enabled only when both the key and the model URI are set.
    pub fn is_enabled(&self) -> bool {
        self.credentials.api_key.is_some() && self.credentials.model_uri.is_some()
    }

    /// Names of the required environment variables that are currently unset.
    pub fn missing_variables(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.credentials.api_key.is_none() {
            missing.push(ENV_API_KEY);
        }
        if self.credentials.model_uri.is_none() {
            missing.push(ENV_MODEL_URI);
        }
        missing
    }
}

/// YandexGPT credentials and optional overrides.
///
/// Blank values are stored as `None`. `Debug` redacts the API key.
#[derive(Clone, Default)]
pub struct LlmCredentials {
    pub api_key: Option<String>,
    pub model_uri: Option<String>,
    pub system_prompt: Option<String>,
    pub folder_id: Option<String>,
}

impl fmt::Debug for LlmCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model_uri", &self.model_uri)
            .field("system_prompt", &self.system_prompt.as_ref().map(|_| "<set>"))
            .field("folder_id", &self.folder_id)
            .finish()
    }
}

impl LlmCredentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds credentials from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            api_key: read(ENV_API_KEY),
            model_uri: read(ENV_MODEL_URI),
            system_prompt: read(ENV_SYSTEM_PROMPT),
            folder_id: read(ENV_FOLDER_ID),
        }
    }
}

/// Loads the TOML config at `path` and overlays credentials from the environment.
///
/// A missing file is not an error: every section has defaults suitable for
/// running from the project directory.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str::<Config>(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    validate(&config)?;

    config.llm.credentials = LlmCredentials::from_env();
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }
    if config.map_proxy.timeout_secs == 0 {
        anyhow::bail!("map_proxy.timeout_secs must be > 0");
    }
    if config.llm.timeout_secs == 0 {
        anyhow::bail!("llm.timeout_secs must be > 0");
    }
    if !(0.0..=1.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 1.0]");
    }
    if config.llm.max_tokens == 0 {
        anyhow::bail!("llm.max_tokens must be > 0");
    }
    Ok(())
}
