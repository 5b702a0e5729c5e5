use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,
    #[serde(default)]
    pub chatbot: ChatbotConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

impl Config {
    /// Configuration with every section at its default: no local model,
    /// no classifier, bundled knowledge base. The remote backend still
    /// activates when `OPENAI_API_KEY` is set.
    pub fn minimal() -> Self {
        Self {
            server: ServerConfig::default(),
            knowledge_base: KnowledgeBaseConfig::default(),
            chatbot: ChatbotConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
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
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KnowledgeBaseConfig {
    /// Alternative knowledge base file. The bundled data is used when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChatbotConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub local: LocalModelConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_model")]
    pub model: String,
    #[serde(default = "default_remote_base_url")]
    pub base_url: String,
    #[serde(default = "default_remote_temperature")]
    pub temperature: f32,
    #[serde(default = "default_remote_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            model: default_remote_model(),
            base_url: default_remote_base_url(),
            temperature: default_remote_temperature(),
            max_tokens: default_remote_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_remote_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_remote_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_remote_temperature() -> f32 {
    0.7
}
fn default_remote_max_tokens() -> u32 {
    300
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalModelConfig {
    /// Text-generation endpoint. The local backend is disabled when unset.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_local_model")]
    pub model: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_num_beams")]
    pub num_beams: u32,
    #[serde(default = "default_no_repeat_ngram_size")]
    pub no_repeat_ngram_size: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_local_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Probed with a `GET` at startup when set; a failed probe leaves the
    /// chatbot in knowledge-base-only mode.
    #[serde(default)]
    pub health_url: Option<String>,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            url: None,
            model: default_local_model(),
            max_new_tokens: default_max_new_tokens(),
            num_beams: default_num_beams(),
            no_repeat_ngram_size: default_no_repeat_ngram_size(),
            top_p: default_top_p(),
            temperature: default_local_temperature(),
            timeout_secs: default_timeout_secs(),
            health_url: None,
        }
    }
}

fn default_local_model() -> String {
    "microsoft/DialoGPT-medium".to_string()
}
fn default_max_new_tokens() -> u32 {
    100
}
fn default_num_beams() -> u32 {
    5
}
fn default_no_repeat_ngram_size() -> u32 {
    3
}
fn default_top_p() -> f32 {
    0.9
}
fn default_local_temperature() -> f32 {
    0.8
}

impl LocalModelConfig {
    pub fn is_enabled(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// Image-classification endpoint. Uploads fail with "model not loaded"
    /// when unset.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate a TOML configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    let remote = &config.chatbot.remote;
    if remote.max_tokens == 0 {
        anyhow::bail!("chatbot.remote.max_tokens must be > 0");
    }
    if !(0.0..=2.0).contains(&remote.temperature) {
        anyhow::bail!("chatbot.remote.temperature must be in [0.0, 2.0]");
    }

    let local = &config.chatbot.local;
    if local.max_new_tokens == 0 {
        anyhow::bail!("chatbot.local.max_new_tokens must be > 0");
    }
    if local.num_beams == 0 {
        anyhow::bail!("chatbot.local.num_beams must be >= 1");
    }
    if !(0.0..=1.0).contains(&local.top_p) || local.top_p == 0.0 {
        anyhow::bail!("chatbot.local.top_p must be in (0.0, 1.0]");
    }
    if local.temperature <= 0.0 {
        anyhow::bail!("chatbot.local.temperature must be > 0.0");
    }

    if remote.timeout_secs == 0 || local.timeout_secs == 0 || config.classifier.timeout_secs == 0
    {
        anyhow::bail!("timeout_secs must be > 0");
    }

    Ok(config)
}
