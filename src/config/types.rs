use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: InferenceMode,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMode {
    #[default]
    Remote,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// File holding the bearer token; takes precedence over `token_env`.
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Resolved by `config::load`, never read from or written to YAML.
    #[serde(skip)]
    pub token: Option<Secret>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default)]
    pub runtime: LocalRuntime,
    /// Base URL of the OpenAI-compatible model runtime. Only read when
    /// `runtime` is `openai_compatible`.
    #[serde(default = "default_runtime_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default)]
    pub device: DeviceSetting,
    #[serde(default)]
    pub eager_load: bool,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

/// How local mode reaches the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalRuntime {
    /// Weights loaded into this process.
    #[default]
    InProcess,
    /// A model server on this host speaking the OpenAI chat API.
    OpenaiCompatible,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSetting {
    #[default]
    Auto,
    Cpu,
    Accelerator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// A credential that must never reach logs or serialized output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token_env: default_token_env(),
            token_file: None,
            timeout_secs: default_timeout_secs(),
            token: None,
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            runtime: LocalRuntime::default(),
            base_url: default_runtime_url(),
            model: default_model(),
            system_prompt: default_system_prompt(),
            max_new_tokens: default_max_new_tokens(),
            device: DeviceSetting::default(),
            eager_load: false,
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            logs: LogsConfig::default(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api-inference.huggingface.co/models/google/medgemma-4b-it".to_string()
}

fn default_token_env() -> String {
    "HF_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_runtime_url() -> String {
    "http://127.0.0.1:8000/v1".to_string()
}

fn default_model() -> String {
    "google/medgemma-4b-it".to_string()
}

fn default_system_prompt() -> String {
    "You are an expert radiologist.".to_string()
}

fn default_max_new_tokens() -> u32 {
    200
}

fn default_max_concurrent() -> usize {
    1
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}
