//! Configuration loading, validation, and management for llamaskill.
//!
//! Loads configuration from `~/.llamaskill/config.toml` (or an explicit
//! path) with environment variable overrides. Structural problems are
//! rejected at load time; required service settings (topics, language,
//! port) are checked by [`LlamaConfig::resolve`] when the service starts.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Service and backend settings
    #[serde(default)]
    pub llama: LlamaConfig,

    /// Keyword gate settings
    #[serde(default)]
    pub gate: GateConfig,
}

/// Settings for the chat skill and its backend (the `[llama]` table).
#[derive(Clone, Serialize, Deserialize)]
pub struct LlamaConfig {
    /// Topic carrying inbound text signals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_input: Option<String>,

    /// Topic replies are published to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_output: Option<String>,

    /// Optional topic carrying dialogue-manager intentions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_intention: Option<String>,

    /// Intention labels that activate the skill
    #[serde(default)]
    pub intentions: Vec<String>,

    /// Language the robot must answer in (e.g. "Nederlands")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Port of the local chat-completion server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Model identifier sent with each request
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// History length at which the conversation is reset
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Per-request timeout in seconds (0 = no timeout)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Placeholder key; local servers do not check it
    #[serde(default = "default_api_key")]
    pub api_key: String,

    /// Persona template; `{language}` is replaced by the configured language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,

    /// Text published when an accepted intention activates the skill
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
}

fn default_model() -> String {
    "local-model".into()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_max_history() -> usize {
    30
}
fn default_request_timeout() -> u64 {
    120
}
fn default_api_key() -> String {
    "not-needed".into()
}

impl Default for LlamaConfig {
    fn default() -> Self {
        Self {
            topic_input: None,
            topic_output: None,
            topic_intention: None,
            intentions: vec![],
            language: None,
            port: None,
            model: default_model(),
            temperature: default_temperature(),
            max_history: default_max_history(),
            request_timeout_secs: default_request_timeout(),
            api_key: default_api_key(),
            persona: None,
            greeting: None,
        }
    }
}

impl std::fmt::Debug for LlamaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlamaConfig")
            .field("topic_input", &self.topic_input)
            .field("topic_output", &self.topic_output)
            .field("topic_intention", &self.topic_intention)
            .field("intentions", &self.intentions)
            .field("language", &self.language)
            .field("port", &self.port)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_history", &self.max_history)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("api_key", &"[REDACTED]")
            .field("persona", &self.persona.as_ref().map(|_| "<custom>"))
            .field("greeting", &self.greeting)
            .finish()
    }
}

/// [`LlamaConfig`] with every required field present.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub topic_input: String,
    pub topic_output: String,
    pub topic_intention: Option<String>,
    pub intentions: Vec<String>,
    pub language: String,
    pub port: u16,
    pub greeting: Option<String>,
}

impl LlamaConfig {
    /// Check that the required settings are present.
    ///
    /// Missing values are fatal for the service: it must not start
    /// without knowing where to listen, where to publish and which
    /// backend to talk to.
    pub fn resolve(&self) -> Result<ServiceSettings, ConfigError> {
        fn required(value: &Option<String>, field: &'static str) -> Result<String, ConfigError> {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => Ok(v.to_string()),
                _ => Err(ConfigError::Missing(field)),
            }
        }

        let topic_intention = self
            .topic_intention
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from);

        Ok(ServiceSettings {
            topic_input: required(&self.topic_input, "llama.topic_input")?,
            topic_output: required(&self.topic_output, "llama.topic_output")?,
            topic_intention,
            intentions: self.intentions.clone(),
            language: required(&self.language, "llama.language")?,
            port: self.port.ok_or(ConfigError::Missing("llama.port"))?,
            greeting: self.greeting.clone(),
        })
    }
}

/// Order in which the two keyword sets are checked per token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrder {
    /// Acknowledgment-only set first, then topic set
    #[default]
    AckFirst,
    /// Topic set first, then acknowledgment-only set
    TopicFirst,
}

/// Keyword gate settings (the `[gate]` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Words that trigger a reply with a topic echo. Empty = always reply.
    #[serde(default = "default_topic_keywords")]
    pub topic_keywords: Vec<String>,

    /// Words that trigger a reply without topic echo
    #[serde(default = "default_ack_keywords")]
    pub ack_keywords: Vec<String>,

    /// First phrase bank of the acknowledgment prefix
    #[serde(default = "default_openers")]
    pub openers: Vec<String>,

    /// Second phrase bank of the acknowledgment prefix
    #[serde(default = "default_follow_ups")]
    pub follow_ups: Vec<String>,

    #[serde(default)]
    pub match_order: MatchOrder,
}

fn default_topic_keywords() -> Vec<String> {
    [
        "privacy",
        "robot",
        "robots",
        "waarden",
        "ethiek",
        "technologie",
        "gezondheid",
        "familie",
        "vrienden",
        "muziek",
        "sport",
        "eten",
        "vakantie",
        "werk",
        "school",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_ack_keywords() -> Vec<String> {
    [
        "hoi",
        "hallo",
        "hey",
        "goedemorgen",
        "goedemiddag",
        "goedenavond",
        "dank",
        "bedankt",
        "dankjewel",
        "leolani",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_openers() -> Vec<String> {
    [
        "Je zegt net: ",
        "Ik hoorde je zeggen: ",
        "Je had het net over ",
        "Oh, ",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_follow_ups() -> Vec<String> {
    [
        "Daar wil ik wel even op ingaan. ",
        "Daar heb ik wel iets over te zeggen. ",
        "Interessant onderwerp. ",
        "Laat me daar even over nadenken. ",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            topic_keywords: default_topic_keywords(),
            ack_keywords: default_ack_keywords(),
            openers: default_openers(),
            follow_ups: default_follow_ups(),
            match_order: MatchOrder::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.llamaskill/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `LLAMASKILL_LANGUAGE`
    /// - `LLAMASKILL_PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if let Ok(language) = std::env::var("LLAMASKILL_LANGUAGE") {
            config.llama.language = Some(language);
        }

        if let Ok(port) = std::env::var("LLAMASKILL_PORT") {
            let port = port.trim().parse::<u16>().map_err(|e| {
                ConfigError::ValidationError(format!("LLAMASKILL_PORT {port:?}: {e}"))
            })?;
            config.llama.port = Some(port);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.gate.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".llamaskill")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llama.temperature) {
            return Err(ConfigError::ValidationError(
                "llama.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.llama.max_history == 0 {
            return Err(ConfigError::ValidationError(
                "llama.max_history must be at least 1".into(),
            ));
        }

        if self.llama.port == Some(0) {
            return Err(ConfigError::ValidationError(
                "llama.port must not be 0".into(),
            ));
        }

        self.gate.validate()
    }

    /// A filled-in example config (for the `config --init` command).
    pub fn sample() -> Self {
        Self {
            llama: LlamaConfig {
                topic_input: Some("cltl.topic.text_in".into()),
                topic_output: Some("cltl.topic.text_out".into()),
                topic_intention: Some("cltl.topic.intention".into()),
                intentions: vec!["chat".into()],
                language: Some("Nederlands".into()),
                port: Some(9001),
                ..LlamaConfig::default()
            },
            gate: GateConfig::default(),
        }
    }

    /// Render the sample config as TOML.
    pub fn sample_toml() -> String {
        toml::to_string_pretty(&Self::sample()).unwrap_or_default()
    }
}

impl GateConfig {
    /// Lowercase and trim keywords; tokens are compared in lowercase.
    pub fn normalize(&mut self) {
        for list in [&mut self.topic_keywords, &mut self.ack_keywords] {
            for word in list.iter_mut() {
                *word = word.trim().to_lowercase();
            }
            list.retain(|w| !w.is_empty());
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let topics: HashSet<&str> = self.topic_keywords.iter().map(String::as_str).collect();
        let mut overlap: Vec<&str> = self
            .ack_keywords
            .iter()
            .map(String::as_str)
            .filter(|w| topics.contains(w))
            .collect();

        if !overlap.is_empty() {
            overlap.sort_unstable();
            return Err(ConfigError::ValidationError(format!(
                "gate.topic_keywords and gate.ack_keywords must be disjoint, both contain: {}",
                overlap.join(", ")
            )));
        }

        for word in self.topic_keywords.iter().chain(&self.ack_keywords) {
            if word.split_whitespace().nth(1).is_some() {
                tracing::warn!(
                    keyword = %word,
                    "Keyword contains whitespace and can never match a single token"
                );
            }
        }

        Ok(())
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}
