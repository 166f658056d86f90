//! Configuration loading, validation, and management for Jarvis.
//!
//! Loads configuration from `~/.jarvis/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.jarvis/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the chat and speech endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Assistant persona
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Calendar collaborator
    #[serde(default)]
    pub calendar: CalendarConfig,

    /// Weather collaborator
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Speech-to-text / text-to-speech
    #[serde(default)]
    pub speech: SpeechConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("gateway", &self.gateway)
            .field("assistant", &self.assistant)
            .field("calendar", &self.calendar)
            .field("weather", &self.weather)
            .field("speech", &self.speech)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Upper bound for request bodies (audio uploads included)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    5000
}
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_max_body_bytes() -> usize {
    25 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Who the assistant is and how it addresses its user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_name")]
    pub name: String,

    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// Forms of address the assistant rotates through
    #[serde(default = "default_honorifics")]
    pub honorifics: Vec<String>,

    /// Language every reply must be written in
    #[serde(default = "default_language")]
    pub language: String,

    /// Region label shown next to the current date/time
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_assistant_name() -> String {
    "Jarvis".into()
}
fn default_user_name() -> String {
    "Santi".into()
}
fn default_honorifics() -> Vec<String> {
    ["Jefe", "Boss", "Señor", "Patrón", "Santi"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_language() -> String {
    "español castellano".into()
}
fn default_region() -> String {
    "España".into()
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
            user_name: default_user_name(),
            honorifics: default_honorifics(),
            language: default_language(),
            region: default_region(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,

    /// Where the OAuth token is persisted. Defaults to `~/.jarvis/calendar_token.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default = "default_calendar_api_url")]
    pub api_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// IANA zone attached to created events
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_calendar_id() -> String {
    "primary".into()
}
fn default_calendar_api_url() -> String {
    "https://www.googleapis.com/calendar/v3".into()
}
fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".into()
}
fn default_timezone() -> String {
    "Europe/Madrid".into()
}

impl CalendarConfig {
    /// Resolved token path.
    pub fn token_path(&self) -> PathBuf {
        self.token_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::config_dir().join("calendar_token.json"))
    }
}

impl std::fmt::Debug for CalendarConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarConfig")
            .field("enabled", &self.enabled)
            .field("calendar_id", &self.calendar_id)
            .field("token_path", &self.token_path)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("api_url", &self.api_url)
            .field("token_url", &self.token_url)
            .field("timezone", &self.timezone)
            .finish()
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            calendar_id: default_calendar_id(),
            token_path: None,
            client_id: None,
            client_secret: None,
            api_url: default_calendar_api_url(),
            token_url: default_token_url(),
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_geocoding_url")]
    pub geocoding_url: String,

    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,

    /// Language for place names returned by the geocoder
    #[serde(default = "default_short_language")]
    pub language: String,
}

fn default_geocoding_url() -> String {
    "https://geocoding-api.open-meteo.com/v1".into()
}
fn default_forecast_url() -> String {
    "https://api.open-meteo.com/v1".into()
}
fn default_short_language() -> String {
    "es".into()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            geocoding_url: default_geocoding_url(),
            forecast_url: default_forecast_url(),
            language: default_short_language(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    /// ISO-639-1 hint passed to the transcriber
    #[serde(default = "default_short_language")]
    pub language: String,

    #[serde(default = "default_speed")]
    pub speed: f32,
}

fn default_transcription_model() -> String {
    "whisper-1".into()
}
fn default_tts_model() -> String {
    "tts-1".into()
}
fn default_voice() -> String {
    "nova".into()
}
fn default_speed() -> f32 {
    1.0
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            transcription_model: default_transcription_model(),
            tts_model: default_tts_model(),
            voice: default_voice(),
            language: default_short_language(),
            speed: default_speed(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.jarvis/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `JARVIS_API_KEY`, then `OPENAI_API_KEY`
    /// - `JARVIS_MODEL`, `JARVIS_BASE_URL`, `PORT`
    /// - `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
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

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (injected so tests don't touch the process env).
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(key) = lookup("JARVIS_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("JARVIS_MODEL") {
            self.model = model;
        }
        if let Some(url) = lookup("JARVIS_BASE_URL") {
            self.base_url = url;
        }
        if let Some(port) = lookup("PORT") {
            self.gateway.port = port
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("PORT is not a valid port: {port}")))?;
        }
        if let Some(id) = lookup("GOOGLE_CLIENT_ID") {
            self.calendar.client_id = Some(id);
        }
        if let Some(secret) = lookup("GOOGLE_CLIENT_SECRET") {
            self.calendar.client_secret = Some(secret);
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".jarvis")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }

        if !(0.25..=4.0).contains(&self.speech.speed) {
            return Err(ConfigError::ValidationError(
                "speech.speed must be between 0.25 and 4.0".into(),
            ));
        }

        if self.assistant.honorifics.is_empty() {
            return Err(ConfigError::ValidationError(
                "assistant.honorifics must list at least one form of address".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            gateway: GatewayConfig::default(),
            assistant: AssistantConfig::default(),
            calendar: CalendarConfig::default(),
            weather: WeatherConfig::default(),
            speech: SpeechConfig::default(),
        }
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
}
