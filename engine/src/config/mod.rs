//! Configuration management
//!
//! This module handles loading, validation, and management of the Cadence configuration.
//! Configuration is stored in TOML format at ~/.cadence/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Model provider settings and preferences
//! - **conversation**: Termination token, turn and iteration ceilings, timeouts
//! - **calendar**: Calendar API endpoint and OAuth token location
//! - **api**: HTTP adapter bind address and CORS origins
//!
//! # Examples
//!
//! ```no_run
//! use cadence_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Default provider: {}", config.llm.default_provider);
//! println!("Termination token: {}", config.conversation.termination_token);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Conversation loop limits
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Calendar integration
    #[serde(default)]
    pub calendar: CalendarConfig,

    /// HTTP adapter settings
    #[serde(default)]
    pub api: ApiConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Default LLM provider (gemini, openai, ollama)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Per-attempt timeout for cloud providers, in seconds
    #[serde(default = "default_cloud_timeout")]
    pub cloud_timeout_secs: u64,

    /// Per-attempt timeout for local providers, in seconds
    #[serde(default = "default_local_timeout")]
    pub local_timeout_secs: u64,

    /// Gemini settings (OpenAI-compatible endpoint)
    #[serde(default = "default_gemini")]
    pub gemini: ProviderEndpoint,

    /// OpenAI settings
    #[serde(default = "default_openai")]
    pub openai: ProviderEndpoint,

    /// Ollama settings
    #[serde(default = "default_ollama")]
    pub ollama: ProviderEndpoint,
}

/// Base URL and model for one provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub model: String,
    // Note: API keys come from the environment or the OS keychain, not from config
}

/// Conversation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Text that ends the conversation when it appears in the latest human turn
    #[serde(default = "default_termination_token")]
    pub termination_token: String,

    /// Maximum turns appended in one run before the conversation terminates
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Maximum routing iterations in one run before the run is declared non-convergent
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Upper bound for a single participant invocation, in seconds
    #[serde(default = "default_participant_timeout")]
    pub participant_timeout_secs: u64,

    /// IANA timezone name used for schedules that omit one
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

/// Calendar integration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Calendar API base URL
    #[serde(default = "default_calendar_base_url")]
    pub base_url: String,

    /// Target calendar id
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,

    /// OAuth token file (supports ~ expansion)
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
}

/// HTTP adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.cadence")
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_cloud_timeout() -> u64 {
    30
}

fn default_local_timeout() -> u64 {
    120
}

fn default_gemini() -> ProviderEndpoint {
    ProviderEndpoint {
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
        model: "gemini-2.5-flash".to_string(),
    }
}

fn default_openai() -> ProviderEndpoint {
    ProviderEndpoint {
        base_url: "https://api.openai.com/v1".to_string(),
        model: "gpt-4o-mini".to_string(),
    }
}

fn default_ollama() -> ProviderEndpoint {
    ProviderEndpoint {
        base_url: "http://localhost:11434".to_string(),
        model: "llama3.1:8b".to_string(),
    }
}

fn default_termination_token() -> String {
    "EXIT".to_string()
}

fn default_max_turns() -> usize {
    10
}

fn default_max_iterations() -> usize {
    25
}

fn default_participant_timeout() -> u64 {
    120
}

fn default_timezone() -> String {
    "Asia/Ho_Chi_Minh".to_string()
}

fn default_calendar_base_url() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_token_path() -> PathBuf {
    PathBuf::from("~/.cadence/token.json")
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:8080".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:8080".to_string(),
    ]
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            cloud_timeout_secs: default_cloud_timeout(),
            local_timeout_secs: default_local_timeout(),
            gemini: default_gemini(),
            openai: default_openai(),
            ollama: default_ollama(),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            termination_token: default_termination_token(),
            max_turns: default_max_turns(),
            max_iterations: default_max_iterations(),
            participant_timeout_secs: default_participant_timeout(),
            timezone: default_timezone(),
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            base_url: default_calendar_base_url(),
            calendar_id: default_calendar_id(),
            token_path: default_token_path(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.cadence/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.cadence/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".cadence").join("config.toml"))
    }

    /// Validate fields and expand ~ in paths
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["gemini", "openai", "ollama"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        if self.conversation.termination_token.trim().is_empty() {
            return Err(EngineError::Config(
                "termination_token must not be empty".to_string(),
            ));
        }
        if self.conversation.max_turns == 0 {
            return Err(EngineError::Config(
                "max_turns must be at least 1".to_string(),
            ));
        }
        if self.conversation.max_iterations == 0 {
            return Err(EngineError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.conversation.participant_timeout_secs == 0 {
            return Err(EngineError::Config(
                "participant_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.conversation.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(EngineError::Config(format!(
                "Unknown timezone '{}'. Use an IANA name such as Asia/Ho_Chi_Minh",
                self.conversation.timezone
            )));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.calendar.token_path = expand_path(&self.calendar.token_path)?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
pub fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.default_provider, "gemini");
        assert_eq!(config.llm.gemini.model, "gemini-2.5-flash");
        assert_eq!(config.conversation.termination_token, "EXIT");
        assert_eq!(config.conversation.max_turns, 10);
        assert_eq!(config.calendar.calendar_id, "primary");
        assert_eq!(config.api.port, 8000);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.conversation.max_iterations, 25);
        assert_eq!(config.conversation.timezone, "Asia/Ho_Chi_Minh");
    }

    #[test]
    fn test_invalid_provider_rejected() {
        let err = Config::from_toml_str("[llm]\ndefault_provider = \"nope\"\n").unwrap_err();
        assert!(err.to_string().contains("Invalid default provider"));
    }

    #[test]
    fn test_empty_termination_token_rejected() {
        let err =
            Config::from_toml_str("[conversation]\ntermination_token = \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("termination_token"));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.llm.gemini, deserialized.llm.gemini);
        assert_eq!(
            config.conversation.termination_token,
            deserialized.conversation.termination_token
        );
    }
}
