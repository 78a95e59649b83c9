//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use companion_core::{EmotionLabel, ScoringPolicy};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: Option<String>,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub chat_model: String,
    pub emotion_model: String,
    pub sst_model: String,
    pub capture_frames_dir: Option<PathBuf>,
    pub session: SessionSettings,
    pub scoring_policy: ScoringPolicy,
}

/// Tunables for chat sessions and their background capture loops.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    pub capture_interval: Duration,
    pub capture_retry_delay: Duration,
    pub history_window: usize,
    pub history_capacity: usize,
    pub idle_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_secs(20),
            capture_retry_delay: Duration::from_secs(5),
            history_window: 5,
            history_capacity: 50,
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Load Server and Database Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = lookup("DATABASE_URL");

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Model Backend Settings ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let chat_model = lookup("CHAT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let emotion_model = lookup("EMOTION_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let sst_model = lookup("SST_MODEL").unwrap_or_else(|| "whisper-1".to_string());

        // --- Load Session Settings ---
        let capture_frames_dir = lookup("CAPTURE_FRAMES_DIR").map(PathBuf::from);
        let defaults = SessionSettings::default();
        let session = SessionSettings {
            capture_interval: secs_var(&lookup, "CAPTURE_INTERVAL_SECS", defaults.capture_interval)?,
            capture_retry_delay: secs_var(&lookup, "CAPTURE_RETRY_SECS", defaults.capture_retry_delay)?,
            history_window: usize_var(&lookup, "HISTORY_WINDOW", defaults.history_window)?,
            history_capacity: usize_var(&lookup, "HISTORY_CAPACITY", defaults.history_capacity)?,
            idle_timeout: secs_var(&lookup, "SESSION_IDLE_TIMEOUT_SECS", defaults.idle_timeout)?,
        };
        session.validate()?;

        let scoring_policy = match lookup("SCORING_POLICY_PATH") {
            Some(path) => load_scoring_policy(Path::new(&path))?,
            None => ScoringPolicy::default(),
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            chat_model,
            emotion_model,
            sst_model,
            capture_frames_dir,
            session,
            scoring_policy,
        })
    }
}

impl SessionSettings {
    /// Delays must be positive and the history window must be positive and fit within the
    /// capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("CAPTURE_INTERVAL_SECS", self.capture_interval),
            ("CAPTURE_RETRY_SECS", self.capture_retry_delay),
            ("SESSION_IDLE_TIMEOUT_SECS", self.idle_timeout),
        ];
        for (name, value) in positive {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(
                    name.to_string(),
                    "must be greater than zero".to_string(),
                ));
            }
        }
        if self.history_window == 0 {
            return Err(ConfigError::InvalidValue(
                "HISTORY_WINDOW".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if self.history_capacity < self.history_window {
            return Err(ConfigError::InvalidValue(
                "HISTORY_CAPACITY".to_string(),
                "must be at least HISTORY_WINDOW".to_string(),
            ));
        }
        Ok(())
    }
}

fn usize_var(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn secs_var(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

//=========================================================================================
// Scoring Policy File
//=========================================================================================

/// On-disk shape of the scoring policy. Missing keys keep the built-in defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScoringPolicyFile {
    #[serde(default)]
    indicator_weights: HashMap<String, f64>,
    default_weight: Option<f64>,
    moderate_threshold: Option<f64>,
    high_threshold: Option<f64>,
}

impl ScoringPolicyFile {
    fn into_policy(self) -> Result<ScoringPolicy, String> {
        let defaults = ScoringPolicy::default();
        let mut weights = defaults.indicator_weights().clone();
        for (raw_label, weight) in self.indicator_weights {
            let label = EmotionLabel::from_classifier_label(&raw_label);
            if label == EmotionLabel::Unknown && raw_label.trim().to_lowercase() != "unknown" {
                return Err(format!("unrecognised emotion label '{}'", raw_label));
            }
            weights.insert(label, weight);
        }
        ScoringPolicy::new(
            weights,
            self.default_weight.unwrap_or(defaults.default_weight()),
            self.moderate_threshold.unwrap_or(defaults.moderate_threshold()),
            self.high_threshold.unwrap_or(defaults.high_threshold()),
        )
        .map_err(|e| e.to_string())
    }
}

/// Reads and validates a JSON scoring policy.
pub fn load_scoring_policy(path: &Path) -> Result<ScoringPolicy, ConfigError> {
    let invalid = |msg: String| ConfigError::InvalidValue("SCORING_POLICY_PATH".to_string(), msg);
    let raw = std::fs::read_to_string(path)
        .map_err(|e| invalid(format!("{}: {}", path.display(), e)))?;
    parse_scoring_policy(&raw).map_err(invalid)
}

fn parse_scoring_policy(raw: &str) -> Result<ScoringPolicy, String> {
    let file: ScoringPolicyFile = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    file.into_policy()
}
