//! # Configuration Module
//!
//! Handles loading and validating the application configuration from
//! TOML files. Bindings live in profiles (see [`crate::profile`]); this
//! file only covers how the process runs.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::dispatch::obs::ObsSettings;
use crate::error::{ControllerKeysError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub obs: ObsConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
}

/// Ingestion loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Analog frames per second.
    #[serde(default = "default_frame_rate_hz")]
    pub frame_rate_hz: u32,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive; `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub file_enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

/// Usage statistics configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_stats_path")]
    pub stats_path: String,

    #[serde(default = "default_autosave_interval_s")]
    pub autosave_interval_s: u64,
}

/// Action worker configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,

    #[serde(default = "default_script_timeout_ms")]
    pub script_timeout_ms: u64,

    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

/// OBS websocket configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ObsConfig {
    #[serde(default = "default_obs_url")]
    pub url: String,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_obs_timeout_ms")]
    pub timeout_ms: u64,
}

/// Active profile configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProfileConfig {
    #[serde(default = "default_profile_path")]
    pub path: String,
}

// Default value functions
fn default_frame_rate_hz() -> u32 { 120 }

fn default_log_level() -> String { "info".to_string() }
fn default_log_dir() -> String { "./logs".to_string() }

fn default_telemetry_enabled() -> bool { true }
fn default_stats_path() -> String { "./data/stats.json".to_string() }
fn default_autosave_interval_s() -> u64 { 60 }

fn default_scripts_dir() -> String { "./scripts".to_string() }
fn default_script_timeout_ms() -> u64 { 5000 }
fn default_http_timeout_ms() -> u64 { 10000 }

fn default_obs_url() -> String { "ws://127.0.0.1:4455".to_string() }
fn default_obs_timeout_ms() -> u64 { 3000 }

fn default_profile_path() -> String { "./profiles/default.json".to_string() }

impl Default for EngineConfig {
    fn default() -> Self {
        Self { frame_rate_hz: default_frame_rate_hz() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_enabled: false,
            log_dir: default_log_dir(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            stats_path: default_stats_path(),
            autosave_interval_s: default_autosave_interval_s(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scripts_dir: default_scripts_dir(),
            script_timeout_ms: default_script_timeout_ms(),
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            url: default_obs_url(),
            password: None,
            timeout_ms: default_obs_timeout_ms(),
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self { path: default_profile_path() }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn invalid(message: &str) -> ControllerKeysError {
    ControllerKeysError::Config(toml::de::Error::custom(message))
}

impl EngineConfig {
    /// Time between two analog frames.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate_hz.max(1)))
    }
}

impl WorkerConfig {
    #[must_use]
    pub fn script_timeout(&self) -> Duration {
        Duration::from_millis(self.script_timeout_ms)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl ObsConfig {
    /// Connection settings for the OBS client.
    #[must_use]
    pub fn settings(&self) -> ObsSettings {
        ObsSettings {
            url: self.url.clone(),
            password: self.password.clone().filter(|p| !p.is_empty()),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use controller_keys::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Returns
    ///
    /// * `Result<()>` - Ok if valid, Err if invalid
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        // Validate frame rate
        if self.engine.frame_rate_hz < 30 || self.engine.frame_rate_hz > 1000 {
            return Err(invalid("frame_rate_hz must be between 30 and 1000"));
        }

        // Validate logging
        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(invalid("logging level must be one of: trace, debug, info, warn, error"));
        }

        if self.logging.file_enabled && self.logging.log_dir.is_empty() {
            return Err(invalid("log_dir cannot be empty when file logging is enabled"));
        }

        // Validate telemetry
        if self.telemetry.enabled && self.telemetry.stats_path.is_empty() {
            return Err(invalid("stats_path cannot be empty when telemetry is enabled"));
        }

        if self.telemetry.autosave_interval_s == 0 || self.telemetry.autosave_interval_s > 3600 {
            return Err(invalid("autosave_interval_s must be between 1 and 3600"));
        }

        // Validate worker timeouts
        if self.worker.script_timeout_ms == 0 || self.worker.script_timeout_ms > 60000 {
            return Err(invalid("script_timeout_ms must be between 1 and 60000"));
        }

        if self.worker.http_timeout_ms == 0 || self.worker.http_timeout_ms > 60000 {
            return Err(invalid("http_timeout_ms must be between 1 and 60000"));
        }

        // Validate OBS endpoint
        if !(self.obs.url.starts_with("ws://") || self.obs.url.starts_with("wss://")) {
            return Err(invalid("obs url must start with ws:// or wss://"));
        }

        if self.obs.timeout_ms == 0 || self.obs.timeout_ms > 60000 {
            return Err(invalid("obs timeout_ms must be between 1 and 60000"));
        }

        // Validate profile path
        if self.profile.path.is_empty() {
            return Err(invalid("profile path cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        Config {
            engine: EngineConfig {
                frame_rate_hz: default_frame_rate_hz(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                file_enabled: false,
                log_dir: default_log_dir(),
            },
            telemetry: TelemetryConfig {
                enabled: default_telemetry_enabled(),
                stats_path: default_stats_path(),
                autosave_interval_s: default_autosave_interval_s(),
            },
            worker: WorkerConfig {
                scripts_dir: default_scripts_dir(),
                script_timeout_ms: default_script_timeout_ms(),
                http_timeout_ms: default_http_timeout_ms(),
            },
            obs: ObsConfig {
                url: default_obs_url(),
                password: None,
                timeout_ms: default_obs_timeout_ms(),
            },
            profile: ProfileConfig {
                path: default_profile_path(),
            },
        }
    }

    // ==================== Loading Tests ====================

    #[test]
    fn test_default_config() {
        assert!(create_valid_config().validate().is_ok());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[engine]
frame_rate_hz = 250

[logging]
level = "debug"

[obs]
password = "hunter2"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.engine.frame_rate_hz, 250);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.obs.settings().password.as_deref(), Some("hunter2"));
        assert_eq!(config.worker.script_timeout_ms, default_script_timeout_ms());
        assert_eq!(config.profile.path, default_profile_path());
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        use tempfile::NamedTempFile;

        let temp_file = NamedTempFile::new().unwrap();
        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.engine.frame_rate_hz, 120);
        assert!(config.telemetry.enabled);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[engine]\nframe_rate_hz = 5\n").unwrap();
        temp_file.flush().unwrap();

        assert!(matches!(
            Config::load(temp_file.path()),
            Err(ControllerKeysError::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load("/definitely/not/here.toml"),
            Err(ControllerKeysError::Io(_))
        ));
    }

    // ==================== Derived Value Tests ====================

    #[test]
    fn test_frame_interval() {
        let mut config = create_valid_config();
        config.engine.frame_rate_hz = 100;
        assert_eq!(config.engine.frame_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_obs_settings_ignore_empty_password() {
        let mut config = create_valid_config();
        config.obs.password = Some(String::new());
        config.obs.timeout_ms = 1500;

        let settings = config.obs.settings();
        assert_eq!(settings.password, None);
        assert_eq!(settings.timeout, Duration::from_millis(1500));
        assert_eq!(settings.url, "ws://127.0.0.1:4455");
    }

    // ==================== Validation Tests ====================

    #[test]
    fn test_frame_rate_too_low() {
        let mut config = create_valid_config();
        config.engine.frame_rate_hz = 29;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_frame_rate_too_high() {
        let mut config = create_valid_config();
        config.engine.frame_rate_hz = 1001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_level() {
        let mut config = create_valid_config();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_case_insensitive() {
        let mut config = create_valid_config();
        config.logging.level = "WARN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_log_dir_when_file_enabled() {
        let mut config = create_valid_config();
        config.logging.file_enabled = true;
        config.logging.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_file_disabled() {
        let mut config = create_valid_config();
        config.logging.file_enabled = false;
        config.logging.log_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_stats_path_when_enabled() {
        let mut config = create_valid_config();
        config.telemetry.stats_path = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_stats_path_when_disabled() {
        let mut config = create_valid_config();
        config.telemetry.enabled = false;
        config.telemetry.stats_path = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_autosave_interval_zero() {
        let mut config = create_valid_config();
        config.telemetry.autosave_interval_s = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_script_timeout_zero() {
        let mut config = create_valid_config();
        config.worker.script_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_http_timeout_too_high() {
        let mut config = create_valid_config();
        config.worker.http_timeout_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_obs_url_scheme() {
        let mut config = create_valid_config();
        config.obs.url = "http://127.0.0.1:4455".to_string();
        assert!(config.validate().is_err());

        config.obs.url = "wss://obs.local:4455".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_obs_timeout_zero() {
        let mut config = create_valid_config();
        config.obs.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_profile_path() {
        let mut config = create_valid_config();
        config.profile.path = String::new();
        assert!(config.validate().is_err());
    }
}
