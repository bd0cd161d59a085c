use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Environment variable that overrides the config file location
pub const CONFIG_PATH_ENV: &str = "TOWERCAM_CONFIG";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the database and image artifacts live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Weather observation source
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Tower webcam source
    #[serde(default)]
    pub tower: TowerConfig,

    /// Remote fetch settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Annotation and client refresh settings
    #[serde(default)]
    pub display: DisplayConfig,

    /// HTTP front end
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding every file below
    pub data_dir: PathBuf,

    /// SQLite database holding the freshness record
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Last downloaded webcam frame
    #[serde(default = "default_raw_frame_file")]
    pub raw_frame_file: String,

    /// Last rendered composite
    #[serde(default = "default_composite_file")]
    pub composite_file: String,
}

fn default_database_file() -> String {
    "towercam.sqlite".to_string()
}

fn default_raw_frame_file() -> String {
    "rawtower.jpg".to_string()
}

fn default_composite_file() -> String {
    "tower.png".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("towercam")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            raw_frame_file: default_raw_frame_file(),
            composite_file: default_composite_file(),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn raw_frame_path(&self) -> PathBuf {
        self.data_dir.join(&self.raw_frame_file)
    }

    pub fn composite_path(&self) -> PathBuf {
        self.data_dir.join(&self.composite_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Observation page to scrape
    pub page_url: String,

    /// Seconds a successful reading stays fresh
    pub update_interval_secs: u64,

    /// Minimum seconds between two fetch attempts
    pub attempt_interval_secs: u64,

    /// IANA timezone the page reports its observation time in
    #[serde(default = "default_weather_timezone")]
    pub timezone: String,
}

fn default_weather_timezone() -> String {
    "Europe/London".to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            page_url: "http://www.metoffice.gov.uk/weather/uk/se/solent_latest_temp.html"
                .to_string(),
            update_interval_secs: 3600,
            attempt_interval_secs: 300,
            timezone: default_weather_timezone(),
        }
    }
}

impl WeatherConfig {
    /// Parse the configured timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone {}: {}", self.timezone, e))
    }
}

/// Wall-clock cadence the webcam publishes new frames on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Minutes between two frames
    pub period_minutes: u32,

    /// Minute-of-hour (mod period) a new frame lands on
    pub phase_minute: u32,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            period_minutes: 5,
            phase_minute: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TowerConfig {
    /// Webcam image to download
    pub image_url: String,

    /// Seconds a downloaded frame stays fresh
    pub update_interval_secs: u64,

    /// Minimum seconds between two download attempts
    pub attempt_interval_secs: u64,

    #[serde(default)]
    pub cadence: CadenceConfig,
}

impl Default for TowerConfig {
    fn default() -> Self {
        Self {
            image_url: "http://www.forms.portsmouth.gov.uk/webcam/tower.jpg".to_string(),
            update_interval_secs: 300,
            attempt_interval_secs: 60,
            cadence: CadenceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Upper bound on any single remote fetch
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

fn default_fetch_timeout() -> u64 {
    10
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Suffix drawn after the temperature
    #[serde(default = "default_temperature_unit")]
    pub temperature_unit: String,

    /// Suffix drawn after the wind speed
    #[serde(default = "default_wind_unit")]
    pub wind_unit: String,

    /// Lower bound on the client refresh hint
    #[serde(default = "default_min_poll_secs")]
    pub min_poll_secs: u64,
}

fn default_temperature_unit() -> String {
    "°C".to_string()
}

fn default_wind_unit() -> String {
    " mph".to_string()
}

fn default_min_poll_secs() -> u64 {
    60
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            temperature_unit: default_temperature_unit(),
            wind_unit: default_wind_unit(),
            min_poll_secs: default_min_poll_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            weather: WeatherConfig::default(),
            tower: TowerConfig::default(),
            fetch: FetchConfig::default(),
            display: DisplayConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, writing defaults there if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            tracing::info!("Wrote default config to {}", config_path.display());
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.weather.page_url, "weather.page_url", &mut result);
        self.validate_url(&self.tower.image_url, "tower.image_url", &mut result);

        validate_intervals(
            "weather",
            self.weather.update_interval_secs,
            self.weather.attempt_interval_secs,
            &mut result,
        );
        validate_intervals(
            "tower",
            self.tower.update_interval_secs,
            self.tower.attempt_interval_secs,
            &mut result,
        );

        if let Err(e) = self.weather.tz() {
            result.add_error("weather.timezone", e.to_string());
        }

        let cadence = self.tower.cadence;
        if cadence.period_minutes == 0 || 60 % cadence.period_minutes != 0 {
            result.add_error(
                "tower.cadence.period_minutes",
                "Cadence period must be a non-zero divisor of 60",
            );
        } else if cadence.phase_minute >= cadence.period_minutes {
            result.add_error(
                "tower.cadence.phase_minute",
                "Phase minute must be smaller than the cadence period",
            );
        }

        if self.fetch.timeout_secs == 0 {
            result.add_error("fetch.timeout_secs", "Fetch timeout must be greater than 0");
        } else if self.fetch.timeout_secs > 60 {
            result.add_warning(
                "fetch.timeout_secs",
                "Fetch timeout above 60s will hold client requests for a long time",
            );
        }

        if self.display.min_poll_secs == 0 {
            result.add_error(
                "display.min_poll_secs",
                "Minimum poll interval must be greater than 0",
            );
        }

        if self.server.port == 0 {
            result.add_error("server.port", "Port cannot be 0");
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("towercam");

        Ok(config_dir.join("config.toml"))
    }
}

fn validate_intervals(section: &str, update: u64, attempt: u64, result: &mut ValidationResult) {
    if update == 0 {
        result.add_error(
            format!("{section}.update_interval_secs"),
            "Update interval must be greater than 0",
        );
    }
    if attempt == 0 {
        result.add_error(
            format!("{section}.attempt_interval_secs"),
            "Attempt interval must be greater than 0",
        );
    } else if attempt > update && update > 0 {
        result.add_warning(
            format!("{section}.attempt_interval_secs"),
            "Attempt interval is longer than the update interval",
        );
    }
}
