//! TOML configuration for the `safezone` binary.
//!
//! ```toml
//! [backend]
//! base_url = "http://localhost:5000"
//! reconnect_attempts = 5
//! stream_idle_timeout_secs = 300
//!
//! [dispatch]
//! queue_capacity = 64
//!
//! [position]
//! latitude = 19.0760
//! longitude = 72.8777
//!
//! [[zones]]
//! name = "Home"
//! radius_km = 2.0
//! latitude = 19.0760
//! longitude = 72.8777
//! ```
//!
//! `SAFEZONE_API_URL` overrides `backend.base_url`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use safezone_engine::RuntimeConfig;
use safezone_geo::{Coordinate, CoordinateError};
use safezone_zone_models::{ValidationError, validate_radius};
use serde::Deserialize;

/// Environment variable that overrides `backend.base_url`.
pub const API_URL_ENV: &str = "SAFEZONE_API_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no backend URL: set backend.base_url or {API_URL_ENV}")]
    MissingBaseUrl,

    #[error("zone {name:?}: {source}")]
    InvalidZone {
        name: String,
        source: ValidationError,
    },

    #[error("invalid position: {0}")]
    InvalidPosition(#[from] CoordinateError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub position: Option<PositionConfig>,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Consecutive failed reconnects before the live stream is abandoned.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Seconds the live stream may stay silent before reconnecting.
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            command_capacity: default_command_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PositionConfig {
    pub latitude: f64,
    pub longitude: f64,
}

/// A zone defined locally rather than on the backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneConfig {
    pub name: String,
    pub radius_km: f64,
    pub latitude: f64,
    pub longitude: f64,
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_reconnect_attempts() -> u32 {
    5
}

const fn default_reconnect_delay_ms() -> u64 {
    1000
}

const fn default_stream_idle_timeout_secs() -> u64 {
    300
}

const fn default_queue_capacity() -> usize {
    64
}

const fn default_command_capacity() -> usize {
    256
}

impl Config {
    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or a
    /// zone or position in it is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but is invalid.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Parses config text, validating zones and the initial position.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed TOML or invalid values.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        for zone in &config.zones {
            zone.center()?;
        }
        config.initial_position()?;
        Ok(config)
    }

    /// Backend URL, preferring [`API_URL_ENV`] over the file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingBaseUrl`] if neither is set.
    pub fn base_url(&self) -> Result<String, ConfigError> {
        self.base_url_with_override(std::env::var(API_URL_ENV).ok())
    }

    fn base_url_with_override(&self, env_url: Option<String>) -> Result<String, ConfigError> {
        env_url
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.backend.base_url.clone())
            .ok_or(ConfigError::MissingBaseUrl)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.backend.reconnect_delay_ms)
    }

    #[must_use]
    pub const fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.stream_idle_timeout_secs)
    }

    #[must_use]
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            command_capacity: self.dispatch.command_capacity,
            dispatch_capacity: self.dispatch.queue_capacity,
            ..RuntimeConfig::default()
        }
    }

    /// The configured starting position, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPosition`] if it is out of range.
    pub fn initial_position(&self) -> Result<Option<Coordinate>, ConfigError> {
        self.position
            .map(|p| Coordinate::new(p.latitude, p.longitude))
            .transpose()
            .map_err(ConfigError::from)
    }
}

impl ZoneConfig {
    /// Validated center of the zone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidZone`] if the center or radius is
    /// invalid.
    pub fn center(&self) -> Result<Coordinate, ConfigError> {
        let invalid = |source| ConfigError::InvalidZone {
            name: self.name.clone(),
            source,
        };
        validate_radius(self.radius_km).map_err(invalid)?;
        Coordinate::new(self.latitude, self.longitude)
            .map_err(|e| invalid(ValidationError::InvalidCenter(e)))
    }
}

/// Parses a `lat,lng` pair, as given on the command line or on stdin.
///
/// # Errors
///
/// Returns a message if either half is missing, not a number, or out of
/// range.
pub fn parse_position(input: &str) -> Result<Coordinate, String> {
    let (lat, lng) = input
        .split_once(',')
        .ok_or_else(|| format!("expected `lat,lng`, got {input:?}"))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|e| format!("invalid latitude {lat:?}: {e}"))?;
    let lng: f64 = lng
        .trim()
        .parse()
        .map_err(|e| format!("invalid longitude {lng:?}: {e}"))?;
    Coordinate::new(lat, lng).map_err(|e| e.to_string())
}
