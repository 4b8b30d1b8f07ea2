//! Relay configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via ROVLINK_CONFIG or --config)
//! 3. Environment variables

use rovlink_protocol::{DEFAULT_TARGET_WIDTH, DEFAULT_TELEMETRY_PORT, DEFAULT_VIDEO_PORT};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Relay configuration, shared by the vehicle and console roles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Video configuration.
    pub video: VideoConfig,
    /// Camera capture configuration (vehicle role only).
    pub capture: CaptureConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        // Start with defaults
        let mut config = Self::default();

        // Load from file if specified
        if let Ok(path) = std::env::var("ROVLINK_CONFIG") {
            config = Self::from_file(&path)?;
        }

        // Apply environment variable overrides
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.video.apply_env_overrides();
        self.capture.apply_env_overrides();
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.network.validate()?;
        self.video.validate()?;
        self.capture.validate()
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Network configuration.
///
/// The vehicle binds both addresses; the console dials them. Which stream
/// runs over which port is convention only, the frame header decides how a
/// body is interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Telemetry stream address.
    #[serde(with = "socket_addr_serde")]
    pub telemetry_addr: SocketAddr,
    /// Video stream address.
    #[serde(with = "socket_addr_serde")]
    pub video_addr: SocketAddr,
    /// Maximum concurrent connections accepted by the vehicle.
    pub max_connections: usize,
    /// Pacing for reconnect attempts and idle checks, in milliseconds.
    pub poll_interval_ms: u64,
    /// Dial timeout for the console role, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            telemetry_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_TELEMETRY_PORT)),
            video_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_VIDEO_PORT)),
            max_connections: 64,
            poll_interval_ms: 1000,
            connect_timeout_secs: 5,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("ROVLINK_TELEMETRY_ADDR") {
            if let Ok(parsed) = addr.parse() {
                self.telemetry_addr = parsed;
            }
        }

        if let Ok(addr) = std::env::var("ROVLINK_VIDEO_ADDR") {
            if let Ok(parsed) = addr.parse() {
                self.video_addr = parsed;
            }
        }

        if let Ok(max) = std::env::var("ROVLINK_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }

        if let Ok(interval) = std::env::var("ROVLINK_POLL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.poll_interval_ms = ms;
            }
        }

        if let Ok(timeout) = std::env::var("ROVLINK_CONNECT_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.connect_timeout_secs = secs;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.telemetry_addr == self.video_addr {
            return Err(ConfigError::ValidationError(
                "telemetry_addr and video_addr must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the dial timeout as Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Video configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Width in pixels that captured frames are scaled down to before
    /// they go on the wire. Aspect ratio is preserved.
    pub target_width: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_WIDTH,
        }
    }
}

impl VideoConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(width) = std::env::var("ROVLINK_TARGET_WIDTH") {
            if let Ok(w) = width.parse() {
                self.target_width = w;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.target_width == 0 {
            return Err(ConfigError::ValidationError(
                "target_width must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Camera capture configuration for the vehicle role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Number of synthetic camera devices to expose.
    pub device_count: u32,
    /// Native width of captured frames, before scaling.
    pub frame_width: u32,
    /// Native height of captured frames, before scaling.
    pub frame_height: u32,
    /// Interval between capture sweeps, in milliseconds.
    pub capture_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_count: 1,
            frame_width: 640,
            frame_height: 480,
            capture_interval_ms: 100,
        }
    }
}

impl CaptureConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(count) = std::env::var("ROVLINK_CAPTURE_DEVICES") {
            if let Ok(n) = count.parse() {
                self.device_count = n;
            }
        }

        if let Ok(width) = std::env::var("ROVLINK_CAPTURE_WIDTH") {
            if let Ok(w) = width.parse() {
                self.frame_width = w;
            }
        }

        if let Ok(height) = std::env::var("ROVLINK_CAPTURE_HEIGHT") {
            if let Ok(h) = height.parse() {
                self.frame_height = h;
            }
        }

        if let Ok(interval) = std::env::var("ROVLINK_CAPTURE_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.capture_interval_ms = ms;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::ValidationError(
                "frame_width and frame_height must be at least 1".to_string(),
            ));
        }
        if self.capture_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "capture_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the capture interval as Duration.
    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.telemetry_addr.port(), 7430);
        assert_eq!(config.network.video_addr.port(), 7431);
        assert_eq!(config.video.target_width, 350);
        assert_eq!(config.capture.device_count, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_helpers() {
        let config = NetworkConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(
            CaptureConfig::default().capture_interval(),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.network.telemetry_addr, config.network.telemetry_addr);
        assert_eq!(parsed.network.video_addr, config.network.video_addr);
        assert_eq!(parsed.video.target_width, config.video.target_width);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "network:\n  telemetry_addr: \"10.0.0.5:7430\"\n  video_addr: \"10.0.0.5:7431\"\nvideo:\n  target_width: 200\n"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.network.telemetry_addr.to_string(), "10.0.0.5:7430");
        assert_eq!(config.network.video_addr.to_string(), "10.0.0.5:7431");
        assert_eq!(config.video.target_width, 200);
        // Unlisted sections keep their defaults.
        assert_eq!(config.network.max_connections, 64);
        assert_eq!(config.capture.frame_width, 640);
    }

    #[test]
    fn test_load_consults_only_the_env_named_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "video:\n  target_width: 275\n").unwrap();

        std::env::set_var("ROVLINK_CONFIG", file.path());
        let config = Config::load().unwrap();
        assert_eq!(config.video.target_width, 275);

        // Unset means defaults; no working-directory or /etc lookup.
        std::env::remove_var("ROVLINK_CONFIG");
        let config = Config::load().unwrap();
        assert_eq!(config.video.target_width, 350);
    }

    #[test]
    fn test_from_file_rejects_bad_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "network: [not, a, map]").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_, _)));
    }

    #[test]
    fn test_validation_rejects_zero_target_width() {
        let mut config = Config::default();
        config.video.target_width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_identical_addrs() {
        let mut config = Config::default();
        config.network.video_addr = config.network.telemetry_addr;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
