use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

const CONFIG_PATH: &str = "config.toml";

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub location: LocationConfig,
    pub report: ReportConfig,
    pub session: SessionConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub google_access_token: Option<String>, // Exchanged for a session when none is stored
    pub request_timeout_seconds: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ip,
    Manual,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LocationConfig {
    pub share_location: bool, // false behaves like a refused permission prompt
    pub provider: ProviderKind,
    pub lookup_ip: String, // Empty means "whoever is asking"
    pub manual_lat: f64,
    pub manual_lon: f64,
    pub sample_interval_seconds: u64,
    pub permission_timeout_seconds: u64,
    pub sample_timeout_seconds: u64,
    pub report_threshold_meters: f64,
    pub acquisition_retries: u32,
    pub acquisition_retry_delay_seconds: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ReportConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub breaker_threshold: u32,
    pub breaker_cooldown_seconds: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub path: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            google_access_token: None,
            request_timeout_seconds: 10,
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            share_location: true,
            provider: ProviderKind::Ip,
            lookup_ip: String::new(),
            manual_lat: 40.7128,
            manual_lon: -74.0060,
            sample_interval_seconds: 60,
            permission_timeout_seconds: 15,
            sample_timeout_seconds: 10,
            report_threshold_meters: 100.0,
            acquisition_retries: 1,
            acquisition_retry_delay_seconds: 2,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 8_000,
            breaker_threshold: 5,
            breaker_cooldown_seconds: 300,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("session.json"),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Config {
    /// Loads config.toml from the root directory.
    /// If it doesn't exist, creates a default one.
    pub fn load() -> Self {
        if let Ok(content) = fs::read_to_string(CONFIG_PATH) {
            return Self::parse_or_default(&content);
        }

        let default_config = Config::default();

        // Save default config to disk for the user to edit later
        match toml::to_string_pretty(&default_config) {
            Ok(toml_string) => {
                if fs::write(CONFIG_PATH, toml_string).is_err() {
                    warn!("Could not write default config.toml to disk.");
                }
            }
            Err(e) => warn!("Could not serialize default config: {}", e),
        }

        info!("Loaded default configuration.");
        default_config
    }

    fn parse_or_default(content: &str) -> Self {
        match toml::from_str(content) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to parse config.toml: {}. Using defaults.", e);
                Config::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = Config::parse_or_default(
            r#"
            [backend]
            base_url = "https://api.example.test"

            [location]
            provider = "manual"
            manual_lat = 51.5
            "#,
        );

        assert_eq!(config.backend.base_url, "https://api.example.test");
        assert_eq!(config.backend.request_timeout_seconds, 10);
        assert_eq!(config.location.provider, ProviderKind::Manual);
        assert_eq!(config.location.manual_lat, 51.5);
        assert_eq!(config.location.sample_interval_seconds, 60);
        assert_eq!(config.location.report_threshold_meters, 100.0);
        assert_eq!(config.report.max_attempts, 3);
        assert_eq!(config.session.path, PathBuf::from("session.json"));
    }

    #[test]
    fn garbage_yields_defaults() {
        let config = Config::parse_or_default("this is = = not toml");
        assert_eq!(config.location.permission_timeout_seconds, 15);
        assert_eq!(config.location.sample_timeout_seconds, 10);
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed = Config::parse_or_default(&text);
        assert_eq!(parsed.report.breaker_cooldown_seconds, 300);
        assert!(parsed.location.share_location);
    }
}
