//! Service settings.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! environment variables prefixed with `APP_` using `__` between nested keys
//! (`APP_DOWNSTREAM__BASE_URL`, `APP_RETRY__MAX_ATTEMPTS`). Durations are in
//! milliseconds. Settings are read and validated once at startup.

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use outbound_circuitbreaker::CircuitBreaker;
use outbound_http::TransportConfig;
use outbound_retry::RetryLayer;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Where settings are looked for when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Settings could not be loaded or are invalid.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid retry settings: {0}")]
    Retry(#[from] outbound_retry::ConfigError),

    #[error("invalid circuit breaker settings: {0}")]
    CircuitBreaker(#[from] outbound_circuitbreaker::ConfigError),

    #[error("cannot build transport: {0}")]
    Transport(#[from] outbound_http::TransportBuildError),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// All service settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub downstream: DownstreamSettings,
    pub transport: TransportSettings,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    /// Deadline given to every product request.
    pub request_timeout_ms: u64,
    /// How long in-flight requests may run after a shutdown signal.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            request_timeout_ms: 3_000,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl ServerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

/// The dependency every product request checks before touching storage.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DownstreamSettings {
    pub base_url: String,
    pub health_path: String,
}

impl Default for DownstreamSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            health_path: "/health".to_string(),
        }
    }
}

impl DownstreamSettings {
    /// The URL probed by the guarded call.
    pub fn health_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.health_path.starts_with('/') {
            format!("{}{}", base, self.health_path)
        } else {
            format!("{}/{}", base, self.health_path)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub dial_timeout_ms: u64,
    pub keep_alive_ms: u64,
    pub tls_handshake_timeout_ms: u64,
    pub response_header_timeout_ms: u64,
    pub pool_idle_timeout_ms: u64,
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        let defaults = TransportConfig::default();
        Self {
            dial_timeout_ms: millis(defaults.dial_timeout),
            keep_alive_ms: millis(defaults.keep_alive),
            tls_handshake_timeout_ms: millis(defaults.tls_handshake_timeout),
            response_header_timeout_ms: millis(defaults.response_header_timeout),
            pool_idle_timeout_ms: millis(defaults.pool_idle_timeout),
            pool_max_idle_per_host: defaults.pool_max_idle_per_host,
        }
    }
}

impl TransportSettings {
    pub fn to_transport_config(&self) -> TransportConfig {
        TransportConfig {
            dial_timeout: Duration::from_millis(self.dial_timeout_ms),
            keep_alive: Duration::from_millis(self.keep_alive_ms),
            tls_handshake_timeout: Duration::from_millis(self.tls_handshake_timeout_ms),
            response_header_timeout: Duration::from_millis(self.response_header_timeout_ms),
            pool_idle_timeout: Duration::from_millis(self.pool_idle_timeout_ms),
            pool_max_idle_per_host: self.pool_max_idle_per_host,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the uniform jitter; `0` disables jitter.
    pub max_jitter_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            max_jitter_ms: 100,
        }
    }
}

impl RetrySettings {
    /// Builds the retry layer, named after the dependency it retries.
    pub fn to_layer(&self, name: &str) -> Result<RetryLayer, outbound_retry::ConfigError> {
        let builder = RetryLayer::builder()
            .name(name)
            .max_attempts(self.max_attempts)
            .base_delay(Duration::from_millis(self.base_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms));
        let builder = if self.max_jitter_ms == 0 {
            builder.no_jitter()
        } else {
            builder.max_jitter(Duration::from_millis(self.max_jitter_ms))
        };
        builder.build()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub name: String,
    pub max_requests: u32,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub requests_volume_threshold: u32,
    pub failure_threshold: f64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            name: "downstream".to_string(),
            max_requests: 1,
            interval_ms: 60_000,
            timeout_ms: 60_000,
            requests_volume_threshold: 10,
            failure_threshold: 0.5,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn to_breaker(&self) -> Result<CircuitBreaker, outbound_circuitbreaker::ConfigError> {
        CircuitBreaker::builder()
            .name(self.name.as_str())
            .max_requests(self.max_requests)
            .interval(Duration::from_millis(self.interval_ms))
            .timeout(Duration::from_millis(self.timeout_ms))
            .requests_volume_threshold(self.requests_volume_threshold)
            .failure_threshold(self.failure_threshold)
            .build()
    }
}

impl Settings {
    /// Loads settings from `path` (or [`DEFAULT_CONFIG_PATH`] if present) and
    /// the environment, then validates them.
    ///
    /// An explicit `path` must exist; the default one is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let file = match path {
            Some(path) => File::new(&path.to_string_lossy(), FileFormat::Yaml).required(true),
            None => File::new(DEFAULT_CONFIG_PATH, FileFormat::Yaml).required(false),
        };
        let builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        Self::from_builder(builder)
    }

    /// Parses settings from a YAML document, ignoring the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self, SettingsError> {
        Self::from_builder(Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml)))
    }

    fn from_builder(
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, SettingsError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks every section, including the ones validated by the resilience
    /// builders.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.server.request_timeout_ms == 0 {
            return Err(SettingsError::Invalid {
                key: "server.request_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        let url = self.downstream.health_url();
        match url.parse::<http::Uri>() {
            Ok(uri) if matches!(uri.scheme_str(), Some("http") | Some("https")) => {}
            Ok(_) => {
                return Err(SettingsError::Invalid {
                    key: "downstream.base_url",
                    reason: format!("`{}` is not an http(s) URL", self.downstream.base_url),
                })
            }
            Err(err) => {
                return Err(SettingsError::Invalid {
                    key: "downstream.base_url",
                    reason: err.to_string(),
                })
            }
        }

        self.retry.to_layer(&self.circuit_breaker.name)?;
        self.circuit_breaker.to_breaker()?;
        Ok(())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
