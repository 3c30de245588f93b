//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML. Every section
//! is defaulted, so an empty file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the service shell.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener and driver settings.
    pub server: ServerConfig,

    /// Readiness probes.
    pub health: HealthConfig,

    /// Logging, metrics and trace sampling.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address, `host:port` or `:port` for all interfaces.
    pub bind_address: String,

    /// Serve over TLS when set.
    pub tls: Option<TlsConfig>,

    /// Per-request timeout applied by the default driver.
    pub request_timeout_secs: u64,

    /// How long shutdown waits for in-flight requests.
    pub shutdown_grace_secs: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: ":8080".to_string(),
            tls: None,
            request_timeout_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Readiness probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// First wait after a failed ping.
    pub initial_backoff_ms: u64,

    /// Ceiling for the doubling wait.
    pub max_backoff_ms: u64,

    /// Report not-ready for this long after startup. 0 disables.
    pub warmup_secs: u64,

    /// Dependencies probed in the background; readiness waits for all.
    pub dependencies: Vec<DependencyConfig>,
}

impl HealthConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 250,
            max_backoff_ms: 30_000,
            warmup_secs: 0,
            dependencies: Vec::new(),
        }
    }
}

/// A dependency probed for readiness.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DependencyConfig {
    /// Name used in logs, metrics and health errors.
    pub name: String,

    /// How to ping it.
    pub kind: DependencyKind,

    /// `host:port` for TCP, a full URL for HTTP.
    pub address: String,

    /// Per-ping timeout in milliseconds.
    #[serde(default = "default_ping_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_ping_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Tcp,
    Http,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Write an NCSA access log line per request to stdout.
    pub access_log: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Trace sampling policy.
    pub sampling: SamplingPolicy,

    /// Used when `sampling = "probability"`.
    pub sample_probability: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            access_log: true,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            sampling: SamplingPolicy::Always,
            sample_probability: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingPolicy {
    Always,
    Never,
    Probability,
}
