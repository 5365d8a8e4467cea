//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Proxy behaviour (mode, route prefix, limits).
    pub proxy: ProxySettings,

    /// Persisted target setting (prefixed mode).
    pub storage: StorageConfig,

    /// Initial target record (direct mode).
    pub target: TargetConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Which deployment shape the proxy runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Target is a persisted base URL; only paths under `route_prefix` are proxied.
    #[default]
    Prefixed,
    /// Target is an in-memory host record; every non-configuration path is proxied.
    Direct,
}

impl ProxyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMode::Prefixed => "prefixed",
            ProxyMode::Direct => "direct",
        }
    }
}

/// Proxy behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    pub mode: ProxyMode,

    /// Path segment stripped from inbound paths in prefixed mode.
    pub route_prefix: String,

    /// Home page path. Unmatched paths redirect here in prefixed mode.
    pub home_path: String,

    /// Largest inbound request body forwarded upstream.
    pub max_request_body_bytes: usize,

    /// Use `https`/`wss` when synthesizing direct-mode upstream URLs.
    pub upstream_tls: bool,

    /// Route upstream HTTP through `HTTP_PROXY`/`HTTPS_PROXY` when set.
    pub use_env_proxy: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            mode: ProxyMode::Prefixed,
            route_prefix: "/proxy".to_string(),
            home_path: "/".to_string(),
            max_request_body_bytes: 32 * 1024 * 1024,
            upstream_tls: true,
            use_env_proxy: true,
        }
    }
}

/// Storage for the prefixed-mode target URL.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// File holding the target URL. `None` keeps it in process memory.
    pub target_file: Option<String>,
}

/// Direct-mode target record as written in the config file.
///
/// Empty strings mean "not set".
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TargetConfig {
    pub target_host: String,
    pub host_header: String,
    pub origin_header: String,
    pub user_agent: String,
    pub access_control_allow_origin: String,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
