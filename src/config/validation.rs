//! Configuration validation.
//!
//! Serde handles syntax; this checks values that would only fail once
//! traffic arrives. All errors are collected, not just the first.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("proxy.route_prefix `{0}` must start with '/' and name a segment")]
    RoutePrefix(String),

    #[error("proxy.home_path `{0}` must start with '/'")]
    HomePath(String),

    #[error("proxy.route_prefix `{0}` overlaps the home page or /config")]
    PrefixCollision(String),

    #[error("proxy.max_request_body_bytes must be greater than zero")]
    BodyLimit,

    #[error("target.target_host `{0}` does not form a valid URL")]
    TargetHost(String),

    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let prefix = &config.proxy.route_prefix;
    if !prefix.starts_with('/') || prefix == "/" || prefix.ends_with('/') {
        errors.push(ValidationError::RoutePrefix(prefix.clone()));
    } else if prefix == &config.proxy.home_path || prefix == "/config" {
        errors.push(ValidationError::PrefixCollision(prefix.clone()));
    }

    if !config.proxy.home_path.starts_with('/') {
        errors.push(ValidationError::HomePath(config.proxy.home_path.clone()));
    }

    if config.proxy.max_request_body_bytes == 0 {
        errors.push(ValidationError::BodyLimit);
    }

    let host = config.target.target_host.trim();
    if !host.is_empty() && url::Url::parse(&format!("https://{host}")).is_err() {
        errors.push(ValidationError::TargetHost(host.to_string()));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
