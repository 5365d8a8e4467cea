//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ProxyMode;
    use std::io::Write;

    #[test]
    fn loads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[proxy]\nmode = \"direct\"\nupstream_tls = false\n\n[target]\ntarget_host = \"127.0.0.1:9000\""
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.proxy.mode, ProxyMode::Direct);
        assert!(!config.proxy.upstream_tls);
        assert_eq!(config.target.target_host, "127.0.0.1:9000");
    }

    #[test]
    fn example_config_is_valid() {
        let config = parse_config(include_str!("../../retarget.example.toml")).unwrap();
        assert_eq!(config.proxy.mode, ProxyMode::Prefixed);
        assert!(config.storage.target_file.is_none());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn syntax_and_semantic_errors_are_distinguished() {
        assert!(matches!(
            parse_config("[proxy\nmode = 1").unwrap_err(),
            ConfigError::Parse(_)
        ));

        let err = parse_config("[proxy]\nroute_prefix = \"nope\"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref v) if v.len() == 1));
        assert!(err.to_string().contains("route_prefix"));
    }
}
