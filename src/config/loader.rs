//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_ENV: &str = "DICE_CONFIG";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load the file named by `DICE_CONFIG`, or fall back to defaults.
pub fn load_from_env() -> Result<ServiceConfig, ConfigError> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => load_config(Path::new(&path)),
        None => {
            let config = ServiceConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("dice-config-{}.toml", std::process::id()));
        fs::write(&path, "[timeouts]\nwrite_secs = 20\n").unwrap();

        let config = load_config(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.timeouts.write_secs, 20);
        assert_eq!(config.timeouts.read_secs, 1);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_config(Path::new("/nonexistent/dice.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = parse_config("[listener]\nmax_connections = 0\n").unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert_eq!(errors, vec![ValidationError::MaxConnections]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        let err = parse_config("[listener\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
