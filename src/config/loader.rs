//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::StackConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

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
pub fn load_config(path: &Path) -> Result<StackConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<StackConfig, ConfigError> {
    let config: StackConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to the built-in layout.
pub fn load_or_default(path: &Path) -> Result<StackConfig, ConfigError> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "No config file, using built-in defaults");
        let config = StackConfig::default();
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = parse_config(
            r#"
            [[queues]]
            name = "keys"
            broker = "missing"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("unknown broker 'missing'"));
    }

    #[test]
    fn test_dangerous_data_root_rejected() {
        for root in ["/", "/var/local", "relative/redis"] {
            let err = parse_config(&format!("[paths]\nbroker_data_root = \"{root}\"")).unwrap_err();
            assert!(matches!(err, ConfigError::Validation(_)), "{root} accepted");
        }
        assert!(parse_config("[paths]\nbroker_data_root = \"/srv/redis\"").is_ok());
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("tiers = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = load_or_default(Path::new("/nonexistent/mailstack.toml")).unwrap();
        assert_eq!(config.brokers.len(), 4);
    }
}
