use std::path::Path;

use crate::config::schema::{CommandConfig, Config, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER};
use crate::error::ConfigError;

const MAX_INPUT_DIMENSION_LIMIT: u32 = 16384;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if config.max_upload_bytes == 0 {
        return Err(ConfigError::Validation {
            message: "max_upload_bytes must be greater than 0".to_string(),
        });
    }

    if config.max_input_dimension == 0 || config.max_input_dimension > MAX_INPUT_DIMENSION_LIMIT {
        return Err(ConfigError::Validation {
            message: format!(
                "max_input_dimension {} is outside 1..={}",
                config.max_input_dimension, MAX_INPUT_DIMENSION_LIMIT
            ),
        });
    }

    if config.icon_sizes.is_empty() {
        return Err(ConfigError::Validation {
            message: "icon_sizes must not be empty".to_string(),
        });
    }
    if let Some(size) = config.icon_sizes.iter().find(|s| **s == 0 || **s > 256) {
        return Err(ConfigError::Validation {
            message: format!("icon size {} is outside 1..=256", size),
        });
    }

    validate_command("background_removal", &config.background_removal)?;
    validate_command("vectorizer", &config.vectorizer)?;

    Ok(())
}

fn validate_command(name: &str, command: &CommandConfig) -> Result<(), ConfigError> {
    if command.program.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: format!("{}: program must not be empty", name),
        });
    }

    for placeholder in [INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER] {
        if !command.args.iter().any(|a| a.contains(placeholder)) {
            return Err(ConfigError::Validation {
                message: format!("{}: args must reference {}", name, placeholder),
            });
        }
    }

    Ok(())
}
