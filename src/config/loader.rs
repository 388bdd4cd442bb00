use super::types::Settings;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse settings file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate settings from a TOML file.
///
/// A missing file is an error; a present file may omit any section or key,
/// in which case defaults apply. Remote credential paths are deliberately
/// not checked here: a missing credentials file only matters once
/// authentication is attempted.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let contents = fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&contents)?;
    validate_settings(&settings)?;
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.backup.compression_level > 9 {
        return Err(ConfigError::ValidationError(format!(
            "compression_level must be between 0 and 9, got {}",
            settings.backup.compression_level
        )));
    }

    if settings.backup.name_prefix.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "name_prefix must not be empty".to_string(),
        ));
    }

    if settings.remote.chunk_size == 0 {
        return Err(ConfigError::ValidationError(
            "chunk_size must be greater than zero".to_string(),
        ));
    }

    if settings.mysql.dump_command.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "dump_command must not be empty".to_string(),
        ));
    }

    Ok(())
}
