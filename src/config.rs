use std::env;
use std::path::PathBuf;

use crate::error::{EtlError, Result};

fn require_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| EtlError::Config(format!("missing required env var: {name}")))
}

/// Location and shape of the two source files.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub metadata_path: PathBuf,
    pub data_path: PathBuf,
    pub separator: u8,
}

impl SourceConfig {
    pub fn from_env() -> Result<Self> {
        let separator = env::var("CSV_SEPARATOR").unwrap_or_else(|_| ";".to_string());
        let separator = separator.as_bytes().first().copied().ok_or_else(|| {
            EtlError::Config("CSV_SEPARATOR must be a single character".to_string())
        })?;

        Ok(Self {
            metadata_path: PathBuf::from(require_env("METADATA_FILE")?),
            data_path: PathBuf::from(require_env("DATA_FILE")?),
            separator,
        })
    }
}

/// Location of the relational store.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            path: PathBuf::from(require_env("DATABASE_PATH")?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_var_is_a_config_error() {
        env::remove_var("DATABASE_PATH");
        let err = DatabaseConfig::from_env().unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }
}
