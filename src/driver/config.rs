use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Builder settings, the `[builder]` table of a script or a standalone TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// The prefix of the names given to emitted vars.
    pub var_prefix: String,
    /// The prefix of the names given to emitted dataflow vars.
    pub dataflow_var_prefix: String,
    /// The attribute holding the name of a function.
    pub global_symbol_attr: String,
    /// Whether named functions get the `global_symbol_attr` attribute.
    pub attach_global_symbol: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            var_prefix: "lv".to_string(),
            dataflow_var_prefix: "dv".to_string(),
            global_symbol_attr: "global_symbol".to_string(),
            attach_global_symbol: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A standalone config file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    builder: BuilderConfig,
}

impl BuilderConfig {
    /// Parses a TOML document holding a `[builder]` table.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(source)?;
        Ok(file.builder)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config = BuilderConfig::from_toml("[builder]\nvar_prefix = \"v\"\n").unwrap();
        assert_eq!(config.var_prefix, "v");
        assert_eq!(config.dataflow_var_prefix, "dv");
        assert!(config.attach_global_symbol);
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(BuilderConfig::from_toml("").unwrap(), BuilderConfig::default());
    }

    #[test]
    fn invalid_document_fails() {
        let error = BuilderConfig::from_toml("[builder]\nattach_global_symbol = 3\n").unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
    }
}
