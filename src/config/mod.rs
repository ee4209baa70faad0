//! Compiler configuration
//!
//! Loads and validates the YAML configuration that sets batch-wide planning
//! and rendering defaults. Input files (type schema, mapper units) live in
//! [`schema`].

pub mod schema;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::ConfigError;
use crate::rules::ConverterRef;
use crate::types::registry::{
    DEFAULT_COLLECTION_CONVERTER, DEFAULT_CONVERTER, DEFAULT_CONVERTER_PREFIX,
};

pub use schema::{MapperFile, SchemaFile};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "MAPGEN_CONFIG";

/// Configuration for the mapping compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Auto-match same-named members unless a declaration turns it off.
    pub auto_match: bool,
    /// Let auto-matching pair members whose names differ only in case.
    pub case_insensitive_match: bool,
    /// Converter type used when no override is declared.
    pub converter: ConverterConfig,
    /// Collection converter type used when no override is declared.
    pub collection_converter: String,
    /// Plan declarations in parallel.
    pub parallel: bool,
    /// Emit the `<auto-generated/>` header on rendered units.
    pub emit_header: bool,
    /// Spaces per indentation level.
    pub indent_width: usize,
    /// Null-check unannotated reference sources of nested and collection
    /// redirects.
    pub null_check_references: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            auto_match: true,
            case_insensitive_match: false,
            converter: ConverterConfig::default(),
            collection_converter: DEFAULT_COLLECTION_CONVERTER.to_string(),
            parallel: true,
            emit_header: true,
            indent_width: 4,
            null_check_references: true,
        }
    }
}

/// Converter type and method-name prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub type_name: String,
    pub prefix: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            type_name: DEFAULT_CONVERTER.to_string(),
            prefix: DEFAULT_CONVERTER_PREFIX.to_string(),
        }
    }
}

impl From<&ConverterConfig> for ConverterRef {
    fn from(config: &ConverterConfig) -> Self {
        ConverterRef {
            type_name: config.type_name.clone(),
            prefix: config.prefix.clone(),
        }
    }
}

impl CompilerConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: CompilerConfig =
            serde_yaml::from_str(content).context("Failed to parse compiler config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        info!(path = %path.display(), "Loaded compiler config");
        Ok(config)
    }

    /// Load from `MAPGEN_CONFIG` if set, else defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=16).contains(&self.indent_width) {
            return Err(ConfigError::Invalid(format!(
                "indent_width must be between 1 and 16, got {}",
                self.indent_width
            )));
        }
        if self.converter.type_name.trim().is_empty() || self.converter.prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "converter type_name and prefix must not be empty".into(),
            ));
        }
        if self.collection_converter.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "collection_converter must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn converter_ref(&self) -> ConverterRef {
        ConverterRef::from(&self.converter)
    }
}
