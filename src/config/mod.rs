//! Configuration handling
//!
//! Parses and manages component.toml configuration files.

mod schema;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::plugins::{PluginRegistry, StylePreprocessorFactory, UrlRebaseFactory};
use crate::resolver::{MappingRule, ModuleMapping};

pub use schema::*;

/// Default configuration file name
pub const CONFIG_FILE: &str = "component.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Copy every mapped module unless its rule says otherwise
    #[serde(default)]
    pub copy_modules: bool,

    /// Import specifier rewriting rules, tried in document order
    #[serde(default)]
    pub modules_mapping: IndexMap<String, MappingRule>,

    /// Component extension -> compiler plugin id
    #[serde(default)]
    pub compilers: IndexMap<String, String>,

    /// External command compilers
    #[serde(default)]
    pub plugins: Vec<CommandPluginConfig>,

    /// Style preprocessing; absent disables it
    #[serde(default)]
    pub style: Option<StyleConfig>,

    /// Directory mapping rules are relative to (the config file's directory)
    #[serde(skip)]
    pub root: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", canonical_path.display()))?;

        // Mapping rules are written relative to the config file
        config.root = canonical_path.parent().map(|p| p.to_path_buf());

        config.validate()?;

        debug!("Loaded configuration from {}", canonical_path.display());

        Ok(config)
    }

    /// Load `component.toml` from `dir` when present, defaults otherwise
    pub fn discover(dir: &Path) -> Result<Self> {
        let candidate = dir.join(CONFIG_FILE);

        if candidate.is_file() {
            Self::load(candidate)
        } else {
            debug!("No {} in {}, using defaults", CONFIG_FILE, dir.display());
            Ok(Self::default())
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.modules_mapping.is_empty() && self.root.is_none() {
            anyhow::bail!("a working directory must be provided alongside modules_mapping");
        }

        self.module_mapping()?;
        PluginRegistry::from_config(self)?;

        Ok(())
    }

    /// Compiled module mapping table
    pub fn module_mapping(&self) -> Result<ModuleMapping> {
        Ok(ModuleMapping::from_config(&self.modules_mapping)?)
    }

    /// Directory mapping rules are resolved against
    pub fn working_dir(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Style preprocessor factory, if style preprocessing is enabled
    pub fn style_preprocessor(&self) -> Option<Arc<dyn StylePreprocessorFactory>> {
        match &self.style {
            Some(style) if style.rebase_urls => Some(Arc::new(UrlRebaseFactory)),
            _ => None,
        }
    }
}
