//! Compiler plugins
//!
//! A component's entry file is compiled by the plugin registered for its
//! extension. Plugins receive the source along with the preprocessing
//! capabilities the bundler prepared for that component and return
//! JavaScript (plus an optional sourcemap).

mod command;
mod ecmascript;
mod style;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::utils::{file_name, is_custom_element_name};

pub use command::CommandPlugin;
pub use ecmascript::EcmascriptPlugin;
pub use style::{UrlRebaseFactory, UrlRebaser};

/// Plugin id handling `index.esm` components
pub const ECMASCRIPT_PLUGIN: &str = "ecmascript";

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("code must be provided")]
    MissingCode,

    #[error("Plain JS component must have the component class name as a default export (`export default class ComponentClassName ...` or `export default ComponentClassName`)")]
    MissingDefaultExport,

    #[error("filename must be a non-empty string")]
    MissingFilename,

    #[error("filename must match custom element name pattern (my_awesome_component). Actual \"{0}\"")]
    InvalidElementName(String),

    #[error("source file {} is missing", .0.display())]
    MissingSource(PathBuf),

    #[error("enableSourcemap has a wrong format ({expected}). Actual {actual}")]
    InvalidSourcemap {
        expected: &'static str,
        actual: String,
    },

    #[error("source: {} - {message}\n\tline: {line}, column: {column}", .file.display())]
    Compiler {
        file: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("no compiler plugin registered for .{0} files")]
    UnknownExtension(String),

    #[error("unknown compiler plugin '{id}' for .{extension} files")]
    UnknownPlugin { id: String, extension: String },
}

/// Sourcemap generation: everything or per output kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourcemapOption {
    Enabled(bool),
    Split {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        js: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        css: Option<bool>,
    },
}

impl Default for SourcemapOption {
    fn default() -> Self {
        SourcemapOption::Enabled(false)
    }
}

impl From<bool> for SourcemapOption {
    fn from(enabled: bool) -> Self {
        SourcemapOption::Enabled(enabled)
    }
}

impl SourcemapOption {
    pub fn js(&self) -> bool {
        match self {
            SourcemapOption::Enabled(enabled) => *enabled,
            SourcemapOption::Split { js, .. } => js.unwrap_or(false),
        }
    }

    pub fn css(&self) -> bool {
        match self {
            SourcemapOption::Enabled(enabled) => *enabled,
            SourcemapOption::Split { css, .. } => css.unwrap_or(false),
        }
    }

    /// Whether any output gets a sourcemap
    pub fn any(&self) -> bool {
        self.js() || self.css()
    }

    /// Object form must set `js`
    pub fn validate_js_only(&self) -> Result<(), PluginError> {
        match self {
            SourcemapOption::Split { js: None, .. } => Err(self.invalid("boolean | { js: boolean }")),
            _ => Ok(()),
        }
    }

    /// Object form must set `js` or `css`
    pub fn validate(&self) -> Result<(), PluginError> {
        match self {
            SourcemapOption::Split { js: None, css: None } => {
                Err(self.invalid("boolean | { [css/js]: boolean }"))
            }
            _ => Ok(()),
        }
    }

    fn invalid(&self, expected: &'static str) -> PluginError {
        PluginError::InvalidSourcemap {
            expected,
            actual: self.to_string(),
        }
    }
}

impl fmt::Display for SourcemapOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Rewrites the inline script of a component before compilation
#[async_trait]
pub trait PreprocessScript: Send + Sync {
    async fn execute(&self, content: &str) -> Result<String>;
}

/// Rewrites a stylesheet belonging to a component
#[async_trait]
pub trait PreprocessStyle: Send + Sync {
    async fn execute(&self, content: &str, filename: &Path) -> Result<String>;
}

/// Builds the style preprocessor of one component from its public path
pub trait StylePreprocessorFactory: Send + Sync {
    /// `dest` is `<prefix>/<component>` or just `<component>`
    fn for_component(&self, dest: &str) -> Arc<dyn PreprocessStyle>;
}

/// Input handed to a compiler plugin
pub struct CompileRequest<'a> {
    pub code: String,
    pub filename: PathBuf,
    pub sourcemap: SourcemapOption,
    pub script_preprocessor: &'a dyn PreprocessScript,
    pub style_preprocessor: Option<&'a dyn PreprocessStyle>,
}

impl CompileRequest<'_> {
    /// Checks every plugin shares: code, filename and its presence on disk
    fn validate(&self) -> Result<(), PluginError> {
        if self.code.trim().is_empty() {
            return Err(PluginError::MissingCode);
        }

        if self.filename.as_os_str().is_empty() {
            return Err(PluginError::MissingFilename);
        }

        Ok(())
    }

    /// Name of the folder holding the entry file, checked against the custom element convention
    fn element_folder(&self) -> Result<String, PluginError> {
        let folder = self.filename.parent().and_then(file_name).unwrap_or_default();

        if is_custom_element_name(&folder) {
            Ok(folder)
        } else {
            Err(PluginError::InvalidElementName(folder))
        }
    }

    fn ensure_source_exists(&self) -> Result<(), PluginError> {
        if self.filename.is_file() {
            Ok(())
        } else {
            Err(PluginError::MissingSource(self.filename.clone()))
        }
    }
}

/// Compiled component code
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutput {
    pub code: String,
    pub map: Option<String>,
}

/// Compiler plugin trait - implement this to support a component source type
#[async_trait]
pub trait CompilerPlugin: Send + Sync {
    /// Plugin id, as referenced from the `[compilers]` table
    fn name(&self) -> &str;

    async fn compile(&self, request: CompileRequest<'_>) -> Result<CompileOutput>;
}

/// Plugins by id, and the extension table choosing among them
#[derive(Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn CompilerPlugin>>,
    extensions: IndexMap<String, String>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        let mut registry = Self {
            plugins: HashMap::new(),
            extensions: IndexMap::new(),
        };

        registry.register(Arc::new(EcmascriptPlugin));
        registry
            .extensions
            .insert("esm".to_string(), ECMASCRIPT_PLUGIN.to_string());

        registry
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the configured command plugins and extension table
    pub fn from_config(config: &Config) -> Result<Self, PluginError> {
        let mut registry = Self::default();

        for plugin in &config.plugins {
            registry.register(Arc::new(CommandPlugin::from_config(plugin)));
        }

        for (extension, id) in &config.compilers {
            registry.map_extension(extension, id)?;
        }

        Ok(registry)
    }

    /// Register a plugin under its name, replacing any previous one
    pub fn register(&mut self, plugin: Arc<dyn CompilerPlugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    /// Route an extension to a registered plugin
    pub fn map_extension(&mut self, extension: &str, id: &str) -> Result<(), PluginError> {
        if !self.plugins.contains_key(id) {
            return Err(PluginError::UnknownPlugin {
                id: id.to_string(),
                extension: extension.to_string(),
            });
        }

        self.extensions.insert(extension.to_string(), id.to_string());
        Ok(())
    }

    pub fn for_extension(&self, extension: &str) -> Result<Arc<dyn CompilerPlugin>, PluginError> {
        self.extensions
            .get(extension)
            .and_then(|id| self.plugins.get(id))
            .cloned()
            .ok_or_else(|| PluginError::UnknownExtension(extension.to_string()))
    }

    /// Registered component extensions, in registration order
    pub fn source_types(&self) -> Vec<String> {
        self.extensions.keys().cloned().collect()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .field("extensions", &self.extensions)
            .finish()
    }
}
