//! Configuration schema definitions

use serde::{Deserialize, Serialize};

/// External compiler for a single-file component format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPluginConfig {
    /// Plugin id, referenced from `[compilers]`
    pub name: String,

    /// Executable reading the component on stdin
    pub command: String,

    /// Arguments passed to the command
    #[serde(default)]
    pub args: Vec<String>,

    /// Require a custom-element folder name and export its tag to the command
    #[serde(default = "default_true")]
    pub custom_element: bool,
}

/// Built-in style preprocessor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleConfig {
    /// Rebase `url(./assets/..)` and `url(./styles/..)` to the component's public path
    #[serde(default = "default_true")]
    pub rebase_urls: bool,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self { rebase_urls: true }
    }
}

fn default_true() -> bool {
    true
}
