//! Module mapping
//!
//! Configured rules rewriting import specifiers. A rule key is either a
//! literal specifier or a `/^...$/` pattern whose capture groups feed the
//! alias and destination templates.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{ResolveError, Resolver};
use crate::utils::{normalize_path, relative_specifier};

/// `$1` style references, rewritten as `${1}` so adjacent text is not read as part of the name
/// `$` in a template, with the group number when it references one
static TEMPLATE_DOLLAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\d+)?").unwrap());

/// Trailing `/segment` removed at each fallback step
static TRAILING_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\w+$").unwrap());

static MODULE_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.(json|m?js)$").unwrap());

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("invalid modules mapping pattern {key}")]
    InvalidPattern {
        key: String,
        #[source]
        source: regex::Error,
    },
}

/// Left-hand side of a mapping rule
#[derive(Debug, Clone)]
pub enum MappingKey {
    Literal(String),
    Pattern(Regex),
}

impl MappingKey {
    /// Parse a configuration key; `/^...$/` keys become patterns
    pub fn parse(key: &str) -> Result<Self, MappingError> {
        if key.len() > 3 && key.starts_with("/^") && key.ends_with("$/") {
            let pattern = key[1..key.len() - 1].replace("\\/", "/");

            Regex::new(&pattern)
                .map(MappingKey::Pattern)
                .map_err(|source| MappingError::InvalidPattern {
                    key: key.to_string(),
                    source,
                })
        } else {
            Ok(MappingKey::Literal(key.to_string()))
        }
    }

    pub fn matches(&self, target: &str) -> bool {
        match self {
            MappingKey::Literal(literal) => literal == target,
            MappingKey::Pattern(pattern) => pattern.is_match(target),
        }
    }

    /// Expand a template against the target; literal keys return the template as is
    fn substitute(&self, target: &str, template: &str) -> String {
        match self {
            MappingKey::Literal(_) => template.to_string(),
            MappingKey::Pattern(pattern) => {
                // Only `$N` expands; any other `$` stays literal
                let template = TEMPLATE_DOLLAR.replace_all(template, |captures: &Captures| {
                    match captures.get(1) {
                        Some(group) => format!("${{{}}}", group.as_str()),
                        None => "$$".to_string(),
                    }
                });
                pattern.replace(target, template.as_ref()).into_owned()
            }
        }
    }
}

/// Right-hand side of a mapping rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingRule {
    /// Alias and destination at once
    Replace(String),
    Detailed {
        #[serde(default)]
        alias: Option<String>,
        #[serde(default)]
        destination: Option<String>,
        #[serde(default)]
        copy_module: Option<bool>,
    },
}

/// Outcome of applying a rule to one import target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMapping {
    /// Specifier used to locate the module to copy
    pub alias: String,
    /// Specifier written into the import statement
    pub destination: String,
    /// Absolute path the module is copied to, when copying was requested
    pub copy_to: Option<PathBuf>,
}

/// Ordered mapping table; the first matching rule wins
#[derive(Debug, Clone, Default)]
pub struct ModuleMapping {
    rules: Vec<(MappingKey, MappingRule)>,
}

impl ModuleMapping {
    pub fn new(rules: Vec<(MappingKey, MappingRule)>) -> Self {
        Self { rules }
    }

    /// Build from configuration entries, compiling pattern keys
    pub fn from_config(entries: &IndexMap<String, MappingRule>) -> Result<Self, MappingError> {
        let rules = entries
            .iter()
            .map(|(key, rule)| Ok((MappingKey::parse(key)?, rule.clone())))
            .collect::<Result<Vec<_>, MappingError>>()?;

        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply the first matching rule to `target`
    ///
    /// Relative results (`./`, `../`) are taken relative to `working_dir` and
    /// re-expressed relative to `dest_folder`; anything else stays a bare
    /// specifier.
    pub fn resolve(
        &self,
        target: &str,
        dest_folder: &Path,
        working_dir: &Path,
        copy_all: bool,
    ) -> Option<ResolvedMapping> {
        let (key, rule) = self.rules.iter().find(|(key, _)| key.matches(target))?;

        let relativize = |mapping: &str| relativize_mapping(dest_folder, mapping, working_dir);

        let (config_alias, config_destination, destination, copy_module) = match rule {
            MappingRule::Replace(template) => {
                let mapping = key.substitute(target, template);
                (mapping.clone(), mapping.clone(), relativize(&mapping), copy_all)
            }

            MappingRule::Detailed {
                alias,
                destination,
                copy_module,
            } => {
                let (config_alias, relative_alias) = match (key, alias) {
                    (_, Some(alias)) => {
                        let config_alias = key.substitute(target, alias);
                        let relative = relativize(&config_alias);
                        (config_alias, relative)
                    }
                    (MappingKey::Pattern(_), None) => (target.to_string(), target.to_string()),
                    (MappingKey::Literal(literal), None) => (literal.clone(), relativize(literal)),
                };

                let (config_destination, destination) = match destination {
                    Some(destination) => {
                        let config_destination = key.substitute(target, destination);
                        let relative = relativize(&config_destination);
                        (config_destination, relative)
                    }
                    None => (config_alias.clone(), relative_alias),
                };

                (
                    config_alias,
                    config_destination,
                    destination,
                    copy_module.unwrap_or(copy_all),
                )
            }
        };

        debug!(
            "Mapped '{}' to '{}' (alias '{}', copy: {})",
            target, destination, config_alias, copy_module
        );

        Some(ResolvedMapping {
            alias: config_alias,
            destination,
            copy_to: copy_module.then(|| normalize_path(&working_dir.join(&config_destination))),
        })
    }
}

fn relativize_mapping(dest_folder: &Path, mapping: &str, working_dir: &Path) -> String {
    if mapping.starts_with("./") || mapping.starts_with("../") {
        relative_specifier(dest_folder, &working_dir.join(mapping))
            .unwrap_or_else(|| mapping.to_string())
    } else {
        mapping.to_string()
    }
}

/// Resolve `alias`, falling back to its closest resolvable parent path
///
/// Subpaths a package does not expose directly (for instance files outside
/// its `exports`) are located by resolving successively shorter prefixes and
/// re-attaching the remainder to the directory of the first prefix that
/// resolves.
pub fn resolve_with_fallback(
    resolver: &Resolver,
    alias: &str,
    paths: &[PathBuf],
) -> Result<PathBuf, ResolveError> {
    let error = match resolver.resolve(alias, paths) {
        Ok(path) => return Ok(path),
        Err(error) => error,
    };

    warn!("{}, trying parent paths", error);

    let stripped = MODULE_EXTENSION.replace(alias, "").into_owned();

    if stripped != alias {
        if let Ok(resolved) = resolver.resolve(&stripped, paths) {
            return Ok(resolved);
        }
    }

    let mut prefix = stripped;

    while TRAILING_SEGMENT.is_match(&prefix) {
        prefix = TRAILING_SEGMENT.replace(&prefix, "").into_owned();

        match resolver.resolve(&prefix, paths) {
            Ok(resolved) => {
                let base = resolved.parent().unwrap_or(&resolved).to_path_buf();
                let remainder = alias[prefix.len()..].trim_start_matches('/');
                debug!("Resolved '{}' through prefix '{}'", alias, prefix);

                return Ok(base.join(remainder));
            }
            Err(subsequent) => debug!("{}", subsequent),
        }
    }

    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn mapping(entries: &[(&str, MappingRule)]) -> ModuleMapping {
        ModuleMapping::new(
            entries
                .iter()
                .map(|(key, rule)| (MappingKey::parse(key).unwrap(), rule.clone()))
                .collect(),
        )
    }

    fn replace(value: &str) -> MappingRule {
        MappingRule::Replace(value.to_string())
    }

    fn detailed(alias: Option<&str>, destination: Option<&str>, copy: Option<bool>) -> MappingRule {
        MappingRule::Detailed {
            alias: alias.map(str::to_string),
            destination: destination.map(str::to_string),
            copy_module: copy,
        }
    }

    const DEST: &str = "/project/output/the_main_component";
    const CWD: &str = "/project/fixtures";

    fn resolve(mapping: &ModuleMapping, target: &str, copy_all: bool) -> Option<ResolvedMapping> {
        mapping.resolve(target, Path::new(DEST), Path::new(CWD), copy_all)
    }

    #[test]
    fn test_pattern_alias_substitution() {
        let mapping = mapping(&[("/^@scope\\/(.+)$/", detailed(Some("@scope/lib/$1"), None, None))]);
        let resolved = resolve(&mapping, "@scope/widget/index.svelte", false).unwrap();

        assert_eq!(resolved.alias, "@scope/lib/widget/index.svelte");
        assert_eq!(resolved.destination, "@scope/lib/widget/index.svelte");
        assert_eq!(resolved.copy_to, None);
    }

    #[test]
    fn test_string_rules() {
        let mapping = mapping(&[
            ("svelte", replace("svelte/src/runtime/internal/index.js")),
            ("^/lib/core", replace("./lib/core.js")),
            ("/^@heimdall/shared/(.+)$/", replace("@heimdall/shared/lib/$1")),
        ]);

        assert_eq!(
            resolve(&mapping, "svelte", false).unwrap().destination,
            "svelte/src/runtime/internal/index.js"
        );
        assert_eq!(
            resolve(&mapping, "^/lib/core", false).unwrap().destination,
            "../../fixtures/lib/core.js"
        );
        assert_eq!(
            resolve(&mapping, "@heimdall/shared/menu/index.svelte", false)
                .unwrap()
                .destination,
            "@heimdall/shared/lib/menu/index.svelte"
        );
        assert_eq!(resolve(&mapping, "svelte/internal", false), None);
    }

    #[test]
    fn test_detailed_rules_and_copy_flag() {
        let mapping = mapping(&[
            (
                "joi",
                detailed(
                    Some("joi/dist/joi-browser.min.js"),
                    Some("../output/packages/joi-browser.min.js"),
                    None,
                ),
            ),
            (
                "svelte/internal",
                detailed(None, Some("../output/packages/svelte/internal/index.js"), Some(false)),
            ),
            (
                "/^@bifrost/utils/(.+)$/",
                detailed(
                    Some("@bifrost/utils/$1"),
                    Some("../output/packages/@bifrost/utils/common/$1"),
                    None,
                ),
            ),
            ("/^lib/(.+)$/", detailed(Some("../output/lib/$1"), None, Some(false))),
        ]);

        let joi = resolve(&mapping, "joi", true).unwrap();
        assert_eq!(joi.alias, "joi/dist/joi-browser.min.js");
        assert_eq!(joi.destination, "../packages/joi-browser.min.js");
        assert_eq!(
            joi.copy_to,
            Some(PathBuf::from("/project/output/packages/joi-browser.min.js"))
        );

        let internal = resolve(&mapping, "svelte/internal", true).unwrap();
        assert_eq!(internal.alias, "svelte/internal");
        assert_eq!(internal.destination, "../packages/svelte/internal/index.js");
        assert_eq!(internal.copy_to, None);

        let logger = resolve(&mapping, "@bifrost/utils/logger.js", true).unwrap();
        assert_eq!(logger.alias, "@bifrost/utils/logger.js");
        assert_eq!(logger.destination, "../packages/@bifrost/utils/common/logger.js");

        let util = resolve(&mapping, "lib/utils.js", true).unwrap();
        assert_eq!(util.destination, "../lib/utils.js");
        assert_eq!(util.copy_to, None);
    }

    #[test]
    fn test_template_group_followed_by_word_characters() {
        let mapping = mapping(&[("/^icons/(.+)$/", replace("./icons/$1_v2.js"))]);

        assert_eq!(
            resolve(&mapping, "icons/bullet", false).unwrap().destination,
            "../../fixtures/icons/bullet_v2.js"
        );
    }

    #[test]
    fn test_template_keeps_other_dollar_signs() {
        let mapping = mapping(&[(
            "/^@scope\\/(.+)$/",
            replace("@scope/$name/$$/$1.js"),
        )]);
        let resolved = resolve(&mapping, "@scope/widget", false).unwrap();

        assert_eq!(resolved.destination, "@scope/$name/$$/widget.js");
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            MappingKey::parse("/^(unclosed$/"),
            Err(MappingError::InvalidPattern { .. })
        ));
        assert!(matches!(MappingKey::parse("/not/a/pattern/"), Ok(MappingKey::Literal(_))));
    }

    #[test]
    fn test_fallback_resolves_through_parent_package() {
        let dir = TempDir::new().unwrap();
        let package = dir.path().join("node_modules/animate");
        fs::create_dir_all(package.join("helpers/easing")).unwrap();
        fs::write(
            package.join("package.json"),
            r#"{ "exports": { ".": "./index.js" } }"#,
        )
        .unwrap();
        fs::write(package.join("index.js"), "").unwrap();
        fs::write(package.join("helpers/easing/cubic.mjs"), "").unwrap();

        let resolver = Resolver::new();
        let paths = vec![dir.path().to_path_buf()];

        let resolved =
            resolve_with_fallback(&resolver, "animate/helpers/easing/cubic.mjs", &paths).unwrap();

        assert_eq!(
            resolved,
            fs::canonicalize(&package).unwrap().join("helpers/easing/cubic.mjs")
        );
    }

    #[test]
    fn test_fallback_reports_original_error() {
        let dir = TempDir::new().unwrap();
        let resolver = Resolver::new();

        let error = resolve_with_fallback(
            &resolver,
            "animate/helpers/easing/cubic.mjs",
            &[dir.path().to_path_buf()],
        )
        .unwrap_err();

        assert_eq!(error.to_string(), "cannot resolve module animate/helpers/easing/cubic.mjs");
    }
}
