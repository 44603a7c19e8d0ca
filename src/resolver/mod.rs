//! Module resolution
//!
//! Resolves import specifiers to files, Node style: relative specifiers
//! against each search path, bare specifiers through `node_modules`.

pub mod mapping;
pub mod scanner;

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub use mapping::{
    resolve_with_fallback, MappingError, MappingKey, MappingRule, ModuleMapping, ResolvedMapping,
};
pub use scanner::{
    component_parts, extract_dependencies, ModuleReference, ReferenceKind, ScanError, ScanOptions,
};

/// Extensions probed when a specifier does not name an existing file
const EXTENSIONS: [&str; 3] = ["js", "json", "mjs"];

/// Conditions honoured in `package.json` `exports`, by priority
const CONDITIONS: [&str; 4] = ["browser", "import", "default", "require"];

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cannot resolve module {specifier}")]
    NotFound {
        specifier: String,
        paths: Vec<PathBuf>,
    },

    #[error("invalid package manifest {}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Module resolver
#[derive(Debug, Clone, Default)]
pub struct Resolver;

impl Resolver {
    /// Create a new resolver
    pub fn new() -> Self {
        Self
    }

    /// Resolve a specifier against each search path in order, returning the canonical file
    pub fn resolve(&self, specifier: &str, paths: &[PathBuf]) -> Result<PathBuf, ResolveError> {
        debug!("Resolving '{}' from {:?}", specifier, paths);

        let resolved = if Path::new(specifier).is_absolute() {
            self.resolve_file_or_dir(Path::new(specifier))?
        } else if is_relative(specifier) {
            let mut found = None;
            for base in paths {
                if let Some(path) = self.resolve_file_or_dir(&base.join(specifier))? {
                    found = Some(path);
                    break;
                }
            }
            found
        } else {
            let mut found = None;
            for base in paths {
                if let Some(path) = self.resolve_bare(specifier, base)? {
                    found = Some(path);
                    break;
                }
            }
            found
        };

        let resolved = resolved.ok_or_else(|| ResolveError::NotFound {
            specifier: specifier.to_string(),
            paths: paths.to_vec(),
        })?;

        let canonical = fs::canonicalize(&resolved).map_err(|source| ResolveError::Io {
            path: resolved.clone(),
            source,
        })?;

        debug!("Resolved '{}' to {}", specifier, canonical.display());

        Ok(canonical)
    }

    /// Resolve a path as a file, a file with a probed extension, or a directory
    fn resolve_file_or_dir(&self, target: &Path) -> Result<Option<PathBuf>, ResolveError> {
        if let Some(file) = self.resolve_file(target) {
            return Ok(Some(file));
        }

        if target.is_dir() {
            return self.resolve_package(target, None);
        }

        Ok(None)
    }

    fn resolve_file(&self, target: &Path) -> Option<PathBuf> {
        if target.is_file() {
            return Some(target.to_path_buf());
        }

        let file_name = target.file_name()?.to_string_lossy().into_owned();

        EXTENSIONS
            .iter()
            .map(|ext| target.with_file_name(format!("{}.{}", file_name, ext)))
            .find(|candidate| candidate.is_file())
    }

    fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("index.{}", ext)))
            .find(|candidate| candidate.is_file())
    }

    /// Resolve a bare import by walking up `node_modules` folders
    fn resolve_bare(&self, specifier: &str, from: &Path) -> Result<Option<PathBuf>, ResolveError> {
        let (package_name, subpath) = split_package_specifier(specifier);
        let mut current = Some(from);

        while let Some(dir) = current {
            let package_dir = dir.join("node_modules").join(&package_name);

            if package_dir.is_dir() {
                if let Some(resolved) = self.resolve_package(&package_dir, subpath.as_deref())? {
                    return Ok(Some(resolved));
                }
            }

            current = dir.parent();
        }

        Ok(None)
    }

    /// Resolve an entry (or a subpath) inside a package directory
    fn resolve_package(
        &self,
        package_dir: &Path,
        subpath: Option<&str>,
    ) -> Result<Option<PathBuf>, ResolveError> {
        let manifest = self.read_manifest(package_dir)?;
        let exports = manifest.as_ref().and_then(|pkg| pkg.get("exports"));

        if let Some(exports) = exports {
            let key = subpath.map_or_else(|| ".".to_string(), |sub| format!("./{}", sub));

            return match export_target(exports, &key) {
                Some(target) => Ok(self.resolve_file(&package_dir.join(target))),
                None => {
                    debug!("'{}' is not exported by {}", key, package_dir.display());
                    Ok(None)
                }
            };
        }

        if let Some(sub) = subpath {
            return self.resolve_file_or_dir(&package_dir.join(sub));
        }

        if let Some(pkg) = &manifest {
            for field in ["module", "main"] {
                if let Some(entry) = pkg.get(field).and_then(Value::as_str) {
                    let entry_path = package_dir.join(entry);

                    if let Some(file) = self.resolve_file(&entry_path) {
                        return Ok(Some(file));
                    }

                    if entry_path.is_dir() {
                        if let Some(index) = self.resolve_index(&entry_path) {
                            return Ok(Some(index));
                        }
                    }
                }
            }
        }

        Ok(self.resolve_index(package_dir))
    }

    fn read_manifest(&self, package_dir: &Path) -> Result<Option<Value>, ResolveError> {
        let path = package_dir.join("package.json");

        if !path.is_file() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|source| ResolveError::Io {
            path: path.clone(),
            source,
        })?;

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| ResolveError::Manifest { path, source })
    }
}

/// `./x`, `../x`, `.` or `..`
pub fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
}

/// Split `@scope/name/sub/path` or `name/sub/path` into package name and subpath
fn split_package_specifier(specifier: &str) -> (String, Option<String>) {
    let parts: Vec<&str> = specifier.splitn(3, '/').collect();

    if specifier.starts_with('@') && parts.len() >= 2 {
        (format!("{}/{}", parts[0], parts[1]), parts.get(2).map(|s| s.to_string()))
    } else {
        let mut split = specifier.splitn(2, '/');
        let name = split.next().unwrap_or_default().to_string();
        (name, split.next().map(|s| s.to_string()))
    }
}

/// Look up an `exports` entry, descending through condition objects
fn export_target<'a>(exports: &'a Value, key: &str) -> Option<&'a str> {
    match exports {
        Value::String(target) if key == "." => Some(target.as_str()),
        Value::Object(map) if map.keys().any(|k| k.starts_with('.')) => {
            map.get(key).and_then(|entry| export_target(entry, "."))
        }
        Value::Object(map) if key == "." => CONDITIONS
            .iter()
            .find_map(|condition| map.get(*condition).and_then(|entry| export_target(entry, "."))),
        _ => None,
    }
}
