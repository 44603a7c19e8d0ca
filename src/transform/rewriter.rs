//! Import rewriting passes over generated component code

use std::collections::HashSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::bundler::CopyCache;
use crate::resolver::{
    extract_dependencies, is_relative, resolve_with_fallback, ModuleMapping, ReferenceKind,
    Resolver, ScanOptions,
};
use crate::transform::{quoted, DependencyCopier, OffsetSplice};
use crate::utils::relative_specifier;

/// Prefix marking a specifier as a compiled component until emission
pub const COMPONENT_MARK: &str = "component:";

static COMPONENT_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?P<import>\bimport\s*(?:\(\s*)?)(?P<quote>['"])component:"#).unwrap()
});

/// Applies configured module mapping rules to a module
pub struct MappingPass<'a> {
    pub mapping: &'a ModuleMapping,
    pub resolver: &'a Resolver,
    pub copy_cache: &'a CopyCache,
    /// Directory the mapping rules are written relative to
    pub working_dir: &'a Path,
    pub copy_modules: bool,
    /// Extensions of registered component source types
    pub source_types: &'a [String],
}

/// Module code after a mapping pass
#[derive(Debug, Default)]
pub struct Mapped {
    pub code: String,
    /// Specifiers written by the pass
    pub destinations: HashSet<String>,
}

impl<'a> MappingPass<'a> {
    /// Rewrite every import matching a rule, copying mapped modules when requested
    ///
    /// Targets listed in `skip` are left alone, so specifiers produced by an
    /// earlier pass are not mapped twice.
    pub async fn rewrite(
        &self,
        code: &str,
        component_dest: &Path,
        resolution_paths: &[PathBuf],
        skip: &HashSet<String>,
    ) -> Result<Mapped> {
        let mut mapped = Mapped {
            code: code.to_string(),
            destinations: HashSet::new(),
        };

        if self.mapping.is_empty() {
            return Ok(mapped);
        }

        let options = ScanOptions::new(self.source_types);
        let references = extract_dependencies(code, &options)?;

        let mut splice = OffsetSplice::new();

        for reference in references.into_iter().filter(|r| !skip.contains(&r.target)) {
            let Some(resolved) = self.mapping.resolve(
                &reference.target,
                component_dest,
                self.working_dir,
                self.copy_modules,
            ) else {
                continue;
            };

            let mark = if reference.kind == ReferenceKind::Component
                && !self
                    .source_types
                    .iter()
                    .any(|ext| resolved.destination.ends_with(&format!(".{}", ext)))
            {
                COMPONENT_MARK
            } else {
                ""
            };

            let replacement = format!("{}{}", mark, resolved.destination);

            match replace_literal(code, &reference.literal, &reference.target, &replacement) {
                Some(rewritten) => {
                    mapped.code = splice.splice(
                        &mapped.code,
                        &rewritten,
                        reference.literal.start,
                        reference.literal.end,
                    )?;
                    mapped.destinations.insert(resolved.destination.clone());
                }
                None => debug!("No literal '{}' in statement, left as is", reference.target),
            }

            if let Some(copy_to) = &resolved.copy_to {
                let mut paths = resolution_paths.to_vec();
                paths.push(self.working_dir.to_path_buf());

                let alias_src = resolve_with_fallback(self.resolver, &resolved.alias, &paths)?;
                let base = copy_to.parent().map(Path::to_path_buf).unwrap_or_default();

                debug!("Copying mapped module {} to {}", alias_src.display(), copy_to.display());

                DependencyCopier::new(self.copy_cache, self.resolver)
                    .copy(&alias_src, copy_to, &base)
                    .await
                    .with_context(|| format!("Failed to copy mapped module {}", resolved.alias))?;
            }
        }

        Ok(mapped)
    }
}

/// Re-point relative imports at their resolved location in the output tree
pub fn resolve_relative_imports(
    code: &str,
    component_dest: &Path,
    resolution_paths: &[PathBuf],
    resolver: &Resolver,
) -> Result<String> {
    let references = extract_dependencies(code, &ScanOptions::default())?;

    let mut paths = vec![component_dest.to_path_buf()];
    paths.extend_from_slice(resolution_paths);

    let from = std::fs::canonicalize(component_dest).unwrap_or_else(|_| component_dest.to_path_buf());

    let mut splice = OffsetSplice::new();
    let mut transformed = code.to_string();

    for reference in references.iter().filter(|r| is_relative(&r.target)) {
        let dependency = resolver.resolve(&reference.target, &paths)?;
        let Some(specifier) = relative_specifier(&from, &dependency) else {
            continue;
        };

        debug!("Relative import '{}' now '{}'", reference.target, specifier);

        let rewritten = replace_literal(code, &reference.literal, &reference.target, &specifier);

        if let Some(rewritten) = rewritten {
            transformed = splice.splice(
                &transformed,
                &rewritten,
                reference.literal.start,
                reference.literal.end,
            )?;
        }
    }

    Ok(transformed)
}

/// Turn tagged component imports back into plain imports
pub fn strip_component_marks(code: &str) -> String {
    COMPONENT_IMPORT.replace_all(code, "${import}${quote}").into_owned()
}

/// Requoted `replacement` for the source literal at `literal`
///
/// `None` unless the literal spells `target` verbatim between its quotes.
fn replace_literal(
    code: &str,
    literal: &Range<usize>,
    target: &str,
    replacement: &str,
) -> Option<String> {
    let raw = code.get(literal.clone())?;
    let unquoted = raw.get(1..raw.len().checked_sub(1)?)?;

    (unquoted == target).then(|| quoted(code, literal.start, replacement))
}
