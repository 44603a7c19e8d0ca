//! Script preprocessing of a component's inline script
//!
//! Runs while the compiler plugin handles the component:
//! 1. relative plain JavaScript is copied next to the output and re-pointed,
//! 2. configured module mapping is applied,
//! 3. referenced components are compiled (once per build) and imported by
//!    their output path,
//! 4. asset imports become string constants holding the asset's public URL.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{BuildContext, Bundler, CompileOptions};
use crate::plugins::PreprocessScript;
use crate::resolver::{component_parts, extract_dependencies, ReferenceKind, ScanOptions};
use crate::transform::{contained_destination, quoted, DependencyCopier, OffsetSplice, COMPONENT_MARK};
use crate::utils::relative_specifier;

pub struct ScriptPreprocessor<'a> {
    pub(super) bundler: &'a Bundler,
    pub(super) context: &'a BuildContext,
    pub(super) options: &'a CompileOptions,
    pub(super) resolution_paths: &'a [PathBuf],
    pub(super) component_name: &'a str,
    pub(super) component_dest: &'a Path,
    /// Specifiers written by module mapping, not to be mapped again
    pub(super) mapped: Mutex<HashSet<String>>,
}

#[async_trait]
impl PreprocessScript for ScriptPreprocessor<'_> {
    async fn execute(&self, content: &str) -> Result<String> {
        let code = self.copy_plain_code(content).await?;

        let code = match self.bundler.mapping_pass(self.context) {
            Some(pass) => {
                let skip = self.mapped.lock().clone();
                let mapped = pass
                    .rewrite(&code, self.component_dest, self.resolution_paths, &skip)
                    .await?;

                self.mapped.lock().extend(mapped.destinations);
                mapped.code
            }
            None => code,
        };

        let code = self.compile_components(&code).await?;

        self.inline_assets(&code)
    }
}

impl ScriptPreprocessor<'_> {
    fn scan_options(&self) -> ScanOptions {
        ScanOptions::new(self.bundler.source_types())
    }

    async fn copy_plain_code(&self, code: &str) -> Result<String> {
        let references = extract_dependencies(code, &self.scan_options())?;
        let destination = &self.options.destination;

        let copier = DependencyCopier::new(&self.context.copy_cache, self.bundler.resolver());
        let mut splice = OffsetSplice::new();
        let mut transformed = code.to_string();

        for reference in references.iter().filter(|r| r.kind == ReferenceKind::PlainCode) {
            let dependency = self
                .bundler
                .resolver()
                .resolve(&reference.target, &[self.options.source.clone()])?;

            let dependency_dest =
                contained_destination(destination, &self.component_dest.join(&reference.target));

            copier.copy(&dependency, &dependency_dest, destination).await?;

            let specifier = relative_specifier(self.component_dest, &dependency_dest)
                .unwrap_or_else(|| reference.target.clone());

            transformed = splice.splice(
                &transformed,
                &quoted(code, reference.literal.start, &specifier),
                reference.literal.start,
                reference.literal.end,
            )?;
        }

        Ok(transformed)
    }

    async fn compile_components(&self, code: &str) -> Result<String> {
        let references = extract_dependencies(code, &self.scan_options())?;

        let mut splice = OffsetSplice::new();
        let mut transformed = code.to_string();

        for reference in references.iter().filter(|r| r.kind == ReferenceKind::Component) {
            let source_type = reference.source_type.as_deref().unwrap_or_default();
            let (folder, stem) = component_parts(&reference.target, source_type)
                .with_context(|| format!("Invalid component reference {}", reference.target))?;

            let dependency = self
                .bundler
                .resolver()
                .resolve(&reference.target, &[self.options.source.clone()])?;

            let destination = match self.context.build_cache.get(&dependency) {
                Some(destination) => {
                    debug!("Component {} already built", dependency.display());
                    destination
                }
                None => self.compile_dependency(&dependency, &folder, &stem).await?,
            };

            let specifier = relative_specifier(self.component_dest, &destination)
                .unwrap_or_else(|| destination.to_string_lossy().into_owned());

            let statement = if reference.dynamic {
                format!("import('{}{}')", COMPONENT_MARK, specifier)
            } else {
                format!("import '{}{}'", COMPONENT_MARK, specifier)
            };

            transformed = splice.splice(
                &transformed,
                &statement,
                reference.statement.start,
                reference.statement.end,
            )?;
        }

        Ok(transformed)
    }

    /// Build a referenced component, returning the destination recorded for it
    ///
    /// The destination is registered before the nested build starts, so a
    /// component reached again through a cycle is imported from a path whose
    /// file is only written once the outer build completes.
    async fn compile_dependency(&self, dependency: &Path, folder: &str, stem: &str) -> Result<PathBuf> {
        let dependency_folder = dependency
            .parent()
            .map(Path::to_path_buf)
            .with_context(|| format!("No folder for component {}", dependency.display()))?;

        let destination = self
            .options
            .destination
            .join(folder)
            .join(format!("{}.js", stem));

        self.context
            .build_cache
            .register(dependency.to_path_buf(), destination.clone());

        info!("Compiling dependency {}", dependency_folder.display());

        let nested = CompileOptions {
            source: dependency_folder.clone(),
            ..self.options.clone()
        };

        let resolution_paths = vec![
            dependency_folder,
            self.component_dest.to_path_buf(),
            self.options.source.clone(),
        ];

        if let Err(error) =
            Box::pin(self.bundler.compile_component(self.context, &nested, resolution_paths)).await
        {
            self.context.build_cache.evict(dependency);
            return Err(error);
        }

        Ok(destination)
    }

    fn inline_assets(&self, code: &str) -> Result<String> {
        let references = extract_dependencies(code, &ScanOptions::default())?;
        let public_path = self.options.public_path(self.component_name);

        let mut splice = OffsetSplice::new();
        let mut transformed = code.to_string();

        for reference in references.iter().filter(|r| r.kind == ReferenceKind::Asset) {
            let url = format!(
                "{}/{}",
                public_path,
                reference.target.trim_start_matches("./")
            );

            let replacement = if reference.dynamic {
                format!("Promise.resolve({{ default: '{}' }})", url)
            } else {
                match reference.default_binding.as_ref().or(reference.bindings.first()) {
                    Some(binding) => format!("const {} = '{}'", binding, url),
                    None => String::new(),
                }
            };

            debug!("Asset {} inlined as '{}'", reference.target, url);

            transformed = splice.splice(
                &transformed,
                &replacement,
                reference.statement.start,
                reference.statement.end,
            )?;
        }

        Ok(transformed)
    }
}
