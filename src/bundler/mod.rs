//! Component build orchestration
//!
//! Compiles a component folder into `<destination>/<name>/index.js`: copies
//! its assets and styles, runs the compiler plugin for its entry file,
//! rewrites the generated imports and writes the result. Components
//! referenced from the entry script are compiled recursively, once per build.

mod assets;
mod cache;
mod preprocessor;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::plugins::{
    CompileRequest, CompilerPlugin, PluginRegistry, SourcemapOption, StylePreprocessorFactory,
};
use crate::resolver::{ModuleMapping, Resolver};
use crate::transform::{
    resolve_relative_imports, strip_component_marks, MappingPass, Minify, Passthrough,
};
use crate::utils::{absolutize, file_name};

pub use assets::copy_folder;
pub use cache::{BuildCache, BuildContext, CopyCache};
pub use preprocessor::ScriptPreprocessor;

/// Name of the emitted sourcemap, next to `index.js`
pub const SOURCEMAP_FILE: &str = "index.js.map";

/// Result of a build operation
#[derive(Debug)]
pub struct BuildResult {
    /// Every written module, nested components included
    pub bundles: Vec<BundleInfo>,
}

/// Information about a compiled component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    /// Output file path
    pub output_path: PathBuf,

    /// Output size in bytes
    pub size: usize,

    /// Source map path (if generated)
    pub sourcemap_path: Option<PathBuf>,
}

/// What to compile and where
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Component folder
    pub source: PathBuf,

    /// Output root; the component lands in `<destination>/<name>`
    pub destination: PathBuf,

    /// Public URL prefix of the output root
    pub prefix: Option<String>,

    pub sourcemap: SourcemapOption,
}

impl CompileOptions {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            ..Self::default()
        }
    }

    /// `<prefix>/<component>`, or the component name without a prefix
    pub fn public_path(&self, component_name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), component_name),
            None => component_name.to_string(),
        }
    }
}

/// The component compiler
#[derive(Clone)]
pub struct Bundler {
    /// Project configuration
    config: Arc<Config>,

    /// Compiler plugins by extension
    registry: Arc<PluginRegistry>,

    /// Registered component extensions
    source_types: Arc<Vec<String>>,

    mapping: Arc<ModuleMapping>,

    /// Module resolver
    resolver: Resolver,

    style: Option<Arc<dyn StylePreprocessorFactory>>,

    minifier: Arc<dyn Minify>,
}

impl Bundler {
    /// Create a bundler from a validated configuration
    pub fn new(config: Config) -> Result<Self> {
        let registry = PluginRegistry::from_config(&config)?;
        let mapping = config.module_mapping()?;
        let style = config.style_preprocessor();

        Ok(Self {
            source_types: Arc::new(registry.source_types()),
            registry: Arc::new(registry),
            mapping: Arc::new(mapping),
            config: Arc::new(config),
            resolver: Resolver::new(),
            style,
            minifier: Arc::new(Passthrough),
        })
    }

    /// Register a compiler plugin and route `extensions` to it
    pub fn with_plugin(mut self, plugin: Arc<dyn CompilerPlugin>, extensions: &[&str]) -> Result<Self> {
        let registry = Arc::make_mut(&mut self.registry);
        let id = plugin.name().to_string();

        registry.register(plugin);
        for extension in extensions {
            registry.map_extension(extension, &id)?;
        }

        self.source_types = Arc::new(registry.source_types());
        Ok(self)
    }

    pub fn with_minifier(mut self, minifier: Arc<dyn Minify>) -> Self {
        self.minifier = minifier;
        self
    }

    pub fn with_style_preprocessor(mut self, factory: Arc<dyn StylePreprocessorFactory>) -> Self {
        self.style = Some(factory);
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn source_types(&self) -> &[String] {
        &self.source_types
    }

    /// Compile one component folder and every component it references
    pub async fn compile(&self, options: &CompileOptions) -> Result<BuildResult> {
        let options = self.prepare(options)?;
        let context = BuildContext::new();
        let start = Instant::now();

        self.compile_entry(&context, &options).await?;

        debug!("Build completed in {:?}", start.elapsed());

        Ok(BuildResult {
            bundles: context.outputs(),
        })
    }

    /// Compile every component folder directly under `options.source`
    ///
    /// Components already built as a dependency of an earlier one are skipped.
    pub async fn compile_all(&self, options: &CompileOptions) -> Result<BuildResult> {
        let options = self.prepare(options)?;
        let context = BuildContext::new();

        let mut entries = fs::read_dir(&options.source)
            .await
            .with_context(|| format!("Failed to read directory {}", options.source.display()))?;

        let mut folders = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() && find_entry(&entry.path()).await?.is_some() {
                folders.push(entry.path());
            }
        }
        folders.sort();

        info!("Compiling {} components from {}", folders.len(), options.source.display());

        for folder in folders {
            let component = CompileOptions {
                source: folder,
                ..options.clone()
            };

            self.compile_entry(&context, &component).await?;
        }

        Ok(BuildResult {
            bundles: context.outputs(),
        })
    }

    /// Check options against the configuration and make paths absolute
    fn prepare(&self, options: &CompileOptions) -> Result<CompileOptions> {
        if options.source.as_os_str().is_empty() {
            anyhow::bail!("source file must be provided");
        }

        if options.destination.as_os_str().is_empty() {
            anyhow::bail!("destination file must be provided");
        }

        if !self.mapping.is_empty() && self.config.working_dir().is_none() {
            anyhow::bail!("a working directory must be provided alongside modules_mapping");
        }

        if let Some(prefix) = &options.prefix {
            if self.style.is_none() {
                warn!("prefix ({}) is useless without a style preprocessor", prefix);
            }
        }

        Ok(CompileOptions {
            source: absolutize(&options.source)?,
            destination: absolutize(&options.destination)?,
            ..options.clone()
        })
    }

    /// Compile a top-level component unless this build already produced it
    async fn compile_entry(&self, context: &BuildContext, options: &CompileOptions) -> Result<()> {
        let name = component_name(&options.source)?;

        let registered = match find_entry(&options.source).await? {
            Some(entry) => {
                let canonical = fs::canonicalize(&entry)
                    .await
                    .with_context(|| format!("Failed to resolve {}", entry.display()))?;

                if context.build_cache.get(&canonical).is_some() {
                    debug!("{} already compiled in this build", entry.display());
                    return Ok(());
                }

                context.build_cache.register(
                    canonical.clone(),
                    options.destination.join(&name).join("index.js"),
                );
                Some(canonical)
            }
            None => None,
        };

        let resolution_paths = vec![options.destination.join(&name), options.source.clone()];

        let result = self.compile_component(context, options, resolution_paths).await;

        if let (Err(_), Some(canonical)) = (&result, &registered) {
            context.build_cache.evict(canonical);
        }

        result
    }

    /// Full build of one component folder
    pub(crate) async fn compile_component(
        &self,
        context: &BuildContext,
        options: &CompileOptions,
        resolution_paths: Vec<PathBuf>,
    ) -> Result<()> {
        let name = component_name(&options.source)?;

        let entry = find_entry(&options.source).await?.with_context(|| {
            format!("source file {} is missing", options.source.join("index.*").display())
        })?;

        let extension = entry
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();

        let plugin = self.registry.for_extension(&extension)?;
        let component_dest = options.destination.join(&name);

        info!("Compiling {} with {}", options.source.display(), plugin.name());

        fs::create_dir_all(&component_dest)
            .await
            .with_context(|| format!("Failed to create directory {}", component_dest.display()))?;

        let style = self
            .style
            .as_ref()
            .map(|factory| factory.for_component(&options.public_path(&name)));

        copy_folder(&options.source.join("assets"), &component_dest.join("assets"), None).await?;
        copy_folder(
            &options.source.join("styles"),
            &component_dest.join("styles"),
            style.as_deref(),
        )
        .await?;

        let code = fs::read_to_string(&entry)
            .await
            .with_context(|| format!("Failed to read {}", entry.display()))?;

        let preprocessor = ScriptPreprocessor {
            bundler: self,
            context,
            options,
            resolution_paths: &resolution_paths,
            component_name: &name,
            component_dest: &component_dest,
            mapped: Mutex::new(HashSet::new()),
        };

        let output = plugin
            .compile(CompileRequest {
                code,
                filename: entry.clone(),
                sourcemap: options.sourcemap,
                script_preprocessor: &preprocessor,
                style_preprocessor: style.as_deref(),
            })
            .await
            .with_context(|| format!("Failed to compile {}", entry.display()))?;

        let mut code = output.code;

        if let Some(pass) = self.mapping_pass(context) {
            let skip = preprocessor.mapped.lock().clone();
            code = pass
                .rewrite(&code, &component_dest, &resolution_paths, &skip)
                .await?
                .code;
        }

        code = resolve_relative_imports(&code, &component_dest, &resolution_paths, &self.resolver)
            .with_context(|| format!("Failed to resolve imports of {}", entry.display()))?;
        code = strip_component_marks(&code);

        let minified = self
            .minifier
            .minify(code, output.map, SOURCEMAP_FILE)
            .await
            .with_context(|| format!("Failed to minify {}", entry.display()))?;

        let output_path = component_dest.join("index.js");
        fs::write(&output_path, &minified.code)
            .await
            .with_context(|| format!("Failed to write {}", output_path.display()))?;

        let sourcemap_path = match &minified.map {
            Some(map) => {
                let path = component_dest.join(SOURCEMAP_FILE);
                fs::write(&path, map)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                Some(path)
            }
            None => None,
        };

        context.record(BundleInfo {
            output_path,
            size: minified.code.len(),
            sourcemap_path,
        });

        Ok(())
    }

    /// Mapping pass over the current build, if any rule is configured
    pub(crate) fn mapping_pass<'a>(&'a self, context: &'a BuildContext) -> Option<MappingPass<'a>> {
        if self.mapping.is_empty() {
            return None;
        }

        Some(MappingPass {
            mapping: &self.mapping,
            resolver: &self.resolver,
            copy_cache: &context.copy_cache,
            working_dir: self.config.working_dir()?,
            copy_modules: self.config.copy_modules,
            source_types: &self.source_types,
        })
    }
}

fn component_name(source: &Path) -> Result<String> {
    file_name(source).with_context(|| format!("Invalid component folder {}", source.display()))
}

/// First `index.*` file of a component folder
async fn find_entry(folder: &Path) -> Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(folder)
        .await
        .with_context(|| format!("Failed to read directory {}", folder.display()))?;

    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let is_index = entry.file_name().to_string_lossy().starts_with("index.");

        if is_index && entry.file_type().await?.is_file() {
            candidates.push(entry.path());
        }
    }

    candidates.sort();
    Ok(candidates.into_iter().next())
}
