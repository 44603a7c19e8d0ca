//! Dependency copier
//!
//! Copies a plain JavaScript file together with every relative file it
//! imports or re-exports, rewriting specifiers so the copies keep pointing at
//! each other. Specifiers that would climb above the copy root are kept
//! inside it by turning each `..` segment into a `--` folder.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::debug;

use crate::bundler::CopyCache;
use crate::resolver::{extract_dependencies, is_relative, ReferenceKind, Resolver, ScanOptions};
use crate::transform::OffsetSplice;
use crate::utils::{normalize_path, relative_specifier};

/// Folder name standing in for `..` below a copy root
pub const PARENT_SENTINEL: &str = "--";

pub struct DependencyCopier<'a> {
    cache: &'a CopyCache,
    resolver: &'a Resolver,
    options: ScanOptions,
}

impl<'a> DependencyCopier<'a> {
    pub fn new(cache: &'a CopyCache, resolver: &'a Resolver) -> Self {
        Self {
            cache,
            resolver,
            options: ScanOptions::default().with_exports(),
        }
    }

    /// Copy `src` to `dest` along with its relative dependencies, kept below `base`
    ///
    /// A `(src, dest)` pair is handled once per cache, which is what stops
    /// mutually importing files from recursing forever.
    pub async fn copy(&self, src: &Path, dest: &Path, base: &Path) -> Result<()> {
        if !self.cache.claim(src, dest) {
            debug!("Already copied {} to {}", src.display(), dest.display());
            return Ok(());
        }

        debug!("Copying {} to {}", src.display(), dest.display());

        let code = fs::read_to_string(src)
            .await
            .with_context(|| format!("Failed to read {}", src.display()))?;

        let references = extract_dependencies(&code, &self.options)
            .with_context(|| format!("Failed to parse {}", src.display()))?;

        let src_dir = parent(src);
        let dest_dir = parent(dest);

        let mut splice = OffsetSplice::new();
        let mut transformed = code.clone();

        for reference in references
            .iter()
            .filter(|r| r.kind == ReferenceKind::PlainCode && is_relative(&r.target))
        {
            let dependency_src = self.resolver.resolve(&reference.target, &[src_dir.clone()])?;
            let dependency_dest = contained_destination(base, &dest_dir.join(&reference.target));
            let specifier = relative_specifier(&dest_dir, &dependency_dest)
                .unwrap_or_else(|| reference.target.clone());

            if let Some(folder) = dependency_dest.parent() {
                fs::create_dir_all(folder)
                    .await
                    .with_context(|| format!("Failed to create directory {}", folder.display()))?;
            }

            transformed = splice.splice(
                &transformed,
                &quoted(&code, reference.literal.start, &specifier),
                reference.literal.start,
                reference.literal.end,
            )?;

            Box::pin(self.copy(&dependency_src, &dependency_dest, base)).await?;
        }

        fs::create_dir_all(&dest_dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dest_dir.display()))?;

        fs::write(dest, transformed)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;

        Ok(())
    }
}

/// Where `target` lands once confined below `base`, with a `.js` extension
pub fn contained_destination(base: &Path, target: &Path) -> PathBuf {
    let target = normalize_path(target);
    let relative = pathdiff::diff_paths(&target, normalize_path(base)).unwrap_or(target);

    let mut contained = base.to_path_buf();
    for component in relative.components() {
        match component {
            Component::ParentDir => contained.push(PARENT_SENTINEL),
            Component::CurDir => {}
            other => contained.push(other.as_os_str()),
        }
    }

    with_js_extension(contained)
}

fn with_js_extension(path: PathBuf) -> PathBuf {
    match path.extension() {
        Some(ext) if ext == "js" => path,
        _ => {
            let mut name = path.as_os_str().to_os_string();
            name.push(".js");
            PathBuf::from(name)
        }
    }
}

/// Re-quote `value` with the quote character found at `at` in `code`
pub(crate) fn quoted(code: &str, at: usize, value: &str) -> String {
    let quote = match code.as_bytes().get(at) {
        Some(b'"') => '"',
        _ => '\'',
    };

    format!("{quote}{value}{quote}")
}

fn parent(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}
