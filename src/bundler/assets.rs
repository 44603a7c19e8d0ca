//! Copy of a component's `assets/` and `styles/` folders

use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

use crate::plugins::PreprocessStyle;

/// Recursively copy `from` into `to`; `.css` files go through `style` when given
///
/// A missing `from` is not an error.
pub async fn copy_folder(
    from: &Path,
    to: &Path,
    style: Option<&dyn PreprocessStyle>,
) -> Result<usize> {
    if !from.is_dir() {
        return Ok(0);
    }

    let mut copied = 0;

    for entry in WalkDir::new(from).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", from.display()))?;
        let relative = entry.path().strip_prefix(from)?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .await
                .with_context(|| format!("Failed to create directory {}", target.display()))?;
            continue;
        }

        let is_css = entry.path().extension().map_or(false, |ext| ext == "css");

        match style {
            Some(style) if is_css => {
                let content = fs::read_to_string(entry.path())
                    .await
                    .with_context(|| format!("Failed to read {}", entry.path().display()))?;
                let processed = style.execute(&content, entry.path()).await?;

                fs::write(&target, processed)
                    .await
                    .with_context(|| format!("Failed to write {}", target.display()))?;
            }
            _ => {
                fs::copy(entry.path(), &target).await.with_context(|| {
                    format!("Failed to copy {} to {}", entry.path().display(), target.display())
                })?;
            }
        }

        copied += 1;
    }

    debug!("Copied {} files from {}", copied, from.display());

    Ok(copied)
}
