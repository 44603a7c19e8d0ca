//! Native plugin for plain JavaScript components (`index.esm`)
//!
//! The entry default-exports its element class; compilation preprocesses the
//! script and registers the class under the tag derived from the folder name.

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use super::{CompileOutput, CompileRequest, CompilerPlugin, PluginError, ECMASCRIPT_PLUGIN};
use crate::utils::{custom_element_tag, file_name};

static DEFAULT_EXPORT_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|\s+)export\s+default\s+(class\s+)?(?P<class_name>\w+)(\s+|$)").unwrap()
});

#[derive(Debug, Default, Clone)]
pub struct EcmascriptPlugin;

#[async_trait]
impl CompilerPlugin for EcmascriptPlugin {
    fn name(&self) -> &str {
        ECMASCRIPT_PLUGIN
    }

    async fn compile(&self, request: CompileRequest<'_>) -> Result<CompileOutput> {
        if request.code.trim().is_empty() {
            return Err(PluginError::MissingCode.into());
        }

        let class_name = DEFAULT_EXPORT_CLASS
            .captures(&request.code)
            .and_then(|captures| captures.name("class_name"))
            .map(|name| name.as_str().to_string())
            .ok_or(PluginError::MissingDefaultExport)?;

        request.validate()?;
        let folder = request.element_folder()?;
        request.ensure_source_exists()?;
        request.sourcemap.validate_js_only()?;

        let compiled = request.script_preprocessor.execute(&request.code).await?;

        let tag = custom_element_tag(&folder);
        let code = format!("{}\n\ncustomElements.define('{}', {})", compiled, tag, class_name);

        debug!("Defined <{}> as {}", tag, class_name);

        let map = request
            .sourcemap
            .js()
            .then(|| line_sourcemap(&request, &code));

        Ok(CompileOutput { code, map })
    }
}

/// One mapping per line, each generated line pointing at the next source line
fn line_sourcemap(request: &CompileRequest<'_>, generated: &str) -> String {
    let lines = request.code.split('\n').count().min(generated.split('\n').count());
    let file = file_name(&request.filename)
        .map(|name| name.trim_end_matches(".esm").to_string() + ".js")
        .unwrap_or_default();

    json!({
        "version": 3,
        "file": file,
        "sources": [request.filename.to_string_lossy()],
        "sourcesContent": [request.code],
        "names": [],
        "mappings": format!("AAAA,{}", vec!["AACA"; lines].join(";")),
    })
    .to_string()
}
