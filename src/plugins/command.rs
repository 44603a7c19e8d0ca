//! External command plugin for single-file component formats
//!
//! `<script>` and `<style>` blocks are preprocessed in place, then the whole
//! file is piped to the configured command. The command prints either plain
//! JavaScript or a JSON object `{ "code": ..., "map": ... }` on stdout.

use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{CompileOutput, CompileRequest, CompilerPlugin, PluginError};
use crate::config::CommandPluginConfig;
use crate::transform::OffsetSplice;
use crate::utils::custom_element_tag;

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<script(?:\s[^>]*)?>(?P<content>.*?)</script>").unwrap());

static STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<style(?:\s[^>]*)?>(?P<content>.*?)</style>").unwrap());

/// `line:column` as printed by most compilers in their diagnostics
static POSITION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+):(\d+)").unwrap());

#[derive(Debug, Deserialize)]
struct StructuredOutput {
    code: String,
    #[serde(default)]
    map: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct CommandPlugin {
    name: String,
    command: String,
    args: Vec<String>,
    custom_element: bool,
}

impl CommandPlugin {
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            custom_element: true,
        }
    }

    pub fn from_config(config: &CommandPluginConfig) -> Self {
        Self {
            name: config.name.clone(),
            command: config.command.clone(),
            args: config.args.clone(),
            custom_element: config.custom_element,
        }
    }

    /// Run the preprocessors over every script and style block, in source order
    async fn preprocess(&self, request: &CompileRequest<'_>) -> Result<String> {
        enum Block {
            Script,
            Style,
        }

        let code = &request.code;
        let mut blocks: Vec<_> = SCRIPT_BLOCK
            .captures_iter(code)
            .filter_map(|captures| captures.name("content").map(|m| (Block::Script, m.range())))
            .chain(
                STYLE_BLOCK
                    .captures_iter(code)
                    .filter_map(|captures| captures.name("content").map(|m| (Block::Style, m.range()))),
            )
            .collect();
        blocks.sort_by_key(|(_, range)| range.start);

        let mut splice = OffsetSplice::new();
        let mut preprocessed = code.clone();

        for (block, range) in blocks {
            let content = &code[range.clone()];

            let replacement = match block {
                Block::Script => request.script_preprocessor.execute(content).await?,
                Block::Style => match request.style_preprocessor {
                    Some(style) => style.execute(content, &request.filename).await?,
                    None => continue,
                },
            };

            preprocessed = splice.splice(&preprocessed, &replacement, range.start, range.end)?;
        }

        Ok(preprocessed)
    }
}

#[async_trait]
impl CompilerPlugin for CommandPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn compile(&self, request: CompileRequest<'_>) -> Result<CompileOutput> {
        request.validate()?;

        let tag = if self.custom_element {
            Some(custom_element_tag(&request.element_folder()?))
        } else {
            None
        };

        request.ensure_source_exists()?;
        request.sourcemap.validate()?;

        let source = self.preprocess(&request).await?;

        debug!("Running {} {:?} on {}", self.command, self.args, request.filename.display());

        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .env("COMPONENT_FILENAME", &request.filename)
            .env("COMPONENT_SOURCEMAP", request.sourcemap.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(tag) = &tag {
            command.env("COMPONENT_TAG", tag);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to run compiler '{}'", self.command))?;

        // Fed from its own task so a compiler writing before it drained stdin cannot stall
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move { stdin.write_all(source.as_bytes()).await })
        });

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Compiler '{}' did not complete", self.command))?;

        let written = match writer {
            Some(writer) => writer
                .await
                .with_context(|| format!("Failed to feed compiler '{}'", self.command))?,
            None => Ok(()),
        };

        if !output.status.success() {
            let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let (line, column) = POSITION
                .captures(&message)
                .and_then(|captures| {
                    Some((captures[1].parse::<usize>().ok()?, captures[2].parse::<usize>().ok()?))
                })
                .unwrap_or((0, 0));

            return Err(PluginError::Compiler {
                file: request.filename.clone(),
                line,
                column,
                message,
            }
            .into());
        }

        written.with_context(|| format!("Failed to write source to compiler '{}'", self.command))?;

        let stdout = String::from_utf8(output.stdout)
            .with_context(|| format!("Compiler '{}' printed invalid UTF-8", self.command))?;

        Ok(parse_output(stdout))
    }
}

fn parse_output(stdout: String) -> CompileOutput {
    if stdout.trim_start().starts_with('{') {
        if let Ok(structured) = serde_json::from_str::<StructuredOutput>(&stdout) {
            return CompileOutput {
                code: structured.code,
                map: structured.map.filter(|map| !map.is_null()).map(|map| match map {
                    serde_json::Value::String(map) => map,
                    other => other.to_string(),
                }),
            };
        }
    }

    CompileOutput {
        code: stdout,
        map: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::test_support::Tagging;
    use crate::plugins::{PreprocessStyle, SourcemapOption};
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct Uppercase;

    #[async_trait]
    impl PreprocessStyle for Uppercase {
        async fn execute(&self, content: &str, _filename: &Path) -> Result<String> {
            Ok(content.to_uppercase())
        }
    }

    const SOURCE: &str = "<script>\nimport './lib.js'\n</script>\n<div/>\n<style lang=\"css\">a { color: red }</style>\n";

    fn component(dir: &Path) -> PathBuf {
        let filename = dir.join("the_best_component/index.svelte");
        fs::create_dir_all(filename.parent().unwrap()).unwrap();
        fs::write(&filename, SOURCE).unwrap();
        filename
    }

    fn shell(script: &str) -> CommandPlugin {
        CommandPlugin::new("svelte", "sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_pipes_preprocessed_source() {
        let dir = TempDir::new().unwrap();
        let filename = component(dir.path());

        let output = shell("cat")
            .compile(CompileRequest {
                code: SOURCE.to_string(),
                filename,
                sourcemap: SourcemapOption::default(),
                script_preprocessor: &Tagging,
                style_preprocessor: Some(&Uppercase),
            })
            .await
            .unwrap();

        assert_eq!(
            output.code,
            "<script>/* preprocessed */\nimport './lib.js'\n</script>\n<div/>\n<style lang=\"css\">A { COLOR: RED }</style>\n"
        );
        assert_eq!(output.map, None);
    }

    #[tokio::test]
    async fn test_structured_output_and_environment() {
        let dir = TempDir::new().unwrap();
        let filename = component(dir.path());

        let output = shell(r#"cat > /dev/null; printf '{"code":"define(%s)","map":{"version":3}}' "$COMPONENT_TAG""#)
            .compile(CompileRequest {
                code: SOURCE.to_string(),
                filename,
                sourcemap: true.into(),
                script_preprocessor: &Tagging,
                style_preprocessor: None,
            })
            .await
            .unwrap();

        assert_eq!(output.code, "define(the-best-component)");
        assert_eq!(output.map.as_deref(), Some("{\"version\":3}"));
    }

    #[tokio::test]
    async fn test_failure_reports_position() {
        let dir = TempDir::new().unwrap();
        let filename = component(dir.path());

        let error = shell("cat > /dev/null; echo 'Unexpected token (3:7)' >&2; exit 1")
            .compile(CompileRequest {
                code: SOURCE.to_string(),
                filename: filename.clone(),
                sourcemap: SourcemapOption::default(),
                script_preprocessor: &Tagging,
                style_preprocessor: None,
            })
            .await
            .unwrap_err();

        match error.downcast_ref::<PluginError>() {
            Some(PluginError::Compiler { file, line, column, message }) => {
                assert_eq!(file, &filename);
                assert_eq!((*line, *column), (3, 7));
                assert_eq!(message, "Unexpected token (3:7)");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_streams_large_components() {
        let dir = TempDir::new().unwrap();
        let filename = component(dir.path());
        let code = format!("<div>{}</div>\n", "x".repeat(1024 * 1024));

        let plugin = CommandPlugin::new("svelte", "cat", Vec::new());
        let compile = plugin.compile(CompileRequest {
            code: code.clone(),
            filename,
            sourcemap: SourcemapOption::default(),
            script_preprocessor: &Tagging,
            style_preprocessor: None,
        });

        let output = tokio::time::timeout(std::time::Duration::from_secs(10), compile)
            .await
            .expect("compiler output was not drained while writing its input")
            .unwrap();

        assert_eq!(output.code.len(), code.len());
        assert_eq!(output.code, code);
    }

    #[tokio::test]
    async fn test_rejects_empty_sourcemap_object() {
        let dir = TempDir::new().unwrap();
        let filename = component(dir.path());

        let error = shell("cat")
            .compile(CompileRequest {
                code: SOURCE.to_string(),
                filename,
                sourcemap: SourcemapOption::Split { js: None, css: None },
                script_preprocessor: &Tagging,
                style_preprocessor: None,
            })
            .await
            .unwrap_err();

        assert!(error.to_string().starts_with("enableSourcemap has a wrong format"));
    }
}
