//! Minification seam
//!
//! Compiled components go through a [`Minify`] implementation right before
//! they are written. The default keeps the code as is and links the emitted
//! sourcemap.

use async_trait::async_trait;

use anyhow::Result;

/// Code and optional sourcemap of a compiled component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinifyOutput {
    pub code: String,
    pub map: Option<String>,
}

#[async_trait]
pub trait Minify: Send + Sync {
    /// `map_file` is the file name the sourcemap will be written under
    async fn minify(&self, code: String, map: Option<String>, map_file: &str)
        -> Result<MinifyOutput>;
}

/// Leaves code untouched apart from the `sourceMappingURL` comment
#[derive(Debug, Default, Clone)]
pub struct Passthrough;

#[async_trait]
impl Minify for Passthrough {
    async fn minify(
        &self,
        code: String,
        map: Option<String>,
        map_file: &str,
    ) -> Result<MinifyOutput> {
        let code = match &map {
            Some(_) => format!("{}\n//# sourceMappingURL={}", code.trim_end(), map_file),
            None => code,
        };

        Ok(MinifyOutput { code, map })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passthrough_links_sourcemap() {
        let output = Passthrough
            .minify("let a = 1\n".to_string(), Some("{}".to_string()), "index.js.map")
            .await
            .unwrap();

        assert_eq!(output.code, "let a = 1\n//# sourceMappingURL=index.js.map");
        assert_eq!(output.map.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_passthrough_without_sourcemap() {
        let output = Passthrough.minify("let a = 1\n".to_string(), None, "index.js.map").await.unwrap();

        assert_eq!(output.code, "let a = 1\n");
        assert_eq!(output.map, None);
    }
}
