//! Built-in style preprocessor
//!
//! Rebases `url(./assets/...)` and `url(./styles/...)` references so a
//! component stylesheet keeps working once served from its public path.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::{PreprocessStyle, StylePreprocessorFactory};

static LOCAL_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"url\(\s*(?P<quote>['"]?)\./(?P<path>(?:assets|styles)/[^'")]+)['"]?\s*\)"#).unwrap()
});

/// Creates one [`UrlRebaser`] per component
#[derive(Debug, Default, Clone)]
pub struct UrlRebaseFactory;

impl StylePreprocessorFactory for UrlRebaseFactory {
    fn for_component(&self, dest: &str) -> Arc<dyn PreprocessStyle> {
        Arc::new(UrlRebaser::new(dest))
    }
}

#[derive(Debug, Clone)]
pub struct UrlRebaser {
    dest: String,
}

impl UrlRebaser {
    pub fn new(dest: impl Into<String>) -> Self {
        Self {
            dest: dest.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn rebase(&self, content: &str) -> String {
        LOCAL_URL
            .replace_all(content, |captures: &Captures| {
                let quote = &captures["quote"];
                format!("url({quote}{}/{}{quote})", self.dest, &captures["path"])
            })
            .into_owned()
    }
}

#[async_trait]
impl PreprocessStyle for UrlRebaser {
    async fn execute(&self, content: &str, _filename: &Path) -> Result<String> {
        Ok(self.rebase(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rebases_local_urls() {
        let rebaser = UrlRebaser::new("https://cdn.example.com/the_best_component/");
        let css = ".a { background: url(./assets/bg.png) }\n\
                   @font-face { src: url( \"./styles/fonts/x.woff\" ) }\n\
                   .b { background: url(https://example.com/c.png) }\n\
                   .c { background: url('../assets/up.png') }";

        assert_eq!(
            rebaser.rebase(css),
            ".a { background: url(https://cdn.example.com/the_best_component/assets/bg.png) }\n\
             @font-face { src: url(\"https://cdn.example.com/the_best_component/styles/fonts/x.woff\") }\n\
             .b { background: url(https://example.com/c.png) }\n\
             .c { background: url('../assets/up.png') }"
        );
    }

    #[tokio::test]
    async fn test_factory_builds_component_preprocessor() {
        let preprocessor = UrlRebaseFactory.for_component("the_best_component");

        assert_eq!(
            preprocessor
                .execute("a { b: url('./assets/x.svg') }", Path::new("index.css"))
                .await
                .unwrap(),
            "a { b: url('the_best_component/assets/x.svg') }"
        );
    }
}
