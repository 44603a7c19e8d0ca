//! Dependency scanning
//!
//! Parses generated module code and reports every import (static or dynamic)
//! and, optionally, every `export ... from` declaration, classified by the
//! role its target plays in a component build.

use std::ops::Range;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use swc_common::{sync::Lrc, FileName, SourceMap, Span, Spanned};
use swc_ecma_ast::{
    CallExpr, Callee, EsVersion, ExportSpecifier, Expr, ImportSpecifier, Lit, ModuleDecl,
    ModuleExportName, ModuleItem,
};
use swc_ecma_parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax};
use swc_ecma_visit::{Visit, VisitWith};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::utils::{line_column, source_frame};

/// Relative reference to plain JavaScript: extensionless or `.js` only
static PLAIN_CODE_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.(.*?/)+([^.]+?)(\.js)?$").unwrap());

static ASSET_URI: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\./assets/.+").unwrap());

/// Role of a referenced module in a component build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// Entry file of another component folder
    Component,
    /// Relative plain JavaScript copied along with the component
    PlainCode,
    /// File under the component's `assets/` folder
    Asset,
    /// Anything else (packages, unsupported extensions)
    External,
}

/// An import or re-export found in a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReference {
    pub target: String,
    pub kind: ReferenceKind,
    /// Extension of the target without the dot
    pub source_type: Option<String>,
    /// Byte range of the whole statement (or `import()` call)
    pub statement: Range<usize>,
    /// Byte range of the quoted target literal, quotes included
    pub literal: Range<usize>,
    pub default_binding: Option<String>,
    pub bindings: Vec<String>,
    pub dynamic: bool,
}

/// The parser rejected the module
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{message} ({line}:{column})")]
pub struct SyntaxError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{}\n{frame}", .source.message)]
    Syntax {
        frame: String,
        #[source]
        source: SyntaxError,
    },
}

impl ScanError {
    pub fn syntax(&self) -> &SyntaxError {
        match self {
            ScanError::Syntax { source, .. } => source,
        }
    }
}

/// Scan settings: registered component source types, export inclusion
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    component_patterns: Vec<Regex>,
    include_exports: bool,
}

impl ScanOptions {
    pub fn new<I, S>(source_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            component_patterns: source_types
                .into_iter()
                .map(|source_type| component_uri_pattern(source_type.as_ref()))
                .collect(),
            include_exports: false,
        }
    }

    pub fn with_exports(mut self) -> Self {
        self.include_exports = true;
        self
    }

    /// Classify a target; first matching rule wins
    pub fn classify(&self, target: &str) -> ReferenceKind {
        if self.component_patterns.iter().any(|pattern| pattern.is_match(target)) {
            ReferenceKind::Component
        } else if ASSET_URI.is_match(target) {
            ReferenceKind::Asset
        } else if PLAIN_CODE_URI.is_match(target) {
            ReferenceKind::PlainCode
        } else {
            ReferenceKind::External
        }
    }
}

/// `(dirs/)*component/file.<ext>`; captures the component folder and file stem
pub fn component_uri_pattern(source_type: &str) -> Regex {
    Regex::new(&format!(
        r"^(.*?/)*(.+?)/(.+?)\.{}$",
        regex::escape(source_type)
    ))
    .unwrap()
}

/// Split a component target into its folder name and file stem
pub fn component_parts(target: &str, source_type: &str) -> Option<(String, String)> {
    let captures = component_uri_pattern(source_type).captures(target)?;
    Some((captures.get(2)?.as_str().to_string(), captures.get(3)?.as_str().to_string()))
}

/// Parse `code` as an ES module and list its module references in source order
pub fn extract_dependencies(
    code: &str,
    options: &ScanOptions,
) -> Result<Vec<ModuleReference>, ScanError> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(FileName::Anon.into(), code.to_string());
    let base = fm.start_pos.0 as usize;

    let lexer = Lexer::new(
        Syntax::Es(EsSyntax::default()),
        EsVersion::EsNext,
        StringInput::from(&*fm),
        None,
    );
    let mut parser = Parser::new_from(lexer);

    let parsed = parser.parse_module();
    let recovered = parser.take_errors().into_iter().next();

    let module = match (parsed, recovered) {
        (Ok(module), None) => module,
        (Err(error), _) | (Ok(_), Some(error)) => {
            let offset = (error.span().lo.0 as usize).saturating_sub(base);
            let (line, column) = line_column(code, offset);

            return Err(ScanError::Syntax {
                frame: source_frame(code, line, column),
                source: SyntaxError {
                    message: error.kind().msg().to_string(),
                    line,
                    column,
                },
            });
        }
    };

    let mut collector = ReferenceCollector {
        code,
        base,
        options,
        references: Vec::new(),
    };

    for item in &module.body {
        if let ModuleItem::ModuleDecl(decl) = item {
            collector.collect_declaration(decl);
        }
    }

    module.visit_with(&mut collector);

    let mut references = collector.references;
    references.sort_by_key(|reference| reference.statement.start);

    debug!("Found {} module references", references.len());

    Ok(references)
}

struct ReferenceCollector<'a> {
    code: &'a str,
    base: usize,
    options: &'a ScanOptions,
    references: Vec<ModuleReference>,
}

impl<'a> ReferenceCollector<'a> {
    fn range(&self, span: Span) -> Range<usize> {
        (span.lo.0 as usize - self.base)..(span.hi.0 as usize - self.base)
    }

    /// Text of a quoted literal without its quotes
    fn unquoted(&self, span: Span) -> String {
        let range = self.range(span);
        self.code[range.start + 1..range.end - 1].to_string()
    }

    fn collect_declaration(&mut self, decl: &ModuleDecl) {
        match decl {
            ModuleDecl::Import(import) => {
                let default_binding = import.specifiers.iter().find_map(|specifier| match specifier {
                    ImportSpecifier::Default(default) => Some(default.local.sym.to_string()),
                    _ => None,
                });

                let bindings = import
                    .specifiers
                    .iter()
                    .map(|specifier| match specifier {
                        ImportSpecifier::Named(named) => named.local.sym.to_string(),
                        ImportSpecifier::Default(default) => default.local.sym.to_string(),
                        ImportSpecifier::Namespace(namespace) => namespace.local.sym.to_string(),
                    })
                    .collect();

                self.push(import.span, import.src.span, default_binding, bindings, false);
            }

            ModuleDecl::ExportNamed(export) if self.options.include_exports => {
                if let Some(src) = &export.src {
                    let bindings = export
                        .specifiers
                        .iter()
                        .map(|specifier| match specifier {
                            ExportSpecifier::Named(named) => self.export_name(&named.orig),
                            ExportSpecifier::Namespace(namespace) => self.export_name(&namespace.name),
                            ExportSpecifier::Default(default) => default.exported.sym.to_string(),
                        })
                        .collect();

                    self.push(export.span, src.span, None, bindings, false);
                }
            }

            ModuleDecl::ExportAll(export) if self.options.include_exports => {
                self.push(export.span, export.src.span, None, Vec::new(), false);
            }

            _ => {}
        }
    }

    fn export_name(&self, name: &ModuleExportName) -> String {
        match name {
            ModuleExportName::Ident(ident) => ident.sym.to_string(),
            ModuleExportName::Str(literal) => self.unquoted(literal.span),
        }
    }

    fn push(
        &mut self,
        statement: Span,
        literal: Span,
        default_binding: Option<String>,
        bindings: Vec<String>,
        dynamic: bool,
    ) {
        let target = self.unquoted(literal);

        if is_remote_url(&target) {
            return;
        }

        self.references.push(ModuleReference {
            kind: self.options.classify(&target),
            source_type: Path::new(&target)
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned()),
            statement: self.range(statement),
            literal: self.range(literal),
            default_binding,
            bindings,
            dynamic,
            target,
        });
    }
}

impl<'a> Visit for ReferenceCollector<'a> {
    fn visit_call_expr(&mut self, call: &CallExpr) {
        if let Callee::Import(_) = &call.callee {
            match call.args.first().map(|arg| &*arg.expr) {
                Some(Expr::Lit(Lit::Str(literal))) => {
                    self.push(call.span, literal.span, None, Vec::new(), true);
                }
                _ => {
                    let (line, column) = line_column(self.code, self.range(call.span).start);
                    warn!(
                        "Skipping dynamic import with a non-literal target\n{}",
                        source_frame(self.code, line, column)
                    );
                }
            }
        }

        call.visit_children_with(self);
    }
}

fn is_remote_url(target: &str) -> bool {
    Url::parse(target)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scan(code: &str) -> Vec<ModuleReference> {
        extract_dependencies(code, &ScanOptions::new(["svelte", "vue"])).unwrap()
    }

    #[test]
    fn test_classification() {
        let options = ScanOptions::new(["svelte"]);

        assert_eq!(options.classify("./assets/x"), ReferenceKind::Asset);
        assert_eq!(options.classify("./assets/images/icon.svg"), ReferenceKind::Asset);
        assert_eq!(options.classify("./lib/util.js"), ReferenceKind::PlainCode);
        assert_eq!(options.classify("../../helpers/util"), ReferenceKind::PlainCode);
        assert_eq!(options.classify("widget/index.svelte"), ReferenceKind::Component);
        assert_eq!(
            options.classify("../the_main_component/index.svelte"),
            ReferenceKind::Component
        );
        assert_eq!(options.classify("svelte/internal"), ReferenceKind::External);
        assert_eq!(options.classify("lodash"), ReferenceKind::External);
        assert_eq!(options.classify("./link/index.mjs"), ReferenceKind::External);
        assert_eq!(options.classify("./vendor/lib.min.js"), ReferenceKind::External);
    }

    #[test]
    fn test_unregistered_source_type_is_not_a_component() {
        let options = ScanOptions::new(["svelte"]);
        assert_eq!(options.classify("widget/index.vue"), ReferenceKind::External);
    }

    #[test]
    fn test_extract_imports() {
        let code = "import foo from './foo'\nimport { bar, baz as qux } from '../bar.js';\nimport * as ns from 'pkg'\n";
        let references = scan(code);

        assert_eq!(references.len(), 3);

        let foo = &references[0];
        assert_eq!(foo.target, "./foo");
        assert_eq!(foo.kind, ReferenceKind::PlainCode);
        assert_eq!(foo.default_binding.as_deref(), Some("foo"));
        assert_eq!(foo.bindings, vec!["foo"]);
        assert_eq!(&code[foo.statement.clone()], "import foo from './foo'");
        assert_eq!(&code[foo.literal.clone()], "'./foo'");
        assert_eq!(foo.source_type, None);

        let bar = &references[1];
        assert_eq!(bar.bindings, vec!["bar", "qux"]);
        assert_eq!(bar.default_binding, None);
        assert_eq!(bar.source_type.as_deref(), Some("js"));
        assert_eq!(&code[bar.statement.clone()], "import { bar, baz as qux } from '../bar.js';");

        let ns = &references[2];
        assert_eq!(ns.kind, ReferenceKind::External);
        assert_eq!(ns.bindings, vec!["ns"]);
    }

    #[test]
    fn test_component_reference_reports_source_type() {
        let references = scan("import Widget from '@scope/shared/widget/index.svelte'");

        assert_eq!(references[0].kind, ReferenceKind::Component);
        assert_eq!(references[0].source_type.as_deref(), Some("svelte"));
        assert_eq!(
            component_parts(&references[0].target, "svelte"),
            Some(("widget".to_string(), "index".to_string()))
        );
    }

    #[test]
    fn test_exports_only_when_requested() {
        let code = "export { a } from './a.js'\nexport * from './b.js'\nexport const c = 1\n";

        assert!(scan(code).is_empty());

        let references = extract_dependencies(code, &ScanOptions::default().with_exports()).unwrap();
        let targets: Vec<_> = references.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["./a.js", "./b.js"]);
        assert_eq!(references[0].bindings, vec!["a"]);
    }

    #[test]
    fn test_dynamic_imports() {
        let code = "const lazy = () => import('./lazy.js')\nconst name = 'x'\nimport(`./${name}.js`)\n";
        let references = scan(code);

        assert_eq!(references.len(), 1);
        assert!(references[0].dynamic);
        assert_eq!(references[0].kind, ReferenceKind::PlainCode);
        assert_eq!(&code[references[0].statement.clone()], "import('./lazy.js')");
    }

    #[test]
    fn test_skips_remote_urls() {
        let references = scan("import 'https://cdn.example.com/lib.js'\nimport './local.js'");

        assert_eq!(references.len(), 1);
        assert_eq!(references[0].target, "./local.js");
    }

    #[test]
    fn test_ignores_commented_imports() {
        let code = "'//'; import 'joi'\n/*\nimport fuse from 'fuse.js'\n*/\n// import { tick } from 'svelte'\n";
        let targets: Vec<_> = scan(code).into_iter().map(|r| r.target).collect();

        assert_eq!(targets, vec!["joi"]);
    }

    #[test]
    fn test_syntax_error_carries_source_frame() {
        let code = "import a from './a.js'\nconst = 3\n";
        let error = extract_dependencies(code, &ScanOptions::default()).unwrap_err();

        assert_eq!(error.syntax().line, 2);
        let message = error.to_string();
        assert!(message.contains("▶ 2 │ const = 3"), "{}", message);
        assert!(message.contains('▲'));
        assert!(std::error::Error::source(&error).is_some());
    }
}
