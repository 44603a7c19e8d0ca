//! Code transformation
//!
//! Text-level rewriting of generated modules: offset splicing, import
//! rewriting passes, dependency copying and the minification seam.

mod copier;
mod minify;
mod rewriter;
mod splice;

pub use copier::{contained_destination, DependencyCopier, PARENT_SENTINEL};
pub use minify::{Minify, MinifyOutput, Passthrough};
pub use rewriter::{
    resolve_relative_imports, strip_component_marks, Mapped, MappingPass, COMPONENT_MARK,
};
pub use splice::{OffsetSplice, SpliceError};

pub(crate) use copier::quoted;
