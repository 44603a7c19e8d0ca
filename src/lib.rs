//! Component compiler library
//!
//! Compiles component folders (one entry file plus optional `assets/` and
//! `styles/`) into standalone ES modules, copying and rewriting every local
//! dependency so the output tree loads in the browser as is.

pub mod bundler;
pub mod cli;
pub mod config;
pub mod plugins;
pub mod resolver;
pub mod transform;
pub mod utils;

pub use bundler::{Bundler, CompileOptions};
pub use cli::Cli;
pub use config::Config;
