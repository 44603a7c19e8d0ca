//! Compile command implementation

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::info;

use crate::bundler::{Bundler, CompileOptions};
use crate::config::Config;
use crate::utils::{format_duration, format_size};

/// Compile a component folder into browser-loadable modules
#[derive(Args, Debug)]
pub struct CompileCommand {
    /// Component folder (or folder of components with --all)
    #[arg(short, long)]
    pub source: PathBuf,

    /// Output directory
    #[arg(short, long)]
    pub destination: PathBuf,

    /// Emit source maps
    #[arg(long)]
    pub sourcemap: bool,

    /// Public URL prefix of the output directory
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Compile every component folder found directly under --source
    #[arg(short, long)]
    pub all: bool,
}

impl CompileCommand {
    pub async fn execute(&self, config_path: Option<&Path>) -> Result<()> {
        let start = Instant::now();

        let config = match config_path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Config::load(path)?
            }
            None => Config::discover(&std::env::current_dir()?)?,
        };

        eprintln!("{} Compiling {}...", "→".blue(), self.source.display());

        let bundler = Bundler::new(config)?;
        let options = CompileOptions::from(self);

        let result = if self.all {
            bundler.compile_all(&options).await?
        } else {
            bundler.compile(&options).await?
        };

        eprintln!(
            "\n{} Compiled {} module(s) in {}\n",
            "✓".green().bold(),
            result.bundles.len(),
            format_duration(start.elapsed())
        );

        for bundle in &result.bundles {
            eprintln!(
                "  {} {} {}",
                "•".dimmed(),
                bundle.output_path.display().to_string().cyan(),
                format_size(bundle.size).dimmed()
            );

            if let Some(map) = &bundle.sourcemap_path {
                eprintln!("    {} {}", "↳".dimmed(), map.display().to_string().dimmed());
            }
        }

        eprintln!();

        Ok(())
    }
}

impl From<&CompileCommand> for CompileOptions {
    fn from(cmd: &CompileCommand) -> Self {
        Self {
            source: cmd.source.clone(),
            destination: cmd.destination.clone(),
            prefix: cmd.prefix.clone(),
            sourcemap: cmd.sourcemap.into(),
        }
    }
}
