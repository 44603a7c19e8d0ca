//! Command-line interface
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `compile`: Compile components into standalone modules

mod compile;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

pub use compile::CompileCommand;

/// Compiles component folders into standalone, browser-loadable ES modules
#[derive(Parser, Debug)]
#[command(name = "component-compiler")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to component.toml config file (defaults to ./component.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a component and the components it references
    Compile(CompileCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::Compile(cmd) => cmd.execute(self.config.as_deref()).await,
        }
    }
}

/// Print the banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "⚡".cyan(),
        "Component Compiler".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
