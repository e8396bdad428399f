//! CLI argument definitions.

use clap::Parser;

/// A meta-build generator: resolves `construct` project files into a build
/// graph and emits Ninja or Make input.
#[derive(Debug, Parser)]
#[command(name = "slipway", version, about)]
pub struct Cli {
    /// Sub-directory to begin parsing at (defaults to the current
    /// directory)
    pub subdir: Option<String>,

    /// Executor file format to emit
    #[arg(long, default_value = "ninja", value_parser = ["ninja", "make"])]
    pub generator: String,

    /// Also emit compile_commands.json per configuration
    #[arg(long)]
    pub compile_db: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}
