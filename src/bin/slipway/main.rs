//! slipway CLI - generate executor build files from `construct` trees.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use slipway::generator::{emit_code, Backend, EmbedSpec};
use slipway::ops::{generate_all, GenerateOptions};
use slipway::util::paths::Directory;
use slipway::Context;

mod cli;

use cli::Cli;

fn main() {
    // the embed sub-mode is how generated build files invoke us as a build
    // step; its single-dash spelling predates the clap surface
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("-embed_binary_cstring") {
        if let Err(e) = run_embed(&args[2..]) {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
        return;
    }

    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run_embed(args: &[String]) -> Result<()> {
    let spec = EmbedSpec::parse_args(args)?;
    emit_code(&spec)
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("slipway=debug")
    } else {
        EnvFilter::new("slipway=info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let ctx = Context::new(Directory::current())?;
    let opts = GenerateOptions {
        backend: Backend::parse(&cli.generator).unwrap_or_default(),
        compile_db: cli.compile_db,
        regen_args: std::env::args().collect(),
    };
    generate_all(ctx, cli.subdir.as_deref(), &opts)
}
