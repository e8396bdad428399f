//! Project generation: load the tree, transform each configuration, emit.

use anyhow::{Context as _, Result};

use crate::core::context::Context;
use crate::generator::{compile_db, Backend};
use crate::script::{loader, BuildApi};
use crate::transform::lower;
use crate::transform::set::TransformSet;
use crate::util::paths::Directory;

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub backend: Backend,
    /// also write compile_commands.json next to the build file
    pub compile_db: bool,
    /// argv of this invocation, baked into the regeneration rule
    pub regen_args: Vec<String>,
}

/// Load the project at `subdir` (default: the context root) and emit build
/// files for every defined configuration under `<root>/<config-name>/`.
pub fn generate_all(ctx: Context, subdir: Option<&str>, opts: &GenerateOptions) -> Result<()> {
    let mut api = BuildApi::new(ctx);
    loader::load_project(&mut api, subdir)?;
    let mut ctx = api.into_context();

    // the default must exist, even when iterating all configurations
    ctx.configs.default()?;

    let root = if let Some(d) = subdir {
        let mut dir = ctx.dirs.current().clone();
        dir.cd(d)?;
        dir
    } else {
        ctx.dirs.current().clone()
    };

    let host = ctx.host_system().to_owned();
    let configs: Vec<(String, String, crate::core::scope::ScopeId, bool)> = ctx
        .configs
        .all()
        .iter()
        .map(|c| {
            (
                c.name().to_owned(),
                c.system(&host).to_owned(),
                c.pseudo_scope(),
                c.skip_on_error(),
            )
        })
        .collect();

    for (name, system, pseudo, skip_on_error) in configs {
        let result = generate_one(&mut ctx, &root, &name, &system, pseudo, opts);
        match result {
            Ok(()) => {}
            Err(e) if skip_on_error => {
                tracing::warn!("configuration '{name}' failed, skipping: {e:#}");
            }
            Err(e) => return Err(e).with_context(|| format!("configuration '{name}'")),
        }
    }
    Ok(())
}

fn generate_one(
    ctx: &mut Context,
    root: &Directory,
    name: &str,
    system: &str,
    pseudo: crate::core::scope::ScopeId,
    opts: &GenerateOptions,
) -> Result<()> {
    let mut out_dir = root.clone();
    out_dir.cd(name)?;
    out_dir.mkpath()?;

    let mut xform = TransformSet::new(out_dir.clone(), system);
    let scope_root = ctx.scopes.root();
    lower::transform_scope(ctx, scope_root, Some(pseudo), &mut xform)?;

    opts.backend.emit(ctx, &xform, &out_dir, &opts.regen_args)?;
    if opts.compile_db {
        compile_db::emit(ctx, &xform, &out_dir)?;
    }
    tracing::info!("wrote build description for configuration '{name}' to {}", out_dir.fullpath());
    Ok(())
}
