//! The transform pass.
//!
//! Walks the scope tree under a chosen configuration and lowers each item
//! into build items: resolving tools by extension and tag, expanding chain
//! rules (`foo.y` -> `foo.c` -> `foo.o`), flattening library and package
//! flags onto their consumers, and materializing code-generation side
//! files.

use std::collections::VecDeque;

use anyhow::Result;

use crate::core::context::Context;
use crate::core::dependency::DepKind;
use crate::core::error::BuildError;
use crate::core::item::{CodeGenPayload, ItemId, ItemKind, LibraryKind, OptionalPayload};
use crate::core::scope::ScopeId;
use crate::core::toolset;
use crate::core::variable::Variable;
use crate::transform::build_item::{BuildId, BuildItem};
use crate::transform::set::{ChainInfo, TransformSet};
use crate::util::paths::Directory;
use crate::util::text;

/// Lower one scope (and its sub-scopes, each into a child set) into `xform`.
/// `pseudo` is the active configuration's overlay scope.
pub fn transform_scope(
    ctx: &mut Context,
    scope: ScopeId,
    pseudo: Option<ScopeId>,
    xform: &mut TransformSet,
) -> Result<()> {
    tracing::debug!("transform scope");
    let sub_scopes = ctx.scopes.get(scope).sub_scopes.clone();
    for ss in sub_scopes {
        let mut child = TransformSet::new(xform.out_dir().clone(), xform.system().to_owned());
        transform_scope(ctx, ss, pseudo, &mut child)?;
        xform.add_child(child);
    }

    for p in ctx.scopes.get(scope).pools.clone() {
        xform.add_pool(p);
    }

    // active toolsets: the scope's list overlaid with the configuration's
    let mut active = ctx.scopes.get(scope).enabled_toolsets.clone();
    if let Some(ps) = pseudo {
        let extra = ctx.scopes.get(ps).enabled_toolsets.clone();
        toolset::modify_active(&mut active, &extra, &ctx.toolsets);
    }

    let mut lib_search = Vec::new();
    let mut pkg_search = Vec::new();
    for ts in &active {
        let ts = ctx.toolsets.get(*ts);
        lib_search.extend(ts.lib_search_path().iter().cloned());
        pkg_search.extend(ts.pkg_search_path().iter().cloned());
    }
    xform.set_lib_search_path(lib_search);
    xform.set_pkg_search_path(pkg_search);

    // one tool per tag: a lone tool wins outright, otherwise the active
    // toolsets decide
    let by_tag = ctx.scopes.get(scope).tools_by_tag.clone();
    for (tag, list) in by_tag {
        if list.len() == 1 {
            xform.add_tool(list[0]);
            continue;
        }
        let mut found = None;
        for t in &list {
            for ts in &active {
                if ctx.toolsets.get(*ts).has_tool(*t) {
                    if let Some(prev) = found {
                        if prev != *t {
                            return Err(BuildError::NoTool(format!(
                                "tool '{}' conflicts with tool '{}' previously matched to a different active toolset",
                                ctx.tools.get(*t).name(),
                                ctx.tools.get(prev).name()
                            ))
                            .into());
                        }
                    }
                    found = Some(*t);
                }
            }
        }
        match found {
            Some(t) => xform.add_tool(t),
            None => {
                return Err(BuildError::NoTool(format!(
                    "unable to find active tool for tool tag '{tag}'"
                ))
                .into())
            }
        }
    }

    // scope base first, pseudo-scope wins on conflict
    let vars = ctx.scopes.get(scope).variables.clone();
    xform.merge_variables(&vars);
    let opts = ctx.scopes.get(scope).options.clone();
    xform.merge_options(&opts);
    if let Some(ps) = pseudo {
        let vars = ctx.scopes.get(ps).variables.clone();
        xform.merge_variables(&vars);
        let opts = ctx.scopes.get(ps).options.clone();
        xform.merge_options(&opts);
    }

    let items = ctx.scopes.get(scope).items.clone();
    for i in &items {
        transform_item(ctx, *i, xform)?;
    }

    copy_dependencies(ctx, xform)?;
    Ok(())
}

/// Propagate item-graph edges onto the build-item images.
fn copy_dependencies(ctx: &Context, xform: &mut TransformSet) -> Result<()> {
    let pairs: Vec<(ItemId, BuildId)> = xform.transformed().collect();
    for (item, build) in pairs {
        let deps: Vec<(ItemId, DepKind)> = ctx
            .items
            .get(item)
            .deps()
            .iter()
            .map(|(i, k)| (*i, *k))
            .collect();
        for (dep, kind) in deps {
            let Some(dep_bi) = xform.get_transform(dep) else {
                continue;
            };
            if dep_bi == build || xform.builds.has_dependency(dep_bi, build) {
                continue;
            }
            xform.builds.add_dependency(build, kind, dep_bi)?;
            xform.builds.get_mut(dep_bi).mark_dependent();
        }
    }
    Ok(())
}

/// Lower one item, memoized on its id.
pub fn transform_item(ctx: &mut Context, id: ItemId, xform: &mut TransformSet) -> Result<BuildId> {
    if let Some(b) = xform.get_transform(id) {
        return Ok(b);
    }
    let (name, dir, kind) = {
        let item = ctx.items.get(id);
        (item.name().to_owned(), item.dir().clone(), item.kind.clone())
    };

    let build = match kind {
        ItemKind::Source => transform_source(ctx, xform, id, &name, &dir)?,
        ItemKind::CompileSet { children } => {
            transform_compile_set(ctx, xform, id, &name, &dir, &children)?
        }
        ItemKind::Executable { children } => {
            transform_executable(ctx, xform, id, &name, &dir, &children)?
        }
        ItemKind::Library { children, kind } => {
            transform_library(ctx, xform, id, &name, &dir, &children, kind)?
        }
        ItemKind::CodeGenerator(payload) => {
            transform_code_generator(ctx, xform, id, &name, &dir, &payload)?
        }
        ItemKind::CodeFilter {
            children,
            tool,
            outputs,
        } => transform_code_filter(ctx, xform, id, &name, &dir, &children, tool, &outputs)?,
        ItemKind::CreateFile { lines } => {
            transform_create_file(ctx, xform, &name, &dir, &lines)?
        }
        ItemKind::OptionalSource(payload) => {
            transform_optional(ctx, xform, id, &name, &dir, &payload)?
        }
        ItemKind::ExternLibrarySet(payload) => {
            transform_optional(ctx, xform, id, &name, &dir, &payload)?
        }
        ItemKind::Package { pc_file, .. } => {
            transform_package(ctx, xform, id, &name, &dir, pc_file.as_deref())?
        }
    };

    xform.record_transform(id, build);
    Ok(build)
}

fn transform_source(
    ctx: &mut Context,
    xform: &mut TransformSet,
    id: ItemId,
    name: &str,
    dir: &Directory,
) -> Result<BuildId> {
    tracing::trace!("transform source {name}");
    let (first, _info) = chain_transform(ctx, xform, name, dir, Some(id))?;
    let overrides = ctx.items.get(id).option_overrides().clone();
    for (group, choice) in overrides {
        xform.builds.get_mut(first).set_flag(group, choice);
    }
    Ok(first)
}

/// Chain-rule application: find a tool by extension, create the stage, then
/// recurse on each declared output under the artifact directory. Results
/// are cached by `(dir, name)` so a path is lowered exactly once.
fn chain_transform(
    ctx: &mut Context,
    xform: &mut TransformSet,
    name: &str,
    src_dir: &Directory,
    force_from: Option<ItemId>,
) -> Result<(BuildId, ChainInfo)> {
    if let Some(first) = xform.chain_cached(src_dir, name) {
        let info = xform.chain_info(first).cloned().unwrap_or_default();
        return Ok((first, info));
    }

    let ext = text::extension(name);
    let tool = match force_from
        .and_then(|f| ctx.items.get(f).forced_tool(ext).map(str::to_owned))
    {
        Some(forced) => Some(
            xform
                .find_tool_by_name(&ctx.tools, &forced)
                .ok_or_else(|| {
                    BuildError::NoTool(format!(
                        "forced tool '{forced}' for '{name}' is not registered"
                    ))
                })?,
        ),
        None => xform.find_tool(&ctx.tools, ext),
    };

    let mut info = ChainInfo::default();
    let first = match tool {
        Some(t) => {
            let mut bi = BuildItem::new(name, src_dir.clone());
            bi.set_tool(&ctx.tools, t)?;
            let out_dir = src_dir.reroot(xform.artifact_dir());
            bi.set_out_dir(out_dir.clone());
            let outputs = bi.outputs().to_vec();
            let first = xform.builds.add(bi);
            xform.record_chain(src_dir, name, first);

            // a self-hosted tool pulls in the item that builds it
            if let Some(gen_exe) = ctx.tools.get(t).generated_exe() {
                let exe_bi = transform_item(ctx, gen_exe, xform)?;
                xform.builds.add_dependency(first, DepKind::Implicit, exe_bi)?;
                xform.builds.get_mut(exe_bi).mark_dependent();
            }

            let tag = ctx.tools.get(t).tag().to_owned();
            if outputs.is_empty() {
                info.terminals.push(first);
                info.tags.insert(tag.clone());
                info.compiles.push(first);
            }
            for out in outputs {
                let (sub_first, sub_info) = chain_transform(ctx, xform, &out, &out_dir, None)?;
                xform.builds.add_dependency(sub_first, DepKind::Explicit, first)?;
                xform.builds.get_mut(first).mark_dependent();
                if xform.builds.get(sub_first).tool().is_some() {
                    info.terminals.extend(sub_info.terminals);
                    info.tags.extend(sub_info.tags);
                    info.compiles.extend(sub_info.compiles);
                } else {
                    // the output has no further tool: it is a terminal
                    // produced by this stage
                    info.terminals.push(sub_first);
                    info.tags.insert(tag.clone());
                    info.compiles.push(first);
                }
            }
            first
        }
        None => {
            // plain input file
            let mut bi = BuildItem::new(name, src_dir.clone());
            bi.set_outputs(vec![name.to_owned()]);
            let first = xform.builds.add(bi);
            xform.record_chain(src_dir, name, first);
            info.terminals.push(first);
            first
        }
    };

    xform.record_chain_info(first, info.clone());
    Ok((first, info))
}

/// Library-ish flags gathered while iterating a container's children.
#[derive(Debug, Default)]
struct LibAccum {
    cflags: Variable,
    ldflags: Variable,
    libs: Variable,
    libdirs: Variable,
}

impl LibAccum {
    fn new() -> LibAccum {
        LibAccum {
            cflags: Variable::new("cflags"),
            ldflags: Variable::new("ldflags"),
            libs: Variable::new("libs"),
            libdirs: Variable::new("libdirs"),
        }
    }

    fn absorb(&mut self, bi: &BuildItem) {
        if let Some(v) = bi.variable("cflags") {
            self.cflags.add_if_missing_many(v.values().iter().cloned());
        }
        if let Some(v) = bi.variable("ldflags") {
            self.ldflags.add_many(v.values().iter().cloned());
        }
        if let Some(v) = bi.variable("libs") {
            self.libs.add_many(v.values().iter().cloned());
        }
        if let Some(v) = bi.variable("libdirs") {
            self.libdirs.add_if_missing_many(v.values().iter().cloned());
        }
    }
}

/// Iterate a container's children (plus resolved external packages),
/// classifying each: libraries and packages become IMPLICIT flag
/// contributors, executables become ORDER-only, everything else feeds the
/// chain-rule engine. Compile flags propagate onto the tool-bearing steps.
fn fill_build_item(
    ctx: &mut Context,
    xform: &mut TransformSet,
    group: BuildId,
    children: &[ItemId],
    extras: &[ItemId],
) -> Result<(ChainInfo, LibAccum)> {
    let mut accum = LibAccum::new();
    let mut queue = VecDeque::new();

    for child in children.iter().chain(extras.iter()) {
        let xi = transform_item(ctx, *child, xform)?;
        xform.builds.get_mut(xi).mark_dependent();

        let child_item = ctx.items.get(*child);
        match &child_item.kind {
            ItemKind::Library { .. } | ItemKind::Package { .. } => {
                tracing::debug!(
                    "'{}' uses library flags of '{}'",
                    xform.builds.get(group).name(),
                    child_item.name()
                );
                let is_library = matches!(child_item.kind, ItemKind::Library { .. });
                let lib_name = child_item.name().to_owned();
                xform.builds.add_dependency(group, DepKind::Implicit, xi)?;
                if is_library {
                    accum.libs.add_if_missing(lib_name);
                    accum
                        .libdirs
                        .add_if_missing(xform.builds.get(xi).out_dir().fullpath());
                }
                accum.absorb(&xform.builds.get(xi).clone());
            }
            ItemKind::Executable { .. } => {
                // executables cannot link executables; order-only
                tracing::debug!(
                    "'{}' will be built before '{}' because of declared dependency",
                    child_item.name(),
                    xform.builds.get(group).name()
                );
                xform.builds.add_dependency(group, DepKind::Order, xi)?;
            }
            ItemKind::OptionalSource(_) | ItemKind::ExternLibrarySet(_) => {
                accum.absorb(&xform.builds.get(xi).clone());
                queue.push_back(xi);
            }
            _ => queue.push_back(xi),
        }
    }

    let chain = follow_chains(ctx, xform, group, queue)?;

    // compile steps get the collected cflags and the group's defines
    if !accum.cflags.is_empty() {
        for c in &chain.compiles {
            xform.builds.get_mut(*c).add_to_variable("cflags", &accum.cflags);
        }
    }
    if let Some(defines) = xform.builds.get(group).variable("defines").cloned() {
        if !defines.is_empty() {
            for c in &chain.compiles {
                xform.builds.get_mut(*c).add_to_variable("defines", &defines);
            }
        }
    }

    Ok((chain, accum))
}

/// Run the chain-rule closure over queued build items, linking terminals
/// onto `group` and collecting the tags that decide the linker.
fn follow_chains(
    ctx: &mut Context,
    xform: &mut TransformSet,
    group: BuildId,
    mut queue: VecDeque<BuildId>,
) -> Result<ChainInfo> {
    let mut acc = ChainInfo::default();
    while let Some(xi) = queue.pop_front() {
        if let Some(info) = xform.chain_info(xi).cloned() {
            for t in &info.terminals {
                xform.builds.add_dependency(group, DepKind::Explicit, *t)?;
                xform.builds.get_mut(*t).mark_dependent();
            }
            acc.terminals.extend(info.terminals);
            acc.tags.extend(info.tags);
            acc.compiles.extend(info.compiles);
            continue;
        }

        // a generated item: chase tools for each declared output
        let outputs = xform.builds.get(xi).outputs().to_vec();
        let out_dir = xform.builds.get(xi).out_dir().clone();
        let mut chained = false;
        for out in outputs {
            if xform.find_tool(&ctx.tools, text::extension(&out)).is_none() {
                continue;
            }
            let (sub_first, sub_info) = chain_transform(ctx, xform, &out, &out_dir, None)?;
            xform.builds.add_dependency(sub_first, DepKind::Explicit, xi)?;
            xform.builds.get_mut(xi).mark_dependent();
            for t in &sub_info.terminals {
                xform.builds.add_dependency(group, DepKind::Explicit, *t)?;
                xform.builds.get_mut(*t).mark_dependent();
            }
            acc.terminals.extend(sub_info.terminals);
            acc.tags.extend(sub_info.tags);
            acc.compiles.extend(sub_info.compiles);
            chained = true;
        }
        if !chained {
            xform.builds.add_dependency(group, DepKind::Explicit, xi)?;
            xform.builds.get_mut(xi).mark_dependent();
            acc.terminals.push(xi);
            if let Some(t) = xform.builds.get(xi).tool() {
                acc.tags.insert(ctx.tools.get(t).tag().to_owned());
                acc.compiles.push(xi);
            }
        }
    }
    Ok(acc)
}

fn transform_compile_set(
    ctx: &mut Context,
    xform: &mut TransformSet,
    _id: ItemId,
    name: &str,
    dir: &Directory,
    children: &[ItemId],
) -> Result<BuildId> {
    tracing::trace!("transform compile set {name}");
    let mut bi = BuildItem::new(name, dir.clone());
    bi.set_use_name(false);
    bi.set_out_dir(xform.out_dir().clone());
    let group = xform.builds.add(bi);
    let (chain, _accum) = fill_build_item(ctx, xform, group, children, &[])?;
    xform.record_chain_info(group, chain);
    Ok(group)
}

fn exe_out_dir(ctx: &Context, xform: &TransformSet, id: ItemId) -> Result<Directory> {
    match ctx.items.get(id).variable("exe_dir") {
        Some(v) if !v.is_empty() => {
            let mut d = xform.out_dir().clone();
            for seg in v.values() {
                d.cd(seg)?;
            }
            Ok(d)
        }
        _ => Ok(xform.bin_dir().clone()),
    }
}

fn transform_executable(
    ctx: &mut Context,
    xform: &mut TransformSet,
    id: ItemId,
    name: &str,
    dir: &Directory,
    children: &[ItemId],
) -> Result<BuildId> {
    tracing::debug!("transform executable {name}");
    let mut bi = BuildItem::new(name, dir.clone());
    bi.set_use_name(false);
    {
        let item = ctx.items.get(id);
        bi.set_top_level(item.is_top_level(), item.pseudo_target().map(str::to_owned));
        bi.set_default_target(item.is_default_target());
    }
    bi.set_out_dir(exe_out_dir(ctx, xform, id)?);
    let group = xform.builds.add(bi);

    let (chain, accum) = fill_build_item(ctx, xform, group, children, &[])?;
    {
        let g = xform.builds.get_mut(group);
        g.add_to_variable("ldflags", &accum.ldflags);
        g.add_to_variable("libs", &accum.libs);
        g.add_to_variable("libdirs", &accum.libdirs);
    }

    if chain.tags.is_empty() {
        return Err(BuildError::NoTool(format!(
            "no tags available to determine linker for executable '{name}'"
        ))
        .into());
    }
    let linker = xform
        .find_tool_for_set(&ctx.tools, "ld", &chain.tags)
        .ok_or_else(|| {
            BuildError::NoTool(format!(
                "unable to find linker to handle the following tools: {}",
                chain.tags.iter().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;
    {
        let g = xform.builds.get_mut(group);
        g.set_tool(&ctx.tools, linker)?;
        g.set_outputs(vec![name.to_owned()]);
    }
    Ok(group)
}

fn transform_library(
    ctx: &mut Context,
    xform: &mut TransformSet,
    id: ItemId,
    name: &str,
    dir: &Directory,
    children: &[ItemId],
    kind_override: Option<LibraryKind>,
) -> Result<BuildId> {
    tracing::debug!("transform library {name}");
    let mut bi = BuildItem::new(name, dir.clone());
    bi.set_use_name(false);
    {
        let item = ctx.items.get(id);
        bi.set_top_level(item.is_top_level(), item.pseudo_target().map(str::to_owned));
        bi.set_default_target(item.is_default_target());
    }
    bi.set_out_dir(xform.lib_dir().clone());
    let group = xform.builds.add(bi);

    let (chain, mut accum) = fill_build_item(ctx, xform, group, children, &[])?;

    let lib_type = kind_override
        .map(|k| k.as_str().to_owned())
        .or_else(|| ctx.items.find_variable_value_recursive(id, "library_type"))
        .or_else(|| {
            let v = xform.var_value("default_library_type");
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
        .unwrap_or_else(|| {
            tracing::debug!("no library type declared for '{name}', defaulting to static");
            "static".to_owned()
        });
    // tag prefixes are static_lib / dynamic_lib; "both" builds the archive
    let tag_prefix = match lib_type.as_str() {
        "shared" | "dynamic" => "dynamic",
        _ => "static",
    };

    let tool = xform
        .find_tool_for_set(&ctx.tools, tag_prefix, &chain.tags)
        .ok_or_else(|| {
            BuildError::NoTool(format!(
                "unable to find library tool for type '{}' with objects of the following tools: {}",
                lib_type,
                chain.tags.iter().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;
    xform.builds.get_mut(group).set_tool(&ctx.tools, tool)?;

    if tag_prefix == "static" {
        // static archives do not absorb link inputs; surface them for
        // consumers
        let g = xform.builds.get_mut(group);
        if !accum.libs.is_empty() {
            accum.libs.remove_duplicates_keep_last();
            g.add_to_variable("libs", &accum.libs);
        }
        if !accum.libdirs.is_empty() {
            g.add_to_variable("libdirs", &accum.libdirs);
        }
        if !accum.ldflags.is_empty() {
            g.add_to_variable("ldflags", &accum.ldflags);
        }
    }
    Ok(group)
}

fn transform_code_generator(
    ctx: &mut Context,
    xform: &mut TransformSet,
    id: ItemId,
    name: &str,
    dir: &Directory,
    payload: &CodeGenPayload,
) -> Result<BuildId> {
    tracing::debug!("transform code generator {name}");
    let out_dir = dir.reroot(xform.artifact_dir());
    let mut bi = BuildItem::new(name, out_dir.clone());
    bi.set_use_name(false);
    let mut vars = crate::core::variable::VariableSet::new();
    ctx.items.extract_variables(id, &mut vars);
    bi.set_variables(vars);
    let tool = xform
        .find_tool_by_tag(&ctx.tools, "codegen_binary_cstring", "")
        .ok_or_else(|| {
            BuildError::NoTool("no codegen_binary_cstring tool is registered".into())
        })?;
    bi.set_tool(&ctx.tools, tool)?;
    bi.set_out_dir(out_dir.clone());
    bi.set_outputs(vec![name.to_owned()]);
    let group = xform.builds.add(bi);

    let mut codegen_info = Vec::new();
    if payload.comma_separate {
        codegen_info.push("-comma".to_owned());
    }
    let mut side_dir = out_dir.clone();
    side_dir.cd(".codegen")?;
    let indent_lines = payload.item_indent.clone().map(|i| vec![i]);
    let entries: [(&str, Option<&Vec<String>>); 5] = [
        ("file_prefix", some_nonempty(&payload.file_prefix)),
        ("file_suffix", some_nonempty(&payload.file_suffix)),
        ("item_prefix", some_nonempty(&payload.item_prefix)),
        ("item_suffix", some_nonempty(&payload.item_suffix)),
        ("item_indent", indent_lines.as_ref()),
    ];
    for (tag, lines) in entries {
        let Some(lines) = lines else { continue };
        let side_name = format!("{tag}_{name}");
        side_dir.update_if_different(&side_name, lines)?;
        let mut inp = BuildItem::new(side_name.clone(), side_dir.clone());
        inp.set_use_name(false);
        inp.set_out_dir(side_dir.clone());
        inp.set_outputs(vec![side_name.clone()]);
        let inp = xform.builds.add(inp);
        xform.builds.add_dependency(group, DepKind::Implicit, inp)?;
        xform.builds.get_mut(inp).mark_dependent();
        codegen_info.push(format!("-{tag}"));
        codegen_info.push(side_dir.makefilename(&side_name));
    }
    xform
        .builds
        .get_mut(group)
        .set_variable("codegen_info", codegen_info);

    // inputs stay plain file references: transforming them would lower a
    // .cpp we intend to embed into a .o
    for child in &payload.children {
        let (cname, cdir) = {
            let c = ctx.items.get(*child);
            (c.name().to_owned(), c.dir().clone())
        };
        let mut inp = BuildItem::new(cname.clone(), cdir.clone());
        inp.set_use_name(false);
        inp.set_out_dir(cdir);
        inp.set_outputs(vec![cname]);
        let inp = xform.builds.add(inp);
        xform.builds.add_dependency(group, DepKind::Explicit, inp)?;
        xform.builds.get_mut(inp).mark_dependent();
    }
    Ok(group)
}

fn some_nonempty(v: &Vec<String>) -> Option<&Vec<String>> {
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

#[allow(clippy::too_many_arguments)]
fn transform_code_filter(
    ctx: &mut Context,
    xform: &mut TransformSet,
    id: ItemId,
    name: &str,
    dir: &Directory,
    children: &[ItemId],
    tool: Option<crate::core::tool::ToolId>,
    outputs: &[String],
) -> Result<BuildId> {
    tracing::debug!("transform code filter {name}");
    let mut bi = BuildItem::new(name, dir.clone());
    bi.set_use_name(false);
    let mut vars = crate::core::variable::VariableSet::new();
    ctx.items.extract_variables(id, &mut vars);
    bi.set_variables(vars);
    let group = xform.builds.add(bi);

    if let Some(tool) = tool {
        if let Some(gen_exe) = ctx.tools.get(tool).generated_exe() {
            let exe_bi = transform_item(ctx, gen_exe, xform)?;
            xform.builds.add_dependency(group, DepKind::Implicit, exe_bi)?;
            xform.builds.get_mut(exe_bi).mark_dependent();
        }
        for child in children {
            let (cname, cdir) = {
                let c = ctx.items.get(*child);
                (c.name().to_owned(), c.dir().clone())
            };
            let mut inp = BuildItem::new(cname.clone(), cdir.clone());
            inp.set_use_name(false);
            inp.set_out_dir(cdir);
            inp.set_outputs(vec![cname]);
            let inp = xform.builds.add(inp);
            xform.builds.add_dependency(group, DepKind::Explicit, inp)?;
            xform.builds.get_mut(inp).mark_dependent();
        }
        let out_dir = dir.reroot(xform.artifact_dir());
        let g = xform.builds.get_mut(group);
        g.set_tool(&ctx.tools, tool)?;
        g.set_out_dir(out_dir.clone());
        g.set_variable("current_output_dir", [out_dir.fullpath()]);
        g.set_outputs(outputs.to_vec());
    }
    Ok(group)
}

fn transform_create_file(
    _ctx: &mut Context,
    xform: &mut TransformSet,
    name: &str,
    dir: &Directory,
    lines: &[String],
) -> Result<BuildId> {
    tracing::debug!("transform create file {name}");
    let out_dir = dir.reroot(xform.artifact_dir());
    out_dir.update_if_different(name, lines)?;
    let mut bi = BuildItem::new(name, dir.clone());
    bi.set_out_dir(out_dir);
    bi.set_outputs(vec![name.to_owned()]);
    Ok(xform.builds.add(bi))
}

fn transform_optional(
    ctx: &mut Context,
    xform: &mut TransformSet,
    _id: ItemId,
    name: &str,
    dir: &Directory,
    payload: &OptionalPayload,
) -> Result<BuildId> {
    let mut bi = BuildItem::new(name, dir.clone());
    bi.set_use_name(false);
    bi.set_out_dir(xform.out_dir().clone());
    let group = xform.builds.add(bi);

    if matches(payload, xform) {
        tracing::debug!("transform enabled {name}");
        let mut ok = true;
        let mut extras = Vec::new();
        let system = xform.system().to_owned();
        let lib_path = xform.lib_search_path().to_vec();
        let pkg_path = xform.pkg_search_path().to_vec();
        for (lib, version) in &payload.extern_libs {
            match ctx.find_package(&system, lib, version, &lib_path, &pkg_path)? {
                Some(elib) => extras.push(elib),
                None => {
                    tracing::warn!(
                        "unable to find external library '{}' (version: {}) for system {}",
                        lib,
                        if version.is_empty() { "<any>" } else { version },
                        system
                    );
                    ok = false;
                }
            }
        }

        if ok {
            if !payload.defines.is_empty() {
                xform
                    .builds
                    .get_mut(group)
                    .set_variable("defines", payload.defines.clone());
            }
            let (chain, accum) = fill_build_item(ctx, xform, group, &payload.children, &extras)?;
            // surface library flags so an enclosing target absorbs them
            {
                let g = xform.builds.get_mut(group);
                g.add_to_variable("cflags", &accum.cflags);
                g.add_to_variable("ldflags", &accum.ldflags);
                g.add_to_variable("libs", &accum.libs);
                g.add_to_variable("libdirs", &accum.libdirs);
            }
            xform.record_chain_info(group, chain);
        } else if payload.required {
            return Err(BuildError::State(format!(
                "unable to resolve external libraries required by '{name}'"
            ))
            .into());
        } else {
            xform.record_chain_info(group, ChainInfo::default());
        }
    } else {
        xform.record_chain_info(group, ChainInfo::default());
    }
    Ok(group)
}

fn matches(payload: &OptionalPayload, xform: &TransformSet) -> bool {
    payload
        .conditions
        .iter()
        .all(|(tag, val)| match tag.as_str() {
            "system" => xform.system() == val,
            _ => false,
        })
}

fn transform_package(
    ctx: &mut Context,
    xform: &mut TransformSet,
    id: ItemId,
    name: &str,
    dir: &Directory,
    pc_file: Option<&str>,
) -> Result<BuildId> {
    tracing::debug!("transform package {name}");
    let mut bi = match pc_file {
        Some(pf) => {
            let mut b = BuildItem::new(name, Directory::current());
            b.add_external_output(pf);
            b
        }
        None => BuildItem::new(name, dir.clone()),
    };
    bi.set_use_name(false);

    let item = ctx.items.get(id);
    if let Some(v) = item.variable("cflags") {
        bi.add_to_variable("cflags", v);
    }
    // pkg-config `Libs` content is linker input
    if let Some(v) = item.variable("libs") {
        bi.add_to_variable("ldflags", v);
    }
    if let Some(v) = item.variable("ldflags") {
        bi.add_to_variable("ldflags", v);
    }
    if pc_file.is_none() {
        if let Some(v) = item.variable("libdirs") {
            bi.add_to_variable("libdirs", v);
        }
        if let Some(v) = item.variable("includes") {
            bi.add_to_variable("includes", v);
        }
    }
    Ok(xform.builds.add(bi))
}
