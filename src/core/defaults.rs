//! Default toolsets.
//!
//! Probes the host for the common C/C++ toolchains (gcc, clang, ar) and
//! registers them on the root scope, along with the self-hosted
//! binary-to-C-string code generator. Projects can still define or replace
//! tools explicitly.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::core::context::Context;
use crate::core::error::BuildError;
use crate::core::tool::{ImplicitDeps, OptionSet, Tool, ToolExe};
use crate::core::toolset::{Toolset, ToolsetId};

fn option_set(choices: &[(&str, &[&str])]) -> OptionSet {
    choices
        .iter()
        .map(|(name, toks)| {
            (
                (*name).to_owned(),
                toks.iter().map(|t| (*t).to_owned()).collect(),
            )
        })
        .collect()
}

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

fn strings(toks: &[&str]) -> Vec<String> {
    toks.iter().map(|t| (*t).to_owned()).collect()
}

fn common_options() -> BTreeMap<String, OptionSet> {
    let mut groups = BTreeMap::new();
    groups.insert(
        "optimization".to_owned(),
        option_set(&[
            ("debug", &["-O0", "-g"][..]),
            ("heavy", &["-O3", "-flto"]),
            ("opt", &["-O3"]),
            ("size", &["-Os"]),
            ("optdebug", &["-g", "-O3"]),
        ]),
    );
    groups.insert(
        "threads".to_owned(),
        option_set(&[("on", &["-pthread"][..]), ("off", &[])]),
    );
    groups.insert(
        "vectorize".to_owned(),
        option_set(&[
            ("none", &[][..]),
            ("SSE", &["-msse"]),
            ("SSE2", &["-msse2"]),
            ("SSE3", &["-msse3", "-mtune=core2"]),
            ("SSE4", &["-msse4", "-mtune=nehalem"]),
            ("AVX", &["-mavx", "-mtune=intel"]),
            ("AVX2", &["-mavx2", "-mtune=intel"]),
            ("AVX512", &["-mavx512", "-mtune=intel"]),
            ("native", &["-mtune=native", "-march=native"]),
        ]),
    );
    groups
}

fn c_languages() -> OptionSet {
    option_set(&[
        ("C", &[][..]),
        ("C99", &["-std=c99"]),
        ("C11", &["-std=c11"]),
    ])
}

fn cxx_languages() -> OptionSet {
    option_set(&[
        ("c++", &["-x", "c++"][..]),
        ("c++11", &["-x", "c++", "-std=c++11"]),
        ("c++14", &["-x", "c++", "-std=c++14"]),
        ("c++17", &["-x", "c++", "-std=c++17"]),
    ])
}

fn cxx_link_languages() -> OptionSet {
    option_set(&[
        ("c++", &[][..]),
        ("c++11", &["-std=c++11"]),
        ("c++14", &["-std=c++14"]),
        ("c++17", &["-std=c++17"]),
    ])
}

fn c_defaults() -> BTreeMap<String, String> {
    string_map(&[
        ("optimization", "opt"),
        ("warnings", "default"),
        ("language", "C"),
        ("threads", "off"),
        ("vectorize", "none"),
    ])
}

fn cxx_defaults() -> BTreeMap<String, String> {
    string_map(&[
        ("optimization", "opt"),
        ("warnings", "default"),
        ("language", "c++"),
        ("threads", "off"),
        ("vectorize", "none"),
    ])
}

fn var_prefixes() -> BTreeMap<String, String> {
    string_map(&[
        ("includes", "-I"),
        ("defines", "-D"),
        ("libdirs", "-L"),
        ("libs", "-l"),
    ])
}

fn compile_cmd() -> Vec<String> {
    strings(&[
        "$exe", "$threads", "$language", "$optimization", "$warnings", "$vectorize", "$cflags",
        "$defines", "$includes", "-pipe", "-c", "-o", "$out", "$in",
    ])
}

fn link_cmd() -> Vec<String> {
    strings(&[
        "$exe", "$threads", "$language", "$optimization", "$vectorize", "$cflags", "-pipe", "-o",
        "$out", "$in", "$ldflags", "$libdirs", "$libs",
    ])
}

fn c_link_input_tools() -> Vec<String> {
    strings(&["cc", "static_lib", "dynamic_lib"])
}

fn cxx_link_input_tools() -> Vec<String> {
    strings(&[
        "cc",
        "cxx",
        "objcxx",
        "static_lib",
        "static_lib_cxx",
        "dynamic_lib",
        "dynamic_lib_cxx",
    ])
}

fn gcc_dep_sidecar() -> ImplicitDeps {
    ImplicitDeps {
        file: "$out.d".to_owned(),
        style: "gcc".to_owned(),
        flags: strings(&["-MMD", "-MF", "$out.d"]),
    }
}

/// The names of the option groups projects can set per scope or per item.
pub fn option_names() -> &'static [&'static str] {
    &["warnings", "optimization", "language", "threads", "vectorize"]
}

/// Probe for compilers and register default toolsets on the root scope.
pub fn register(ctx: &mut Context) -> Result<()> {
    if ctx.sysinfo.system == "Windows" {
        return Err(BuildError::State(
            "default tools are not implemented for Windows; define a toolset explicitly".into(),
        )
        .into());
    }

    let exes = ctx
        .exe_search
        .find_all(&["clang", "clang++", "gcc", "g++", "ar"]);
    let exe = |n: &str| -> Option<String> {
        exes.get(n).map(|p| p.to_string_lossy().into_owned())
    };

    let gcc_ts = add_compiler_family(ctx, "gcc", exe("gcc"), exe("g++"))?;
    let clang_ts = add_compiler_family(ctx, "clang", exe("clang"), exe("clang++"))?;

    // clang leads on Darwin, gcc elsewhere
    let preferred = if ctx.sysinfo.system == "Darwin" {
        clang_ts.or(gcc_ts)
    } else {
        gcc_ts.or(clang_ts)
    };
    let root = ctx.scopes.root();
    if let Some(ts) = preferred {
        let name = ctx.toolsets.get(ts).name().to_owned();
        ctx.scopes.get_mut(root).use_toolset(&ctx.toolsets, &name)?;
    }

    if let Some(ar) = exe("ar") {
        let ats = add_archiver(ctx, &ar)?;
        let name = ctx.toolsets.get(ats).name().to_owned();
        ctx.scopes.get_mut(root).use_toolset(&ctx.toolsets, &name)?;
    }

    add_self_generator(ctx);
    Ok(())
}

/// Register the cc/cxx/ld/ld_cxx/dynamic_lib tools of one compiler family
/// as a toolset tagged `compile`.
fn add_compiler_family(
    ctx: &mut Context,
    family: &str,
    cc_exe: Option<String>,
    cxx_exe: Option<String>,
) -> Result<Option<ToolsetId>> {
    let warnings = if family == "clang" {
        option_set(&[
            ("none", &["-w"][..]),
            ("default", &[]),
            ("some", &["-Wall"]),
            ("most", &["-Weverything", "-Wno-padded"]),
            ("strict", &["-Weverything"]),
            ("error", &["-Wall", "-Werror"]),
        ])
    } else {
        option_set(&[
            ("none", &["-w"][..]),
            ("default", &[]),
            ("some", &["-Wall"]),
            ("most", &["-Wall", "-Wextra", "-Wno-unused-parameter"]),
            ("strict", &["-Wall", "-Wextra"]),
            ("error", &["-Wall", "-Werror"]),
        ])
    };

    let mut ts = Toolset::new(family);
    ts.set_tag("compile");
    let mut any = false;
    let mut tool_ids = Vec::new();

    if let Some(exe) = cc_exe {
        let cc_name = if family == "clang" { "clang" } else { "gcc" };
        let mut t = Tool::new("cc", cc_name);
        t.set_exe(ToolExe::Path(exe.clone()));
        t.set_extensions(vec![".c".into()]);
        t.set_outputs(vec![".o".into()]);
        let mut opts = common_options();
        opts.insert("warnings".to_owned(), warnings.clone());
        opts.insert("language".to_owned(), c_languages());
        t.set_options(opts);
        t.set_option_defaults(c_defaults());
        t.set_implicit_deps(gcc_dep_sidecar());
        t.set_flag_prefixes(var_prefixes());
        t.set_description(" CC $out_short");
        t.set_command(compile_cmd());
        tool_ids.push(ctx.tools.add(t));

        let mut ld = Tool::new("ld", format!("{cc_name}_linker"));
        ld.set_exe(ToolExe::Path(exe.clone()));
        ld.set_input_tools(c_link_input_tools());
        let mut opts = common_options();
        opts.insert("language".to_owned(), c_languages());
        ld.set_options(opts);
        ld.set_option_defaults(c_defaults());
        ld.set_flag_prefixes(var_prefixes());
        ld.set_description(" LD $out_short");
        ld.set_command(link_cmd());
        tool_ids.push(ctx.tools.add(ld));

        let mut dyn_lib = Tool::new("dynamic_lib", format!("{cc_name}_shared"));
        dyn_lib.set_exe(ToolExe::Path(exe));
        dyn_lib.set_input_tools(c_link_input_tools());
        dyn_lib.set_outputs(vec![".so".into()]);
        dyn_lib.set_output_prefix("lib");
        dyn_lib.set_flag_prefixes(var_prefixes());
        dyn_lib.set_description("DYLIB $out_short");
        dyn_lib.set_command(strings(&[
            "$exe", "-shared", "-o", "$out", "$in", "$ldflags", "$libdirs", "$libs",
        ]));
        tool_ids.push(ctx.tools.add(dyn_lib));
        any = true;
    }

    if let Some(exe) = cxx_exe {
        let cxx_name = if family == "clang" { "clang++" } else { "g++" };
        let mut t = Tool::new("cxx", cxx_name);
        t.set_exe(ToolExe::Path(exe.clone()));
        t.set_extensions(vec![".cpp".into(), ".cc".into()]);
        t.set_alt_extensions(vec![".c".into(), ".C".into()]);
        t.set_outputs(vec![".o".into()]);
        let mut opts = common_options();
        opts.insert("warnings".to_owned(), warnings.clone());
        opts.insert("language".to_owned(), cxx_languages());
        t.set_options(opts);
        t.set_option_defaults(cxx_defaults());
        t.set_implicit_deps(gcc_dep_sidecar());
        t.set_flag_prefixes(var_prefixes());
        t.set_description("CXX $out_short");
        t.set_command(compile_cmd());
        tool_ids.push(ctx.tools.add(t));

        let mut ld = Tool::new("ld_cxx", format!("{cxx_name}_linker"));
        ld.set_exe(ToolExe::Path(exe));
        ld.set_input_tools(cxx_link_input_tools());
        let mut opts = common_options();
        opts.insert("language".to_owned(), cxx_link_languages());
        ld.set_options(opts);
        ld.set_option_defaults(cxx_defaults());
        ld.set_flag_prefixes(var_prefixes());
        ld.set_description(" LD $out_short");
        ld.set_command(link_cmd());
        tool_ids.push(ctx.tools.add(ld));
        any = true;
    }

    if !any {
        return Ok(None);
    }

    let root = ctx.scopes.root();
    for id in &tool_ids {
        ctx.scopes.get_mut(root).add_tool(&ctx.tools, *id);
        ts.add_tool(&ctx.tools, *id);
    }
    let ts_id = ctx.toolsets.add(ts);
    ctx.scopes.get_mut(root).add_toolset(&ctx.toolsets, ts_id)?;
    Ok(Some(ts_id))
}

/// Register `ar` as the static-library tool in its own toolset.
fn add_archiver(ctx: &mut Context, ar_exe: &str) -> Result<ToolsetId> {
    let mut t = Tool::new("static_lib", "ar");
    t.set_exe(ToolExe::Path(ar_exe.to_owned()));
    t.set_input_tools(strings(&["cc", "cxx", "objcxx"]));
    t.set_outputs(vec![".a".into()]);
    t.set_output_prefix("lib");
    t.set_description("  AR $out_short");
    t.set_command(strings(&["rm", "-f", "$out", "&&", "$exe", "rcs", "$out", "$in"]));
    let id = ctx.tools.add(t);

    let mut ts = Toolset::new("ar");
    ts.set_tag("archive");
    ts.add_tool(&ctx.tools, id);
    let root = ctx.scopes.root();
    ctx.scopes.get_mut(root).add_tool(&ctx.tools, id);
    let ts_id = ctx.toolsets.add(ts);
    ctx.scopes.get_mut(root).add_toolset(&ctx.toolsets, ts_id)?;
    Ok(ts_id)
}

/// The generator binary itself doubles as a build tool.
fn add_self_generator(ctx: &mut Context) {
    let mut t = Tool::new("codegen_binary_cstring", "codegen_binary_cstring");
    t.set_exe(ToolExe::Path(ctx.self_exe.clone()));
    t.set_description("CODEGEN $out_short");
    t.set_command(strings(&[
        "$exe",
        "-embed_binary_cstring",
        "$out",
        "$codegen_info",
        "$in",
    ]));
    let id = ctx.tools.add(t);
    let root = ctx.scopes.root();
    ctx.scopes.get_mut(root).add_tool(&ctx.tools, id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::paths::Directory;

    #[test]
    fn test_register_probes_host_compilers() {
        let mut ctx = Context::bare(Directory::from_root("/tmp"));
        if ctx.sysinfo.system == "Windows" {
            assert!(register(&mut ctx).is_err());
            return;
        }
        register(&mut ctx).unwrap();
        let root = ctx.scopes.root();
        // the self-hosted codegen tool is always present
        let scope = ctx.scopes.get(root);
        assert!(scope
            .tools
            .iter()
            .any(|t| ctx.tools.get(*t).tag() == "codegen_binary_cstring"));
        // if any compiler was found, a compile toolset is enabled
        if scope.tools.iter().any(|t| ctx.tools.get(*t).tag() == "cc") {
            assert!(scope
                .enabled_toolsets
                .iter()
                .any(|ts| ctx.toolsets.get(*ts).tag() == "compile"));
        }
    }

    #[test]
    fn test_cc_tool_shape() {
        let mut ctx = Context::bare(Directory::from_root("/tmp"));
        let ts = add_compiler_family(&mut ctx, "gcc", Some("/usr/bin/gcc".into()), None).unwrap();
        assert!(ts.is_some());
        let root = ctx.scopes.root();
        let cc = ctx
            .scopes
            .get(root)
            .find_tool_for_ext(&ctx.tools, ".c")
            .unwrap();
        let cc = ctx.tools.get(cc);
        assert_eq!(cc.tag(), "cc");
        assert_eq!(cc.outputs_for("x.c"), vec!["x.o"]);
        assert_eq!(cc.default_option("optimization"), Some("opt"));
        assert_eq!(cc.command_prefix("includes"), Some("-I"));
        assert!(cc.implicit_deps().is_some());
    }
}
