//! End-to-end transform scenarios: project descriptions driven through the
//! binding surface, lowered under a configuration, and checked against the
//! resulting build graph.

use std::fs;

use serde_json::json;
use tempfile::TempDir;

use slipway::core::dependency::DepKind;
use slipway::core::item::ItemKind;
use slipway::script::{BuildApi, OptionalSpec};
use slipway::transform::build_item::BuildId;
use slipway::transform::{lower, TransformSet};
use slipway::util::paths::Directory;
use slipway::Context;

fn api_in(tmp: &TempDir) -> BuildApi {
    BuildApi::new(Context::bare(Directory::from_root(
        tmp.path().to_string_lossy(),
    )))
}

/// Register a small deterministic C toolchain (no host probing).
fn add_c_toolchain(api: &mut BuildApi) {
    api.add_toolset("testgcc").unwrap();
    api.tag("compile").unwrap();
    let tools = [
        json!({
            "tag": "cc", "name": "gcc", "exe": "/opt/bin/gcc",
            "input_extensions": [".c"], "output_extensions": [".o"],
            "flag_prefixes": {"includes": "-I", "defines": "-D", "libdirs": "-L", "libs": "-l"},
            "cmd": ["$exe", "$cflags", "$defines", "$includes", "-c", "-o", "$out", "$in"]
        }),
        json!({
            "tag": "ld", "name": "gcc_linker", "exe": "/opt/bin/gcc",
            "input_tools": ["cc", "static_lib", "dynamic_lib"],
            "flag_prefixes": {"libdirs": "-L", "libs": "-l"},
            "cmd": ["$exe", "-o", "$out", "$in", "$ldflags", "$libdirs", "$libs"]
        }),
        json!({
            "tag": "ld_cxx", "name": "g++_linker", "exe": "/opt/bin/g++",
            "input_tools": ["cc", "cxx", "static_lib", "dynamic_lib"],
            "cmd": ["$exe", "-o", "$out", "$in", "$ldflags", "$libdirs", "$libs"]
        }),
        json!({
            "tag": "static_lib", "name": "ar", "exe": "/usr/bin/ar",
            "input_tools": ["cc", "cxx"],
            "output_extensions": [".a"], "output_prefix": "lib",
            "cmd": ["$exe", "rcs", "$out", "$in"]
        }),
    ];
    for t in tools {
        api.add_tool(serde_json::from_value(t).unwrap()).unwrap();
    }
    api.use_toolset("testgcc").unwrap();
}

fn default_config(api: &mut BuildApi) {
    api.configuration("test").unwrap();
    api.default_configuration("test").unwrap();
}

fn transform(api: &mut BuildApi, out: &TempDir) -> TransformSet {
    let (system, pseudo) = {
        let host = api.ctx.host_system().to_owned();
        let conf = api.ctx.configs.default().unwrap();
        (conf.system(&host).to_owned(), conf.pseudo_scope())
    };
    let mut xform = TransformSet::new(
        Directory::from_root(out.path().to_string_lossy()),
        system,
    );
    let root = api.ctx.scopes.root();
    lower::transform_scope(&mut api.ctx, root, Some(pseudo), &mut xform).unwrap();
    xform
}

fn find_build(xform: &TransformSet, name: &str) -> Option<BuildId> {
    xform.builds.ids().find(|id| xform.builds.get(*id).name() == name)
}

fn tool_tag(api: &BuildApi, xform: &TransformSet, id: BuildId) -> String {
    let tool = xform.builds.get(id).tool().expect("build item has a tool");
    api.ctx.tools.get(tool).tag().to_owned()
}

#[test]
fn basic_c_executable() {
    let tmp = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    fs::write(tmp.path().join("hello.c"), "int main(){return 0;}\n").unwrap();

    let mut api = api_in(&tmp);
    add_c_toolchain(&mut api);
    default_config(&mut api);
    let exe = api.executable("hello").unwrap();
    api.target_add(exe, "hello.c").unwrap();
    api.finish_target(exe).unwrap();

    let xform = transform(&mut api, &out);

    // the compile step: hello.c -> hello.o via cc
    let compile = find_build(&xform, "hello.c").unwrap();
    assert_eq!(tool_tag(&api, &xform, compile), "cc");
    assert_eq!(xform.builds.get(compile).outputs(), ["hello.o"]);

    // the link step: hello <- hello.o via ld
    let link = find_build(&xform, "hello").unwrap();
    assert_eq!(tool_tag(&api, &xform, link), "ld");
    let explicit = xform.builds.extract_dependencies(link, DepKind::Explicit);
    assert_eq!(explicit.len(), 1);
    assert_eq!(xform.builds.get(explicit[0]).outputs(), ["hello.o"]);

    let link_bi = xform.builds.get(link);
    assert!(link_bi.is_top_level());
    assert!(link_bi.is_default_target());
    assert!(link_bi
        .output_paths()
        .iter()
        .all(|p| p.contains("/bin/")));
}

#[test]
fn library_dependency_flattening() {
    let tmp = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.c"), "int a;\n").unwrap();
    fs::write(tmp.path().join("main.c"), "int main(){}\n").unwrap();

    let mut api = api_in(&tmp);
    add_c_toolchain(&mut api);
    default_config(&mut api);

    let la = api.library("la").unwrap();
    api.kind(la, "static").unwrap();
    api.target_add(la, "a.c").unwrap();
    api.finish_target(la).unwrap();

    let app = api.executable("app").unwrap();
    api.target_add(app, "main.c").unwrap();
    api.libs(app, &["la".to_owned()]).unwrap();
    api.finish_target(app).unwrap();

    let xform = transform(&mut api, &out);

    let la_bi = find_build(&xform, "la").unwrap();
    assert_eq!(tool_tag(&api, &xform, la_bi), "static_lib");
    assert_eq!(xform.builds.get(la_bi).outputs(), ["libla.a"]);

    let app_bi = find_build(&xform, "app").unwrap();
    // linked with the C driver, not the C++ one
    assert_eq!(tool_tag(&api, &xform, app_bi), "ld");
    let implicit = xform.builds.extract_dependencies(app_bi, DepKind::Implicit);
    assert_eq!(implicit, vec![la_bi]);

    let app_item = xform.builds.get(app_bi);
    assert_eq!(app_item.variable("libs").unwrap().values(), ["la"]);
    assert_eq!(
        app_item.variable("libdirs").unwrap().values(),
        [xform.lib_dir().fullpath()]
    );
}

#[test]
fn chain_rule_yacc_to_object() {
    let tmp = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    fs::write(tmp.path().join("parse.y"), "%%\n").unwrap();

    let mut api = api_in(&tmp);
    add_c_toolchain(&mut api);
    api.add_tool(
        serde_json::from_value(json!({
            "tag": "yacc", "name": "bison", "exe": "/usr/bin/bison",
            "input_extensions": [".y"], "output_extensions": [".c"],
            "cmd": ["$exe", "-o", "$out", "$in"]
        }))
        .unwrap(),
    )
    .unwrap();
    default_config(&mut api);

    let dir = api.ctx.dirs.current().clone();
    let src = api
        .ctx
        .items
        .add("parse.y", dir, ItemKind::Source)
        .unwrap();
    let scope = api.ctx.current_scope();
    api.ctx.scopes.get_mut(scope).add_item(src);

    let xform = transform(&mut api, &out);

    let y = find_build(&xform, "parse.y").unwrap();
    let c = find_build(&xform, "parse.c").unwrap();
    let o = find_build(&xform, "parse.o").unwrap();
    assert_eq!(tool_tag(&api, &xform, y), "yacc");
    assert_eq!(tool_tag(&api, &xform, c), "cc");
    assert!(xform.builds.get(o).tool().is_none());

    // each later stage depends explicitly on its predecessor
    assert_eq!(xform.builds.get(c).deps()[&y], DepKind::Explicit);
    assert_eq!(xform.builds.get(o).deps()[&c], DepKind::Explicit);

    // intermediates land under the artifact dir
    assert!(xform
        .builds
        .get(c)
        .out_dir()
        .fullpath()
        .contains("/artifacts"));
}

#[test]
fn optional_source_skipped_by_system() {
    let tmp = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    fs::write(tmp.path().join("main.c"), "int main(){}\n").unwrap();
    fs::write(tmp.path().join("linux_only.c"), "int l;\n").unwrap();

    let mut api = api_in(&tmp);
    add_c_toolchain(&mut api);
    api.configuration("cross").unwrap();
    api.system("Darwin").unwrap();
    api.default_configuration("cross").unwrap();

    let exe = api.executable("app").unwrap();
    api.target_add(exe, "main.c").unwrap();
    let opt = api
        .optional_source(OptionalSpec {
            system: Some("Linux".to_owned()),
            source: vec!["linux_only.c".to_owned()],
            defines: vec!["HAVE_LINUX".to_owned()],
            ..OptionalSpec::default()
        })
        .unwrap();
    api.target_add_item(exe, opt).unwrap();
    api.finish_target(exe).unwrap();

    let xform = transform(&mut api, &out);
    assert_eq!(xform.system(), "Darwin");

    // the guarded source never lowers
    assert!(find_build(&xform, "linux_only.c").is_none());

    // and its define reaches no compile step
    for id in xform.builds.ids() {
        if let Some(v) = xform.builds.get(id).variable("defines") {
            assert!(!v.values().contains(&"HAVE_LINUX".to_owned()));
        }
    }
}

#[test]
fn optional_source_included_on_matching_system() {
    let tmp = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    fs::write(tmp.path().join("main.c"), "int main(){}\n").unwrap();
    fs::write(tmp.path().join("linux_only.c"), "int l;\n").unwrap();

    let mut api = api_in(&tmp);
    add_c_toolchain(&mut api);
    api.configuration("native").unwrap();
    api.system("Linux").unwrap();
    api.default_configuration("native").unwrap();

    let exe = api.executable("app").unwrap();
    api.target_add(exe, "main.c").unwrap();
    let opt = api
        .optional_source(OptionalSpec {
            system: Some("Linux".to_owned()),
            source: vec!["linux_only.c".to_owned()],
            defines: vec!["HAVE_LINUX".to_owned()],
            ..OptionalSpec::default()
        })
        .unwrap();
    api.target_add_item(exe, opt).unwrap();
    api.finish_target(exe).unwrap();

    let xform = transform(&mut api, &out);

    let guarded = find_build(&xform, "linux_only.c").unwrap();
    assert_eq!(tool_tag(&api, &xform, guarded), "cc");
    let defines = xform.builds.get(guarded).variable("defines").unwrap();
    assert!(defines.values().contains(&"HAVE_LINUX".to_owned()));

    // the executable links both objects
    let app = find_build(&xform, "app").unwrap();
    let explicit = xform.builds.extract_dependencies(app, DepKind::Explicit);
    let outs: Vec<String> = explicit
        .iter()
        .flat_map(|d| xform.builds.get(*d).outputs().to_vec())
        .collect();
    assert!(outs.contains(&"main.o".to_owned()));
    assert!(outs.contains(&"linux_only.o".to_owned()));
}

#[test]
fn external_package_resolution_flows_to_executable() {
    let tmp = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let pkgdir = tmp.path().join("pc");
    fs::create_dir(&pkgdir).unwrap();
    fs::write(
        pkgdir.join("foo.pc"),
        "prefix=/opt/foo\nName: foo\nVersion: 1.2.3\nRequires: bar >= 2.0\nLibs: -L${prefix}/lib -lfoo\nCflags: -I${prefix}/include\n",
    )
    .unwrap();
    fs::write(pkgdir.join("bar.pc"), "Name: bar\nVersion: 2.1\n").unwrap();
    fs::write(tmp.path().join("main.c"), "int main(){}\n").unwrap();

    let mut api = api_in(&tmp);
    add_c_toolchain(&mut api);
    // search paths ride on an active toolset
    api.add_toolset("pkgs").unwrap();
    api.tag("packages").unwrap();
    api.pkg_search_path(&pkgdir.to_string_lossy()).unwrap();
    api.use_toolset("pkgs").unwrap();

    api.configuration("probe").unwrap();
    api.system("TestOS").unwrap();
    api.default_configuration("probe").unwrap();

    let exe = api.executable("app").unwrap();
    api.target_add(exe, "main.c").unwrap();
    let ext = api
        .external_lib(OptionalSpec {
            libs: vec![("foo".to_owned(), ">= 1.0".to_owned())],
            required: true,
            ..OptionalSpec::default()
        })
        .unwrap();
    api.target_add_item(exe, ext).unwrap();
    api.finish_target(exe).unwrap();

    let xform = transform(&mut api, &out);

    let app = find_build(&xform, "app").unwrap();
    let ldflags = xform.builds.get(app).variable("ldflags").unwrap();
    assert_eq!(ldflags.values(), ["-L/opt/foo/lib", "-lfoo"]);

    // the requires chain landed in the item graph
    let foo = api.ctx.items.find_by_name("foo").unwrap();
    let bar = api.ctx.items.find_by_name("bar").unwrap();
    assert_eq!(api.ctx.items.get(foo).deps()[&bar], DepKind::Explicit);
    let cflags = api.ctx.items.get(foo).variable("cflags").unwrap();
    assert_eq!(cflags.values(), ["-I/opt/foo/include"]);
}

#[test]
fn external_package_version_failure_aborts_required() {
    let tmp = TempDir::new().unwrap();
    let pkgdir = tmp.path().join("pc");
    fs::create_dir(&pkgdir).unwrap();
    fs::write(pkgdir.join("foo.pc"), "Name: foo\nVersion: 0.9\n").unwrap();
    fs::write(tmp.path().join("main.c"), "int main(){}\n").unwrap();

    let mut api = api_in(&tmp);
    add_c_toolchain(&mut api);
    api.add_toolset("pkgs").unwrap();
    api.tag("packages").unwrap();
    api.pkg_search_path(&pkgdir.to_string_lossy()).unwrap();
    api.use_toolset("pkgs").unwrap();

    api.configuration("probe").unwrap();
    api.system("TestOS").unwrap();
    api.default_configuration("probe").unwrap();

    let exe = api.executable("app").unwrap();
    api.target_add(exe, "main.c").unwrap();
    let ext = api
        .external_lib(OptionalSpec {
            libs: vec![("foo".to_owned(), ">= 1.0".to_owned())],
            required: true,
            ..OptionalSpec::default()
        })
        .unwrap();
    api.target_add_item(exe, ext).unwrap();
    api.finish_target(exe).unwrap();

    let (system, pseudo) = {
        let host = api.ctx.host_system().to_owned();
        let conf = api.ctx.configs.default().unwrap();
        (conf.system(&host).to_owned(), conf.pseudo_scope())
    };
    let out = TempDir::new().unwrap();
    let mut xform = TransformSet::new(
        Directory::from_root(out.path().to_string_lossy()),
        system,
    );
    let root = api.ctx.scopes.root();
    let err = lower::transform_scope(&mut api.ctx, root, Some(pseudo), &mut xform).unwrap_err();
    assert!(format!("{err:#}").contains("external libraries"));
}

#[test]
fn create_file_materializes_and_compiles() {
    let tmp = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let mut api = api_in(&tmp);
    add_c_toolchain(&mut api);
    default_config(&mut api);

    let created = api
        .code_create(
            "version.c",
            vec!["const char *version = \"1.0\";".to_owned()],
        )
        .unwrap();

    let exe = api.executable("app").unwrap();
    api.target_add_item(exe, created).unwrap();
    api.finish_target(exe).unwrap();

    let xform = transform(&mut api, &out);

    // the file exists on disk with the literal content
    let created_bi = find_build(&xform, "version.c").unwrap();
    let path = xform.builds.get(created_bi).output_paths()[0].clone();
    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content, "const char *version = \"1.0\";\n");

    // and it chains through cc into the executable
    let compile = xform
        .builds
        .ids()
        .find(|id| {
            xform.builds.get(*id).name() == "version.c"
                && xform.builds.get(*id).tool().is_some()
        })
        .unwrap();
    assert_eq!(tool_tag(&api, &xform, compile), "cc");
    let app = find_build(&xform, "app").unwrap();
    let explicit = xform.builds.extract_dependencies(app, DepKind::Explicit);
    assert!(explicit
        .iter()
        .any(|d| xform.builds.get(*d).outputs() == ["version.o"]));
}

#[test]
fn memoized_transform_is_stable() {
    let tmp = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    fs::write(tmp.path().join("hello.c"), "int main(){}\n").unwrap();

    let mut api = api_in(&tmp);
    add_c_toolchain(&mut api);
    default_config(&mut api);
    let exe = api.executable("hello").unwrap();
    api.target_add(exe, "hello.c").unwrap();
    api.finish_target(exe).unwrap();

    let (system, pseudo) = {
        let host = api.ctx.host_system().to_owned();
        let conf = api.ctx.configs.default().unwrap();
        (conf.system(&host).to_owned(), conf.pseudo_scope())
    };
    let mut xform = TransformSet::new(
        Directory::from_root(out.path().to_string_lossy()),
        system,
    );
    let root = api.ctx.scopes.root();
    lower::transform_scope(&mut api.ctx, root, Some(pseudo), &mut xform).unwrap();

    let before = xform.builds.len();
    let a = lower::transform_item(&mut api.ctx, exe, &mut xform).unwrap();
    let b = lower::transform_item(&mut api.ctx, exe, &mut xform).unwrap();
    assert_eq!(a, b);
    assert_eq!(xform.builds.len(), before);
}

#[test]
fn configuration_options_reach_rules() {
    let tmp = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    fs::write(tmp.path().join("hello.c"), "int main(){}\n").unwrap();

    let mut api = api_in(&tmp);
    api.add_toolset("testgcc").unwrap();
    api.tag("compile").unwrap();
    api.add_tool(
        serde_json::from_value(json!({
            "tag": "cc", "name": "gcc", "exe": "/opt/bin/gcc",
            "input_extensions": [".c"], "output_extensions": [".o"],
            "options": {"optimization": {"opt": ["-O3"], "debug": ["-O0", "-g"]}},
            "option_defaults": {"optimization": "opt"},
            "cmd": ["$exe", "$optimization", "-c", "-o", "$out", "$in"]
        }))
        .unwrap(),
    )
    .unwrap();
    api.add_tool(
        serde_json::from_value(json!({
            "tag": "ld", "name": "gcc_linker", "exe": "/opt/bin/gcc",
            "input_tools": ["cc"],
            "cmd": ["$exe", "-o", "$out", "$in"]
        }))
        .unwrap(),
    )
    .unwrap();
    api.use_toolset("testgcc").unwrap();

    // the debug configuration flips the optimization option
    api.configuration("debug").unwrap();
    api.set_option("optimization", "debug");
    api.configuration("release").unwrap();
    api.default_configuration("debug").unwrap();

    let exe = api.executable("hello").unwrap();
    api.target_add(exe, "hello.c").unwrap();
    api.finish_target(exe).unwrap();

    let xform = transform(&mut api, &out);
    assert_eq!(xform.option_value("optimization"), "debug");

    let cc = xform
        .tools()
        .iter()
        .copied()
        .find(|t| api.ctx.tools.get(*t).tag() == "cc")
        .unwrap();
    let rule = slipway::generator::rule::rule_for_tool(&api.ctx, &xform, cc).unwrap();
    assert_eq!(
        rule.defaults,
        vec![("cc_optimization".to_owned(), "-O0 -g".to_owned())]
    );
}
