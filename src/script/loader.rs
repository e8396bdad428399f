//! The `construct` project-file loader.
//!
//! Project files are a small declarative dialect over the binding surface:
//! one verb per logical line (`\` continues a line, `#` starts a comment
//! line), shell-style tokenization, and at most one brace-delimited JSON
//! table argument per line for the bindings that take structured input.
//!
//! ```text
//! configuration debug
//! set_option optimization debug
//! configuration release
//! default_configuration release
//!
//! library la static a.c
//! executable app main.c la
//! with app include_artifact_dir
//! sub_dir tools
//! ```

use std::fs;

use anyhow::{Context as _, Result};

use crate::core::error::BuildError;
use crate::core::item::ItemId;
use crate::script::api::{BuildApi, CodeFilterSpec, CodeGenSpec, OptionalSpec};
use crate::util::text;

/// Begin parsing at `subdir` (the CLI entry point), loading the `construct`
/// file there, then verify that every named dependency resolved.
pub fn load_project(api: &mut BuildApi, subdir: Option<&str>) -> Result<()> {
    if let Some(d) = subdir {
        api.ctx.dirs.pushd(d)?;
    }
    load_construct(api)?;
    if subdir.is_some() {
        api.ctx.dirs.popd()?;
    }
    api.check_dependencies()
}

/// Load the `construct` file of the current directory.
pub fn load_construct(api: &mut BuildApi) -> Result<()> {
    let path = api.ctx.dirs.current().makefilename("construct");
    let content = fs::read_to_string(&path)
        .with_context(|| format!("unable to read project file '{path}'"))?;

    let mut logical = String::new();
    let mut start_line = 0usize;
    for (n, raw) in content.lines().enumerate() {
        if logical.is_empty() {
            start_line = n + 1;
            if raw.trim_start().starts_with('#') {
                continue;
            }
        }
        let line = raw.trim_end();
        if let Some(stripped) = line.strip_suffix('\\') {
            logical.push_str(stripped);
            logical.push(' ');
            continue;
        }
        logical.push_str(line);
        let finished = std::mem::take(&mut logical);
        if finished.trim().is_empty() {
            continue;
        }
        exec_line(api, &finished)
            .with_context(|| format!("{path}:{start_line}: '{}'", finished.trim()))?;
    }
    Ok(())
}

/// One argument: a plain token or the JSON table.
#[derive(Debug, Clone)]
enum Arg {
    Token(String),
    Table(serde_json::Value),
}

impl Arg {
    fn token(&self) -> Result<&str> {
        match self {
            Arg::Token(t) => Ok(t),
            Arg::Table(_) => {
                Err(BuildError::Malformed("expected a plain argument, found a table".into()).into())
            }
        }
    }
}

fn split_args(line: &str) -> Result<Vec<Arg>> {
    let mut out = Vec::new();
    match line.find('{') {
        None => {
            for t in text::shell_split(line)? {
                out.push(Arg::Token(t));
            }
        }
        Some(start) => {
            let end = start
                + line[start..]
                    .rfind('}')
                    .ok_or_else(|| BuildError::Malformed("unterminated table argument".into()))?;
            for t in text::shell_split(&line[..start])? {
                out.push(Arg::Token(t));
            }
            let table: serde_json::Value = serde_json::from_str(&line[start..=end])
                .map_err(|e| BuildError::Malformed(format!("bad table argument: {e}")))?;
            out.push(Arg::Table(table));
            for t in text::shell_split(&line[end + 1..])? {
                out.push(Arg::Token(t));
            }
        }
    }
    Ok(out)
}

fn parse_bool(s: &str) -> Result<bool> {
    match s {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(BuildError::Malformed(format!("expected a boolean, found '{s}'")).into()),
    }
}

fn table<T: serde::de::DeserializeOwned>(arg: &Arg) -> Result<T> {
    match arg {
        Arg::Table(v) => serde_json::from_value(v.clone())
            .map_err(|e| BuildError::Malformed(format!("bad table argument: {e}")).into()),
        Arg::Token(t) => {
            Err(BuildError::Malformed(format!("expected a table argument, found '{t}'")).into())
        }
    }
}

fn tokens(args: &[Arg]) -> Result<Vec<String>> {
    args.iter().map(|a| a.token().map(str::to_owned)).collect()
}

fn arg(args: &[Arg], i: usize) -> Result<&Arg> {
    args.get(i)
        .ok_or_else(|| BuildError::Malformed(format!("missing argument {}", i + 1)).into())
}

fn slice(args: &[Arg], from: usize) -> &[Arg] {
    args.get(from..).unwrap_or(&[])
}

fn find_item(api: &BuildApi, name: &str) -> Result<ItemId> {
    api.ctx.items.find_by_name(name).ok_or_else(|| {
        BuildError::Malformed(format!("unknown item '{name}'")).into()
    })
}

fn exec_line(api: &mut BuildApi, line: &str) -> Result<()> {
    let args = split_args(line)?;
    let Some((verb, rest)) = args.split_first() else {
        return Ok(());
    };
    let verb = verb.token()?.to_owned();

    match verb.as_str() {
        // configurations
        "configuration" => api.configuration(arg(rest, 0)?.token()?)?,
        "default_configuration" => api.default_configuration(arg(rest, 0)?.token()?)?,
        "system" => api.system(arg(rest, 0)?.token()?)?,
        "skip_on_error" => api.skip_on_error(parse_bool(arg(rest, 0)?.token()?)?)?,

        // variables and options
        "set_option" => api.set_option(arg(rest, 0)?.token()?, arg(rest, 1)?.token()?),
        "optimization" | "warnings" | "language" | "threads" | "vectorize" => {
            api.set_option(&verb, arg(rest, 0)?.token()?);
        }
        "defines" => api.defines(tokens(rest)?),
        "system_defines" => {
            let sys = arg(rest, 0)?.token()?.to_owned();
            api.system_defines(&sys, tokens(slice(rest, 1))?);
        }
        "includes" => api.includes(tokens(rest)?),
        "default_library_kind" => api.default_library_kind(arg(rest, 0)?.token()?)?,
        "default_executable_kind" => api.default_executable_kind(arg(rest, 0)?.token()?),

        // pools and tools
        "pool" => {
            let count = arg(rest, 1)?.token()?;
            let jobs: u32 = count
                .parse()
                .map_err(|_| BuildError::Malformed(format!("bad job count '{count}'")))?;
            api.pool(arg(rest, 0)?.token()?, jobs)?;
        }
        "add_tool" => api.add_tool(table(arg(rest, 0)?)?)?,
        "add_toolset" => api.add_toolset(arg(rest, 0)?.token()?)?,
        "tag" => api.tag(arg(rest, 0)?.token()?)?,
        "toolset_tool" => api.toolset_tool(arg(rest, 0)?.token()?)?,
        "lib_search_path" => api.lib_search_path(arg(rest, 0)?.token()?)?,
        "pkg_search_path" => api.pkg_search_path(arg(rest, 0)?.token()?)?,
        "toolset" | "toolset_active" => api.use_toolset(arg(rest, 0)?.token()?)?,
        "tool_option" => {
            let cmd = tokens(slice(rest, 3))?;
            api.tool_option(arg(rest, 0)?.token()?, arg(rest, 1)?.token()?, arg(rest, 2)?.token()?, cmd)?;
        }

        // targets
        "executable" | "library" => {
            let name = arg(rest, 0)?.token()?.to_owned();
            let mut remaining = slice(rest, 1);
            let target = if verb == "executable" {
                api.executable(&name)?
            } else {
                let t = api.library(&name)?;
                if let Some(Arg::Token(k)) = remaining.first() {
                    if crate::core::item::LibraryKind::parse(k).is_some() {
                        api.kind(t, k)?;
                        remaining = &remaining[1..];
                    }
                }
                t
            };
            for arg in remaining {
                match arg {
                    Arg::Token(t) => api.target_add(target, t)?,
                    Arg::Table(_) => {
                        let child = api.optional_source(table(arg)?)?;
                        api.target_add_item(target, child)?;
                    }
                }
            }
            api.finish_target(target)?;
        }
        "source" => {
            let set = api.source(tokens(rest)?)?;
            let scope = api.ctx.current_scope();
            api.ctx.scopes.get_mut(scope).add_item(set);
        }
        "libs" => {
            let target = find_item(api, arg(rest, 0)?.token()?)?;
            api.libs(target, &tokens(slice(rest, 1))?)?;
        }
        "optional_source" => {
            let id = api.optional_source(table(arg(rest, 0)?)?)?;
            let scope = api.ctx.current_scope();
            api.ctx.scopes.get_mut(scope).add_item(id);
        }
        "external_lib" => {
            let id = api.external_lib(table(arg(rest, 0)?)?)?;
            let scope = api.ctx.current_scope();
            api.ctx.scopes.get_mut(scope).add_item(id);
        }
        "system_libs" => {
            let mut spec: OptionalSpec = table(arg(rest, 0)?)?;
            spec.required = true;
            let id = api.external_lib(spec)?;
            let scope = api.ctx.current_scope();
            api.ctx.scopes.get_mut(scope).add_item(id);
        }
        "required_library" => {
            let ver = rest.get(1).map(|a| a.token()).transpose()?.unwrap_or("");
            api.required_library(arg(rest, 0)?.token()?, ver)?;
        }

        // code generation
        "code_create" => {
            let name = arg(rest, 0)?.token()?.to_owned();
            let lines: Vec<String> = table(arg(rest, 1)?)?;
            api.code_create(&name, lines)?;
        }
        "code_generate" => {
            let spec: CodeGenSpec = table(arg(rest, 0)?)?;
            api.code_generate(spec)?;
        }
        "code_filter" => {
            let spec: CodeFilterSpec = table(arg(rest, 0)?)?;
            api.code_filter(spec)?;
        }

        // tree recursion
        "sub_dir" => {
            api.push_subdir(arg(rest, 0)?.token()?, false)?;
            load_construct(api)?;
            api.pop_subdir(false)?;
        }
        "sub_project" => {
            api.push_subdir(arg(rest, 0)?.token()?, true)?;
            load_construct(api)?;
            api.pop_subdir(true)?;
        }

        // item methods
        "with" => {
            let item = find_item(api, arg(rest, 0)?.token()?)?;
            exec_item_method(api, item, slice(rest, 1))?;
        }

        other => {
            return Err(BuildError::Malformed(format!("unrecognized directive '{other}'")).into())
        }
    }
    Ok(())
}

fn exec_item_method(api: &mut BuildApi, item: ItemId, args: &[Arg]) -> Result<()> {
    let Some((method, rest)) = args.split_first() else {
        return Err(BuildError::Malformed("'with' requires a method name".into()).into());
    };
    match method.token()? {
        "add_dependency" => {
            let kind = arg(rest, 0)?.token()?;
            let other = arg(rest, 1)?.token()?;
            match api.ctx.items.find_by_name(other) {
                Some(o) => api.item_add_dependency(item, kind, o)?,
                None => {
                    let k = crate::core::dependency::DepKind::parse(kind).ok_or_else(|| {
                        BuildError::Malformed(format!("invalid dependency type '{kind}'"))
                    })?;
                    api.ctx.items.add_dependency_by_name(item, k, other)?;
                }
            }
        }
        "force_tool" => match rest.len() {
            1 => api.item_force_tool(item, None, arg(rest, 0)?.token()?)?,
            _ => api.item_force_tool(item, Some(arg(rest, 0)?.token()?), arg(rest, 1)?.token()?)?,
        },
        "override_option" => {
            api.item_override_option(item, arg(rest, 0)?.token()?, arg(rest, 1)?.token()?)?;
        }
        "defines" => api.item_defines(item, tokens(rest)?),
        "system_defines" => {
            let sys = arg(rest, 0)?.token()?.to_owned();
            api.item_system_defines(item, &sys, tokens(slice(rest, 1))?);
        }
        "includes" => api.item_includes(item, tokens(rest)?),
        "include_artifact_dir" => api.item_include_artifact_dir(item),
        "kind" => api.kind(item, arg(rest, 0)?.token()?)?,
        "libs" => api.libs(item, &tokens(rest)?)?,
        "set_top_level" => api.item_set_top_level(item, parse_bool(arg(rest, 0)?.token()?)?),
        "set_default_target" => api.item_set_default_target(item, parse_bool(arg(rest, 0)?.token()?)?),
        "set_pseudo_target" => {
            let name = rest.first().map(|a| a.token()).transpose()?;
            api.item_set_pseudo_target(item, name);
        }
        "set_use_name_for_input" => {
            api.item_set_use_name_for_input(item, parse_bool(arg(rest, 0)?.token()?)?);
        }
        "set_variable" => {
            let vals = tokens(slice(rest, 1))?;
            api.item_set_variable(item, arg(rest, 0)?.token()?, &vals.join(" "), true);
        }
        "add_to_variable" => {
            for v in tokens(slice(rest, 1))? {
                api.item_add_to_variable(item, arg(rest, 0)?.token()?, &v);
            }
        }
        "clear_variable" => api.item_clear_variable(item, arg(rest, 0)?.token()?),
        "inherit_variable" => {
            api.item_inherit_variable(item, arg(rest, 0)?.token()?, parse_bool(arg(rest, 1)?.token()?)?);
        }
        other => {
            return Err(
                BuildError::Malformed(format!("unrecognized item method '{other}'")).into(),
            )
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::Context;
    use crate::core::item::ItemKind;
    use crate::util::paths::Directory;
    use std::fs;
    use tempfile::TempDir;

    fn api_in(tmp: &TempDir) -> BuildApi {
        BuildApi::new(Context::bare(Directory::from_root(
            tmp.path().to_string_lossy(),
        )))
    }

    #[test]
    fn test_load_basic_project() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("hello.c"), "int main(){}\n").unwrap();
        fs::write(
            tmp.path().join("construct"),
            "# a tiny project\n\
             configuration debug\n\
             default_configuration debug\n\
             defines HELLO=1\n\
             executable hello hello.c\n",
        )
        .unwrap();

        let mut api = api_in(&tmp);
        load_project(&mut api, None).unwrap();
        let hello = api.ctx.items.find_by_name("hello").unwrap();
        assert!(matches!(
            api.ctx.items.get(hello).kind,
            ItemKind::Executable { .. }
        ));
        assert_eq!(api.ctx.configs.default().unwrap().name(), "debug");
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("construct"),
            "configuration d\ndefault_configuration d\nexecutable hello nope.c\n",
        )
        .unwrap();
        let mut api = api_in(&tmp);
        let err = load_project(&mut api, None).unwrap_err();
        assert!(format!("{err:#}").contains("does not exist"));
    }

    #[test]
    fn test_unknown_directive_is_an_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("construct"), "frobnicate now\n").unwrap();
        let mut api = api_in(&tmp);
        let err = load_project(&mut api, None).unwrap_err();
        assert!(format!("{err:#}").contains("unrecognized directive"));
    }

    #[test]
    fn test_sub_dir_recursion_and_adoption() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("lib")).unwrap();
        fs::write(tmp.path().join("lib/a.c"), "int a;\n").unwrap();
        fs::write(tmp.path().join("lib/construct"), "library la a.c\n").unwrap();
        fs::write(
            tmp.path().join("construct"),
            "configuration d\ndefault_configuration d\nsub_dir lib\n",
        )
        .unwrap();

        let mut api = api_in(&tmp);
        load_project(&mut api, None).unwrap();
        let la = api.ctx.items.find_by_name("la").unwrap();
        let root = api.ctx.scopes.root();
        assert!(api.ctx.scopes.get(root).items.contains(&la));
    }

    #[test]
    fn test_line_continuation_and_table() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("gen.txt"), "payload").unwrap();
        fs::write(
            tmp.path().join("construct"),
            "configuration d\n\
             default_configuration d\n\
             code_generate {\"name\": \"blob.cpp\", \\\n\
                \"source\": [\"gen.txt\"], \"comma_separate\": true}\n",
        )
        .unwrap();
        let mut api = api_in(&tmp);
        load_project(&mut api, None).unwrap();
        let item = api.ctx.items.find_by_name("blob.cpp").unwrap();
        assert!(matches!(
            api.ctx.items.get(item).kind,
            ItemKind::CodeGenerator(_)
        ));
    }

    #[test]
    fn test_empty_target_pruned_with_warning() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("construct"),
            "configuration d\ndefault_configuration d\nexecutable ghost\n",
        )
        .unwrap();
        let mut api = api_in(&tmp);
        load_project(&mut api, None).unwrap();
        let ghost = api.ctx.items.find_by_name("ghost").unwrap();
        let root = api.ctx.scopes.root();
        assert!(!api.ctx.scopes.get(root).items.contains(&ghost));
    }
}
