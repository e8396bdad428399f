//! `compile_commands.json` emission for IDE integration.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::context::Context;
use crate::generator::rule;
use crate::transform::set::TransformSet;
use crate::util::paths::Directory;
use crate::util::text;

/// One compilation database entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct CompileCommand {
    pub directory: String,
    pub file: String,
    pub arguments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Collect compile entries from a transform tree.
pub fn collect(ctx: &Context, xform: &TransformSet) -> Result<Vec<CompileCommand>> {
    let mut out = Vec::new();
    let mut walk = vec![xform];
    while let Some(set) = walk.pop() {
        for id in set.builds.ids() {
            let bi = set.builds.get(id);
            let Some(tool_id) = bi.tool() else { continue };
            let tool = ctx.tools.get(tool_id);
            if !matches!(tool.tag(), "cc" | "cxx" | "objcxx") {
                continue;
            }
            let r = rule::rule_for_tool(ctx, set, tool_id)?;

            let file = bi.dir().makefilename(bi.name());
            let output = bi.output_paths().into_iter().next();
            let system = Some(set.system());
            let lookup = |n: &str| -> Option<String> {
                match n {
                    "in" => Some(file.clone()),
                    "out" => output.clone(),
                    "out_short" => Some(bi.name().to_owned()),
                    _ => {
                        if let Some((_, v)) = r.defaults.iter().find(|(k, _)| k.as_str() == n) {
                            return Some(v.clone());
                        }
                        if let Some(var) = bi.variable(n) {
                            return Some(match tool.command_prefix(n) {
                                Some(p) => var.prepended_value(p, system),
                                None => var.value(system),
                            });
                        }
                        if let Some(var) = set.vars.get(n) {
                            return Some(var.value(system));
                        }
                        Some(String::new())
                    }
                }
            };
            let rendered = text::substitute_variables(&r.command_line(), false, lookup);
            let arguments: Vec<String> = rendered
                .split_whitespace()
                .map(str::to_owned)
                .collect();

            out.push(CompileCommand {
                directory: bi.dir().fullpath(),
                file,
                arguments,
                output,
            });
        }
        walk.extend(set.children.iter());
    }
    Ok(out)
}

/// Write `compile_commands.json` into `dest`.
pub fn emit(ctx: &Context, xform: &TransformSet, dest: &Directory) -> Result<()> {
    let commands = collect(ctx, xform)?;
    let json = serde_json::to_string_pretty(&commands)?;
    let lines: Vec<String> = json.lines().map(str::to_owned).collect();
    dest.update_if_different("compile_commands.json", &lines)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_command_serialization() {
        let cmd = CompileCommand {
            directory: "/home/user/project".to_owned(),
            file: "src/main.c".to_owned(),
            arguments: vec![
                "cc".to_owned(),
                "-I/usr/include".to_owned(),
                "-c".to_owned(),
                "src/main.c".to_owned(),
            ],
            output: Some("obj/main.o".to_owned()),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("directory"));
        assert!(json.contains("arguments"));
    }
}
