//! Make back-end.
//!
//! Emits a flat `Makefile` with fully rendered commands: every variable and
//! option group is substituted at generation time, order-only inputs use
//! make's `|` separator, and top-level targets get `.PHONY` aliases.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::core::context::Context;
use crate::core::dependency::DepKind;
use crate::generator::rule;
use crate::transform::build_item::BuildId;
use crate::transform::set::TransformSet;
use crate::util::paths::Directory;
use crate::util::text;

#[derive(Debug, Default)]
pub struct MakeGenerator;

impl MakeGenerator {
    pub fn new() -> MakeGenerator {
        MakeGenerator
    }

    pub fn emit(
        &self,
        ctx: &Context,
        xform: &TransformSet,
        dest: &Directory,
        _regen_args: &[String],
    ) -> Result<()> {
        let mut out: Vec<String> = Vec::new();
        out.push("# generated build description; do not edit".to_owned());
        out.push(String::new());

        let mut phonies: Vec<String> = vec!["all".to_owned()];
        let mut defaults: Vec<String> = Vec::new();
        let mut rules: Vec<String> = Vec::new();

        emit_set(ctx, xform, &mut rules, &mut phonies, &mut defaults)?;

        out.push(format!(".PHONY: {}", phonies.join(" ")));
        out.push(format!("all: {}", defaults.join(" ")));
        out.push(String::new());
        out.extend(rules);

        dest.update_if_different("Makefile", &out)?;
        Ok(())
    }
}

fn emit_set(
    ctx: &Context,
    set: &TransformSet,
    out: &mut Vec<String>,
    phonies: &mut Vec<String>,
    defaults: &mut Vec<String>,
) -> Result<()> {
    for id in set.builds.ids() {
        emit_build(ctx, set, out, phonies, defaults, id)?;
    }
    for child in &set.children {
        emit_set(ctx, child, out, phonies, defaults)?;
    }
    Ok(())
}

fn emit_build(
    ctx: &Context,
    set: &TransformSet,
    out: &mut Vec<String>,
    phonies: &mut Vec<String>,
    defaults: &mut Vec<String>,
    id: BuildId,
) -> Result<()> {
    let bi = set.builds.get(id);
    let Some(tool_id) = bi.tool() else {
        return Ok(());
    };
    let tool = ctx.tools.get(tool_id);
    let rule = rule::rule_for_tool(ctx, set, tool_id)?;

    let outputs = bi.output_paths();
    let mut inputs: Vec<String> = Vec::new();
    if bi.use_name() {
        inputs.push(bi.dir().makefilename(bi.name()));
    }
    for dep in set.builds.extract_dependencies(id, DepKind::Explicit) {
        for p in set.builds.get(dep).output_paths() {
            if !inputs.contains(&p) {
                inputs.push(p);
            }
        }
    }
    let mut prereqs = inputs.clone();
    for dep in set.builds.extract_dependencies(id, DepKind::Implicit) {
        prereqs.extend(set.builds.get(dep).output_paths());
    }
    let mut order: Vec<String> = Vec::new();
    for dep in set.builds.extract_dependencies(id, DepKind::Order) {
        order.extend(set.builds.get(dep).output_paths());
    }

    // variable values: per-build shadows scope
    let system = Some(set.system());
    let mut vars: BTreeMap<String, String> = BTreeMap::new();
    for name in [
        "cflags",
        "defines",
        "includes",
        "ldflags",
        "libdirs",
        "libs",
        "codegen_info",
        "current_output_dir",
    ] {
        vars.insert(name.to_owned(), String::new());
    }
    vars.insert("builddir".to_owned(), set.out_dir().fullpath());
    for (name, var) in &set.vars {
        vars.insert(name.clone(), var.value(system));
    }
    for (name, var) in bi.variables() {
        let rendered = match tool.command_prefix(name) {
            Some(prefix) => var.prepended_value(prefix, system),
            None => var.value(system),
        };
        vars.insert(name.clone(), rendered);
    }
    for (vname, value) in &rule.defaults {
        vars.insert(vname.clone(), value.clone());
    }
    for (group, choice) in bi.flags() {
        if let Some(tokens) = tool.option_tokens(group, choice) {
            vars.insert(format!("{}_{}", rule.name, group), tokens.join(" "));
        }
    }
    vars.insert("in".to_owned(), inputs.join(" "));
    vars.insert(
        "out".to_owned(),
        outputs.first().cloned().unwrap_or_default(),
    );
    vars.insert("out_short".to_owned(), bi.name().to_owned());

    let command = text::substitute_variables(&rule.command_line(), false, |n| {
        vars.get(n).cloned()
    });

    let mut line = format!("{}: {}", outputs.join(" "), prereqs.join(" "));
    if !order.is_empty() {
        line.push_str(" | ");
        line.push_str(&order.join(" "));
    }
    out.push(line);
    out.push(format!("\t@mkdir -p {}", bi.out_dir().fullpath()));
    out.push(format!("\t{command}"));
    out.push(String::new());

    if bi.is_top_level() {
        let alias = bi.top_level_name().to_owned();
        out.push(format!("{}: {}", alias, outputs.join(" ")));
        out.push(String::new());
        if !phonies.contains(&alias) {
            phonies.push(alias);
        }
    }
    if bi.is_top_level() && bi.is_default_target() {
        defaults.extend(outputs);
    }
    Ok(())
}
