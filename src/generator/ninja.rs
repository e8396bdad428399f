//! Ninja back-end.
//!
//! Serializes a resolved transform tree to `build.ninja`: pools, rules,
//! build statements in dependency order, phony aliases for top-level
//! targets, and a self-regeneration rule. Child scopes become `subninja`
//! files so their variables stay scoped.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::core::context::Context;
use crate::core::dependency::DepKind;
use crate::generator::rule::{self, Rule};
use crate::transform::build_item::BuildId;
use crate::transform::set::TransformSet;
use crate::util::paths::Directory;
use crate::util::text;

#[derive(Debug, Default)]
pub struct NinjaGenerator;

impl NinjaGenerator {
    pub fn new() -> NinjaGenerator {
        NinjaGenerator
    }

    pub fn emit(
        &self,
        ctx: &Context,
        xform: &TransformSet,
        dest: &Directory,
        regen_args: &[String],
    ) -> Result<()> {
        self.emit_set(ctx, xform, dest, "build.ninja", "", true, regen_args)
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_set(
        &self,
        ctx: &Context,
        set: &TransformSet,
        dest: &Directory,
        filename: &str,
        prefix: &str,
        is_root: bool,
        regen_args: &[String],
    ) -> Result<()> {
        let mut out: Vec<String> = Vec::new();
        if is_root {
            out.push("ninja_required_version = 1.3".to_owned());
            out.push(format!("builddir = {}", dest.fullpath()));
            out.push(String::new());
            for pool in collect_pools(set) {
                out.push(format!("pool {}", text::sanitize(pool.0.as_str())));
                out.push(format!("  depth = {}", pool.1));
            }
            out.push(String::new());
        }

        // scope variables
        for (name, var) in &set.vars {
            let rendered = render_set_var(ctx, set, name, var);
            if !rendered.is_empty() {
                out.push(format!("{name} = {rendered}"));
            }
        }
        out.push(String::new());

        // rules, with their option-group defaults ahead of them
        let mut seen_rules = HashSet::new();
        for tool_id in set.tools() {
            let rule = rule::rule_for_tool(ctx, set, *tool_id)?;
            if !seen_rules.insert(rule.name.clone()) {
                continue;
            }
            emit_rule(&mut out, &rule);
        }

        // build statements in dependency order
        for id in build_order(set) {
            emit_build(ctx, set, &mut out, id);
        }

        // child scopes
        for (i, child) in set.children.iter().enumerate() {
            let child_name = format!("{prefix}sub{i}.ninja");
            out.push(format!("subninja {}", dest.makefilename(&child_name)));
            let child_prefix = format!("{prefix}sub{i}_");
            self.emit_set(ctx, child, dest, &child_name, &child_prefix, false, regen_args)?;
        }
        if !set.children.is_empty() {
            out.push(String::new());
        }

        if is_root {
            emit_aliases(&mut out, set);
            emit_regen(ctx, &mut out, regen_args);
        }

        dest.update_if_different(filename, &out)?;
        Ok(())
    }
}

fn collect_pools(set: &TransformSet) -> Vec<(String, u32)> {
    let mut out: Vec<(String, u32)> = Vec::new();
    let mut walk = vec![set];
    while let Some(s) = walk.pop() {
        for p in &s.pools {
            if !out.iter().any(|(n, _)| n == p.name()) {
                out.push((p.name().to_owned(), p.max_jobs()));
            }
        }
        walk.extend(s.children.iter());
    }
    out
}

fn render_set_var(
    ctx: &Context,
    set: &TransformSet,
    name: &str,
    var: &crate::core::variable::Variable,
) -> String {
    let system = Some(set.system());
    if let Some(tag) = var.tool_tag() {
        for t in set.tools() {
            let tool = ctx.tools.get(*t);
            if tool.tag() == tag {
                if let Some(prefix) = tool.command_prefix(name) {
                    return var.prepended_value(prefix, system);
                }
            }
        }
    }
    var.value(system)
}

fn emit_rule(out: &mut Vec<String>, rule: &Rule) {
    for (name, value) in &rule.defaults {
        out.push(format!("{name} = {value}"));
    }
    out.push(format!("rule {}", rule.name));
    out.push(format!("  command = {}", rule.command_line()));
    out.push(format!("  description = {}", rule.description));
    if let Some(df) = &rule.dep_file {
        out.push(format!("  depfile = {df}"));
        if let Some(style) = &rule.dep_style {
            out.push(format!("  deps = {style}"));
        }
    }
    if let Some(pool) = &rule.pool {
        out.push(format!("  pool = {}", text::sanitize(pool)));
    }
    out.push(String::new());
}

/// Dependency-respecting, insertion-stable emission order.
fn build_order(set: &TransformSet) -> Vec<BuildId> {
    let mut graph: DiGraph<BuildId, ()> = DiGraph::new();
    let mut nodes: HashMap<BuildId, NodeIndex> = HashMap::new();
    for id in set.builds.ids() {
        nodes.insert(id, graph.add_node(id));
    }
    for id in set.builds.ids() {
        for (dep, _) in set.builds.get(id).deps() {
            graph.add_edge(nodes[dep], nodes[&id], ());
        }
    }
    match toposort(&graph, None) {
        Ok(order) => order.into_iter().map(|n| graph[n]).collect(),
        // the arena rejects cycles at insertion; fall back regardless
        Err(_) => set.builds.ids().collect(),
    }
}

fn emit_build(ctx: &Context, set: &TransformSet, out: &mut Vec<String>, id: BuildId) {
    let bi = set.builds.get(id);
    let Some(tool_id) = bi.tool() else {
        return;
    };
    let tool = ctx.tools.get(tool_id);
    let rule_name = text::sanitize(tool.tag());

    let outputs = bi.output_paths().join(" ");

    let mut inputs: Vec<String> = Vec::new();
    let push_input = |inputs: &mut Vec<String>, p: String| {
        if !inputs.contains(&p) {
            inputs.push(p);
        }
    };
    if bi.use_name() {
        push_input(&mut inputs, bi.dir().makefilename(bi.name()));
    }
    for dep in set.builds.extract_dependencies(id, DepKind::Explicit) {
        for p in set.builds.get(dep).output_paths() {
            push_input(&mut inputs, p);
        }
    }

    let mut implicit: Vec<String> = Vec::new();
    for dep in set.builds.extract_dependencies(id, DepKind::Implicit) {
        implicit.extend(set.builds.get(dep).output_paths());
    }
    let mut order: Vec<String> = Vec::new();
    for dep in set.builds.extract_dependencies(id, DepKind::Order) {
        order.extend(set.builds.get(dep).output_paths());
    }

    let mut line = format!("build {outputs}: {rule_name} {}", inputs.join(" "));
    if !implicit.is_empty() {
        line.push_str(" | ");
        line.push_str(&implicit.join(" "));
    }
    if !order.is_empty() {
        line.push_str(" || ");
        line.push_str(&order.join(" "));
    }
    out.push(line);
    out.push(format!("  out_short = {}", bi.name()));

    // per-item option choices shadow the rule defaults
    for (group, choice) in bi.flags() {
        if let Some(tokens) = tool.option_tokens(group, choice) {
            out.push(format!("  {rule_name}_{group} = {}", tokens.join(" ")));
        }
    }
    // per-item variables shadow the scope ones
    let system = Some(set.system());
    for (name, var) in bi.variables() {
        let rendered = match tool.command_prefix(name) {
            Some(prefix) => var.prepended_value(prefix, system),
            None => var.value(system),
        };
        if !rendered.is_empty() {
            out.push(format!("  {name} = {rendered}"));
        }
    }
    out.push(String::new());
}

fn emit_aliases(out: &mut Vec<String>, root: &TransformSet) {
    let mut defaults: Vec<String> = Vec::new();
    let mut walk = vec![root];
    let mut alias_lines = Vec::new();
    while let Some(set) = walk.pop() {
        for id in set.builds.ids() {
            let bi = set.builds.get(id);
            if bi.tool().is_none() || !bi.is_top_level() {
                continue;
            }
            let outputs = bi.output_paths().join(" ");
            let alias = bi.top_level_name().to_owned();
            if alias != outputs {
                alias_lines.push(format!("build {alias}: phony {outputs}"));
            }
            if bi.is_default_target() {
                defaults.push(outputs);
            }
        }
        walk.extend(set.children.iter());
    }
    out.extend(alias_lines);
    if !defaults.is_empty() {
        out.push(format!("build all: phony {}", defaults.join(" ")));
        out.push("default all".to_owned());
    }
    out.push(String::new());
}

fn emit_regen(ctx: &Context, out: &mut Vec<String>, regen_args: &[String]) {
    if regen_args.is_empty() {
        return;
    }
    out.push("rule regen_slipway".to_owned());
    out.push(format!(
        "  command = cd {} && {}",
        Directory::current().fullpath(),
        regen_args.join(" ")
    ));
    out.push("  description = Regenerating build files...".to_owned());
    out.push("  generator = 1".to_owned());
    out.push(String::new());
    let mut line = "build build.ninja: regen_slipway |".to_owned();
    for d in ctx.dirs.visited() {
        line.push(' ');
        line.push_str(d);
        line.push_str("/construct");
    }
    out.push(line);
    out.push(String::new());
}
