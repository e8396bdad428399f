//! Executor rules rendered from tools.
//!
//! A [`Rule`] is the generator-facing form of a tool under one transform
//! set: the command template with option groups resolved to per-rule
//! variables, the dependency-sidecar declaration, and the job pool.

use anyhow::Result;

use crate::core::context::Context;
use crate::core::tool::{Tool, ToolExe, ToolId};
use crate::transform::set::TransformSet;
use crate::util::text;

#[derive(Debug, Clone)]
pub struct Rule {
    /// rule name, unique per file (derived from the tool tag)
    pub name: String,
    pub description: String,
    /// command tokens; `$in`/`$out` and flag variables are left for the
    /// executor, option groups become `${<rule>_<group>}` references
    pub command: Vec<String>,
    /// file-level defaults for the option-group variables
    pub defaults: Vec<(String, String)>,
    pub dep_file: Option<String>,
    pub dep_style: Option<String>,
    pub pool: Option<String>,
}

impl Rule {
    pub fn command_line(&self) -> String {
        self.command
            .iter()
            .filter(|t| !t.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The effective choice of an option group for a tool under a transform
/// set: scope/configuration option value first, then the tool's own
/// selection or default.
pub fn option_choice(tool: &Tool, xform: &TransformSet, group: &str) -> String {
    let from_options = xform.option_value(group);
    if !from_options.is_empty() {
        return from_options;
    }
    if group == "language" {
        return tool.language().unwrap_or_default().to_owned();
    }
    tool.default_option(group).unwrap_or_default().to_owned()
}

/// Resolve the `$exe` token of a tool's command.
pub fn resolve_exe(ctx: &Context, xform: &TransformSet, tool: &Tool) -> String {
    match tool.exe() {
        ToolExe::Path(p) => p.clone(),
        ToolExe::Generated(item) => match xform.get_transform(*item) {
            Some(bi) => xform
                .builds
                .get(bi)
                .output_paths()
                .into_iter()
                .next()
                .unwrap_or_else(|| ctx.items.get(*item).name().to_owned()),
            None => ctx.items.get(*item).name().to_owned(),
        },
        ToolExe::None => tool.name().to_owned(),
    }
}

/// Render one tool into a rule.
pub fn rule_for_tool(ctx: &Context, xform: &TransformSet, tool_id: ToolId) -> Result<Rule> {
    let tool = ctx.tools.get(tool_id);
    let name = text::sanitize(tool.tag());
    let mut command = Vec::with_capacity(tool.command().len());
    let mut defaults = Vec::new();

    for tok in tool.command() {
        if let Some(var) = tok.strip_prefix('$') {
            if tool.has_option(var) {
                let choice = option_choice(tool, xform, var);
                let tokens = tool.option_tokens(var, &choice).unwrap_or(&[]);
                let var_name = format!("{name}_{var}");
                defaults.push((var_name.clone(), tokens.join(" ")));
                command.push(format!("${{{var_name}}}"));
                continue;
            }
            if var == "exe" {
                command.push(resolve_exe(ctx, xform, tool));
                continue;
            }
        }
        command.push(tok.clone());
    }

    let (dep_file, dep_style) = match tool.implicit_deps() {
        Some(d) => {
            command.extend(d.flags.iter().cloned());
            (Some(d.file.clone()), Some(d.style.clone()))
        }
        None => (None, None),
    };

    let description = if tool.description().is_empty() {
        format!("{} $out_short", tool.tag().to_uppercase())
    } else {
        tool.description().to_owned()
    };

    Ok(Rule {
        name,
        description,
        command,
        defaults,
        dep_file,
        dep_style,
        pool: tool.pool().map(str::to_owned),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::Context;
    use crate::core::tool::{ImplicitDeps, OptionSet, Tool, ToolExe};
    use crate::util::paths::Directory;

    fn test_tool() -> Tool {
        let mut t = Tool::new("cc", "gcc");
        t.set_exe(ToolExe::Path("/usr/bin/gcc".into()));
        let mut opt = OptionSet::new();
        opt.insert("opt".into(), vec!["-O3".into()]);
        opt.insert("debug".into(), vec!["-O0".into(), "-g".into()]);
        t.set_option_group("optimization", opt);
        t.set_option_defaults(
            [("optimization".to_owned(), "opt".to_owned())].into_iter().collect(),
        );
        t.set_implicit_deps(ImplicitDeps {
            file: "$out.d".into(),
            style: "gcc".into(),
            flags: vec!["-MMD".into(), "-MF".into(), "$out.d".into()],
        });
        t.set_command(
            ["$exe", "$optimization", "$cflags", "-c", "-o", "$out", "$in"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        t
    }

    #[test]
    fn test_rule_rendering() {
        let mut ctx = Context::bare(Directory::from_root("/tmp"));
        let id = ctx.tools.add(test_tool());
        let xform = TransformSet::new(Directory::from_root("/tmp/out"), "Linux");
        let rule = rule_for_tool(&ctx, &xform, id).unwrap();
        assert_eq!(rule.name, "cc");
        assert_eq!(
            rule.command_line(),
            "/usr/bin/gcc ${cc_optimization} $cflags -c -o $out $in -MMD -MF $out.d"
        );
        assert_eq!(rule.defaults, vec![("cc_optimization".to_owned(), "-O3".to_owned())]);
        assert_eq!(rule.dep_style.as_deref(), Some("gcc"));
    }

    #[test]
    fn test_option_choice_prefers_transform_options() {
        let mut ctx = Context::bare(Directory::from_root("/tmp"));
        let id = ctx.tools.add(test_tool());
        let mut xform = TransformSet::new(Directory::from_root("/tmp/out"), "Linux");
        let mut opts = crate::core::variable::VariableSet::new();
        crate::core::variable::entry(&mut opts, "optimization").add("debug");
        xform.merge_options(&opts);
        let rule = rule_for_tool(&ctx, &xform, id).unwrap();
        assert_eq!(rule.defaults, vec![("cc_optimization".to_owned(), "-O0 -g".to_owned())]);
    }
}
