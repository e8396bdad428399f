//! Resolved build nodes.
//!
//! A [`BuildItem`] is the post-transform image of an item: bound to a
//! concrete tool and output location, carrying flattened variables and typed
//! edges onto other build items. Generators serialize these.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;

use crate::core::dependency::DepKind;
use crate::core::error::BuildError;
use crate::core::tool::{ToolArena, ToolId};
use crate::core::variable::{self, Variable, VariableSet};
use crate::util::paths::Directory;

/// Index into a [`BuildArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildId(pub u32);

#[derive(Debug, Clone)]
pub struct BuildItem {
    name: String,
    pseudo_name: Option<String>,
    dir: Directory,
    out_dir: Option<Directory>,
    tool: Option<ToolId>,
    outputs: Vec<String>,
    /// outputs outside the build tree, recorded by absolute path
    external_outputs: Vec<String>,
    /// per-item tool option choices, e.g. `optimization -> debug`
    flags: BTreeMap<String, String>,
    variables: VariableSet,
    deps: BTreeMap<BuildId, DepKind>,
    top_level: bool,
    default_target: bool,
    use_name: bool,
    dependent: bool,
}

impl BuildItem {
    pub fn new(name: impl Into<String>, dir: Directory) -> BuildItem {
        BuildItem {
            name: name.into(),
            pseudo_name: None,
            dir,
            out_dir: None,
            tool: None,
            outputs: Vec::new(),
            external_outputs: Vec::new(),
            flags: BTreeMap::new(),
            variables: VariableSet::new(),
            deps: BTreeMap::new(),
            top_level: false,
            default_target: true,
            use_name: true,
            dependent: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Directory {
        &self.dir
    }

    pub fn out_dir(&self) -> &Directory {
        self.out_dir.as_ref().unwrap_or(&self.dir)
    }

    pub fn set_out_dir(&mut self, d: Directory) {
        self.out_dir = Some(d);
    }

    pub fn tool(&self) -> Option<ToolId> {
        self.tool
    }

    /// Bind the tool, deriving outputs from its output extensions. A build
    /// item's tool is bound at most once.
    pub fn set_tool(&mut self, tools: &ToolArena, id: ToolId) -> Result<()> {
        if self.tool.is_some() {
            return Err(BuildError::State(format!(
                "tool already specified for build item '{}'",
                self.name
            ))
            .into());
        }
        self.tool = Some(id);
        self.outputs = tools.get(id).outputs_for(&self.name);
        Ok(())
    }

    /// Explicit output names; code generation steps set these after the
    /// tool, overriding the derived list.
    pub fn set_outputs(&mut self, outputs: Vec<String>) {
        self.outputs = outputs;
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn add_external_output(&mut self, path: impl Into<String>) {
        self.external_outputs.push(path.into());
    }

    pub fn external_outputs(&self) -> &[String] {
        &self.external_outputs
    }

    /// Output paths under the output directory, plus external ones.
    pub fn output_paths(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .outputs
            .iter()
            .map(|o| self.out_dir().makefilename(o))
            .collect();
        out.extend(self.external_outputs.iter().cloned());
        out
    }

    pub fn set_flag(&mut self, group: impl Into<String>, choice: impl Into<String>) {
        self.flags.insert(group.into(), choice.into());
    }

    pub fn flags(&self) -> &BTreeMap<String, String> {
        &self.flags
    }

    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }

    pub fn set_variables(&mut self, vars: VariableSet) {
        self.variables = vars;
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn variable_mut(&mut self, name: &str) -> &mut Variable {
        variable::entry(&mut self.variables, name)
    }

    pub fn set_variable<I, S>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let v = self.variable_mut(name);
        v.clear();
        v.add_many(values);
    }

    pub fn add_to_variable(&mut self, name: &str, other: &Variable) {
        self.variable_mut(name).add_many(other.values().iter().cloned());
    }

    pub fn set_top_level(&mut self, tl: bool, pseudo: Option<String>) {
        self.top_level = tl;
        if pseudo.is_some() {
            self.pseudo_name = pseudo;
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.top_level
    }

    /// The short alias emitted for top-level targets; falls back to the
    /// item name.
    pub fn top_level_name(&self) -> &str {
        self.pseudo_name.as_deref().unwrap_or(&self.name)
    }

    pub fn set_default_target(&mut self, d: bool) {
        self.default_target = d;
    }

    pub fn is_default_target(&self) -> bool {
        self.default_target
    }

    pub fn set_use_name(&mut self, b: bool) {
        self.use_name = b;
    }

    /// Whether the item's own file participates as a command input.
    pub fn use_name(&self) -> bool {
        self.use_name
    }

    /// Record that something depends on this item; generators use the
    /// absence of this to find roots that would otherwise never build.
    pub fn mark_dependent(&mut self) {
        self.dependent = true;
    }

    pub fn is_dependent(&self) -> bool {
        self.dependent
    }

    pub fn deps(&self) -> &BTreeMap<BuildId, DepKind> {
        &self.deps
    }
}

/// Owning arena for the build items of one transform set.
#[derive(Debug, Default)]
pub struct BuildArena {
    items: Vec<BuildItem>,
}

impl BuildArena {
    pub fn new() -> BuildArena {
        BuildArena::default()
    }

    pub fn add(&mut self, bi: BuildItem) -> BuildId {
        let id = BuildId(self.items.len() as u32);
        self.items.push(bi);
        id
    }

    pub fn get(&self, id: BuildId) -> &BuildItem {
        &self.items[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: BuildId) -> &mut BuildItem {
        &mut self.items[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = BuildId> {
        (0..self.items.len() as u32).map(BuildId)
    }

    /// Typed edge with cycle rejection and strengthening, mirroring the
    /// item-graph contract.
    pub fn add_dependency(&mut self, from: BuildId, kind: DepKind, to: BuildId) -> Result<()> {
        if from == to || self.has_dependency(to, from) {
            return Err(BuildError::Cycle {
                from: self.get(from).name().to_owned(),
                to: self.get(to).name().to_owned(),
            }
            .into());
        }
        self.items[from.0 as usize]
            .deps
            .entry(to)
            .and_modify(|cur| *cur = cur.strengthen(kind))
            .or_insert(kind);
        Ok(())
    }

    pub fn has_dependency(&self, from: BuildId, to: BuildId) -> bool {
        let mut seen = HashSet::new();
        let mut work = vec![from];
        while let Some(cur) = work.pop() {
            if !seen.insert(cur) {
                continue;
            }
            let item = self.get(cur);
            if item.deps.contains_key(&to) {
                return true;
            }
            work.extend(item.deps.keys().copied());
        }
        false
    }

    /// Direct neighbors of exactly `kind`, sorted by `(name, dir)`.
    pub fn extract_dependencies(&self, from: BuildId, kind: DepKind) -> Vec<BuildId> {
        let mut out: Vec<BuildId> = self
            .get(from)
            .deps
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(id, _)| *id)
            .collect();
        out.sort_by(|a, b| {
            let (ia, ib) = (self.get(*a), self.get(*b));
            ia.name()
                .cmp(ib.name())
                .then_with(|| ia.dir().fullpath().cmp(&ib.dir().fullpath()))
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tool::Tool;

    #[test]
    fn test_set_tool_once() {
        let mut tools = ToolArena::new();
        let mut cc = Tool::new("cc", "gcc");
        cc.set_outputs(vec![".o".into()]);
        let cc = tools.add(cc);
        let other = tools.add(Tool::new("cc", "clang"));

        let mut bi = BuildItem::new("main.c", Directory::from_root("/src"));
        bi.set_tool(&tools, cc).unwrap();
        assert_eq!(bi.outputs(), ["main.o"]);
        assert!(bi.set_tool(&tools, other).is_err());
    }

    #[test]
    fn test_output_paths() {
        let mut bi = BuildItem::new("lib.c", Directory::from_root("/src"));
        bi.set_out_dir(Directory::from_root("/out/artifacts"));
        bi.set_outputs(vec!["lib.o".into()]);
        bi.add_external_output("/opt/foo/foo.pc");
        assert_eq!(
            bi.output_paths(),
            ["/out/artifacts/lib.o", "/opt/foo/foo.pc"]
        );
    }

    #[test]
    fn test_build_graph_cycle_rejected() {
        let mut arena = BuildArena::new();
        let a = arena.add(BuildItem::new("a", Directory::from_root("/s")));
        let b = arena.add(BuildItem::new("b", Directory::from_root("/s")));
        arena.add_dependency(a, DepKind::Explicit, b).unwrap();
        assert!(arena.add_dependency(b, DepKind::Order, a).is_err());
        arena.add_dependency(a, DepKind::Order, b).unwrap();
        assert_eq!(arena.get(a).deps()[&b], DepKind::Explicit);
    }
}
