//! The item graph.
//!
//! Everything a project file declares is an item: plain sources, compile
//! sets, executables, libraries, code generators and filters, created files,
//! conditionally-included sources, and resolved package references. Items
//! are owned by an arena and refer to each other by [`ItemId`]; edges are
//! typed by [`DepKind`] and the graph is kept acyclic at insertion time.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Result;

use crate::core::dependency::DepKind;
use crate::core::error::BuildError;
use crate::core::tool::ToolId;
use crate::core::variable::{self, Variable, VariableSet};
use crate::util::paths::Directory;

/// Index into the item arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(pub u32);

/// Library flavor, from the `library_type` variable or `kind(...)` binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryKind {
    Static,
    Shared,
    Both,
}

impl LibraryKind {
    pub fn parse(s: &str) -> Option<LibraryKind> {
        match s {
            "static" => Some(LibraryKind::Static),
            "shared" | "dynamic" => Some(LibraryKind::Shared),
            "both" => Some(LibraryKind::Both),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryKind::Static => "static",
            LibraryKind::Shared => "shared",
            LibraryKind::Both => "both",
        }
    }
}

/// Condition/externals payload shared by optional sources and extern
/// library sets.
#[derive(Debug, Clone, Default)]
pub struct OptionalPayload {
    pub children: Vec<ItemId>,
    /// conjunction of conditions; currently only `system`
    pub conditions: BTreeMap<String, String>,
    /// (library name, version predicate) pairs resolved at transform time
    pub extern_libs: Vec<(String, String)>,
    /// defines contributed when the condition matches and libs resolve
    pub defines: Vec<String>,
    pub required: bool,
}

/// Code-generator layout description (§ the binary-to-C-string emitter).
#[derive(Debug, Clone, Default)]
pub struct CodeGenPayload {
    pub children: Vec<ItemId>,
    pub item_prefix: Vec<String>,
    pub item_suffix: Vec<String>,
    pub file_prefix: Vec<String>,
    pub file_suffix: Vec<String>,
    pub item_indent: Option<String>,
    pub comma_separate: bool,
}

/// The variant payload of an item.
#[derive(Debug, Clone)]
pub enum ItemKind {
    /// a plain file in the source directory
    Source,
    CompileSet {
        children: Vec<ItemId>,
    },
    Executable {
        children: Vec<ItemId>,
    },
    Library {
        children: Vec<ItemId>,
        kind: Option<LibraryKind>,
    },
    CodeGenerator(CodeGenPayload),
    /// runs an externally defined tool over inputs to produce named outputs
    CodeFilter {
        children: Vec<ItemId>,
        tool: Option<ToolId>,
        outputs: Vec<String>,
    },
    /// materializes a literal line list in the artifact directory
    CreateFile {
        lines: Vec<String>,
    },
    /// sources guarded by system/external-library conditions
    OptionalSource(OptionalPayload),
    /// external libraries guarded the same way, without own sources
    ExternLibrarySet(OptionalPayload),
    /// a resolved pkg-config entry (or plain-library fallback reference)
    Package {
        pc_file: Option<String>,
        values: BTreeMap<String, String>,
    },
}

impl ItemKind {
    pub fn children(&self) -> &[ItemId] {
        match self {
            ItemKind::CompileSet { children }
            | ItemKind::Executable { children }
            | ItemKind::Library { children, .. }
            | ItemKind::CodeFilter { children, .. } => children,
            ItemKind::CodeGenerator(p) => &p.children,
            ItemKind::OptionalSource(p) | ItemKind::ExternLibrarySet(p) => &p.children,
            _ => &[],
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<ItemId>> {
        match self {
            ItemKind::CompileSet { children }
            | ItemKind::Executable { children }
            | ItemKind::Library { children, .. }
            | ItemKind::CodeFilter { children, .. } => Some(children),
            ItemKind::CodeGenerator(p) => Some(&mut p.children),
            ItemKind::OptionalSource(p) | ItemKind::ExternLibrarySet(p) => Some(&mut p.children),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Item {
    name: String,
    dir: Directory,
    pub kind: ItemKind,
    pub variables: VariableSet,
    deps: BTreeMap<ItemId, DepKind>,
    parent: Option<ItemId>,
    force_tool_all: Option<String>,
    force_tool_ext: BTreeMap<String, String>,
    option_overrides: BTreeMap<String, String>,
    top_level: bool,
    use_name_as_input: bool,
    default_target: bool,
    pseudo_target: Option<String>,
    unresolved: Vec<(DepKind, String)>,
}

impl Item {
    fn new(name: String, dir: Directory, kind: ItemKind) -> Item {
        Item {
            name,
            dir,
            kind,
            variables: VariableSet::new(),
            deps: BTreeMap::new(),
            parent: None,
            force_tool_all: None,
            force_tool_ext: BTreeMap::new(),
            option_overrides: BTreeMap::new(),
            top_level: false,
            use_name_as_input: true,
            default_target: true,
            pseudo_target: None,
            unresolved: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Directory {
        &self.dir
    }

    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    pub fn deps(&self) -> &BTreeMap<ItemId, DepKind> {
        &self.deps
    }

    pub fn is_top_level(&self) -> bool {
        self.top_level
    }

    pub fn set_top_level(&mut self, b: bool) {
        self.top_level = b;
    }

    pub fn use_name_as_input(&self) -> bool {
        self.use_name_as_input
    }

    pub fn set_use_name_as_input(&mut self, b: bool) {
        self.use_name_as_input = b;
    }

    pub fn is_default_target(&self) -> bool {
        self.default_target
    }

    pub fn set_default_target(&mut self, b: bool) {
        self.default_target = b;
    }

    pub fn pseudo_target(&self) -> Option<&str> {
        self.pseudo_target.as_deref()
    }

    pub fn set_pseudo_target(&mut self, name: impl Into<String>) {
        self.pseudo_target = Some(name.into());
    }

    /// Route every extension (or one specific extension) to a named tool at
    /// transform time. Package references refuse this.
    pub fn force_tool(&mut self, ext: Option<&str>, tool: &str) -> Result<()> {
        if matches!(self.kind, ItemKind::Package { .. }) {
            return Err(
                BuildError::State("invalid request to force a tool on a package".into()).into(),
            );
        }
        match ext {
            Some(e) => {
                self.force_tool_ext.insert(e.to_owned(), tool.to_owned());
            }
            None => self.force_tool_all = Some(tool.to_owned()),
        }
        Ok(())
    }

    pub fn forced_tool(&self, ext: &str) -> Option<&str> {
        self.force_tool_ext
            .get(ext)
            .or(self.force_tool_all.as_ref())
            .map(String::as_str)
    }

    /// Override a tool option default for this item only.
    pub fn override_tool_setting(&mut self, opt: &str, choice: &str) -> Result<()> {
        if matches!(self.kind, ItemKind::Package { .. }) {
            return Err(BuildError::State(
                "invalid request to override a tool setting on a package".into(),
            )
            .into());
        }
        self.option_overrides.insert(opt.to_owned(), choice.to_owned());
        Ok(())
    }

    pub fn option_overrides(&self) -> &BTreeMap<String, String> {
        &self.option_overrides
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn variable_mut(&mut self, name: &str) -> &mut Variable {
        variable::entry(&mut self.variables, name)
    }

    pub fn set_variable(&mut self, name: &str, value: &str, split: bool) {
        let v = self.variable_mut(name);
        v.clear();
        if split {
            v.add_many(value.split_whitespace().map(str::to_owned));
        } else {
            v.add(value);
        }
    }

    pub fn has_unresolved(&self) -> bool {
        !self.unresolved.is_empty()
    }
}

/// Owning arena for items, with a name registry used to resolve
/// named-only dependencies as items appear.
#[derive(Debug, Default)]
pub struct ItemArena {
    items: Vec<Item>,
    by_name: HashMap<String, ItemId>,
    waiting_on: HashMap<String, Vec<ItemId>>,
}

impl ItemArena {
    pub fn new() -> ItemArena {
        ItemArena::default()
    }

    pub fn add(&mut self, name: impl Into<String>, dir: Directory, kind: ItemKind) -> Result<ItemId> {
        let name = name.into();
        let id = ItemId(self.items.len() as u32);
        self.items.push(Item::new(name.clone(), dir, kind));
        self.by_name.insert(name.clone(), id);
        if let Some(waiters) = self.waiting_on.remove(&name) {
            for w in waiters {
                let pending: Vec<(DepKind, String)> = {
                    let item = self.get_mut(w);
                    let (hit, keep): (Vec<_>, Vec<_>) =
                        std::mem::take(&mut item.unresolved).into_iter().partition(|(_, n)| *n == name);
                    item.unresolved = keep;
                    hit
                };
                for (kind, _) in pending {
                    self.add_dependency(w, kind, id)?;
                }
            }
        }
        Ok(id)
    }

    pub fn get(&self, id: ItemId) -> &Item {
        &self.items[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ItemId) -> &mut Item {
        &mut self.items[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find_by_name(&self, name: &str) -> Option<ItemId> {
        self.by_name.get(name).copied()
    }

    /// Add a typed edge `from -> to`. Fails when the edge would close a
    /// cycle; an existing edge keeps the stronger kind.
    pub fn add_dependency(&mut self, from: ItemId, kind: DepKind, to: ItemId) -> Result<()> {
        if from == to || self.has_dependency(to, from) {
            return Err(BuildError::Cycle {
                from: self.get(from).name().to_owned(),
                to: self.get(to).name().to_owned(),
            }
            .into());
        }
        let item = self.get_mut(from);
        item.deps
            .entry(to)
            .and_modify(|cur| *cur = cur.strengthen(kind))
            .or_insert(kind);
        Ok(())
    }

    /// Add an edge to an item known only by name; resolution happens when
    /// (if) the item registers.
    pub fn add_dependency_by_name(&mut self, from: ItemId, kind: DepKind, name: &str) -> Result<()> {
        if let Some(to) = self.find_by_name(name) {
            return self.add_dependency(from, kind, to);
        }
        let item = self.get_mut(from);
        let mut found = false;
        for (k, n) in item.unresolved.iter_mut() {
            if n == name {
                *k = k.strengthen(kind);
                found = true;
            }
        }
        if !found {
            item.unresolved.push((kind, name.to_owned()));
            self.waiting_on.entry(name.to_owned()).or_default().push(from);
        }
        Ok(())
    }

    /// Whether `to` is reachable from `from` over edges of any kind.
    pub fn has_dependency(&self, from: ItemId, to: ItemId) -> bool {
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

    /// For CHAIN: the full chain closure in build order, deduplicated by the
    /// reverse / drop-following-duplicates / reverse pass, so a shared stage
    /// lands after everything that feeds it. For other kinds: the direct
    /// neighbors of exactly that kind, sorted by `(name, dir)`.
    pub fn extract_dependencies(&self, from: ItemId, kind: DepKind) -> Vec<ItemId> {
        let mut out = Vec::new();
        if kind == DepKind::Chain {
            self.recurse_chain(from, &mut out);
            if !out.is_empty() {
                out.reverse();
                let mut kept: Vec<ItemId> = Vec::with_capacity(out.len());
                for id in out {
                    if !kept.contains(&id) {
                        kept.push(id);
                    }
                }
                kept.reverse();
                out = kept;
            }
        } else {
            out.extend(
                self.get(from)
                    .deps
                    .iter()
                    .filter(|(_, k)| **k == kind)
                    .map(|(id, _)| *id),
            );
            out.sort_by(|a, b| {
                let (ia, ib) = (self.get(*a), self.get(*b));
                ia.name()
                    .cmp(ib.name())
                    .then_with(|| ia.dir().fullpath().cmp(&ib.dir().fullpath()))
            });
        }
        out
    }

    fn recurse_chain(&self, from: ItemId, chain: &mut Vec<ItemId>) {
        for (dep, kind) in &self.get(from).deps {
            if *kind != DepKind::Chain {
                continue;
            }
            chain.push(*dep);
            self.recurse_chain(*dep, chain);
        }
    }

    /// Attach a child to a container item and record the parent link.
    pub fn add_child(&mut self, parent: ItemId, child: ItemId) -> Result<()> {
        match self.get_mut(parent).kind.children_mut() {
            Some(children) => {
                children.push(child);
                self.get_mut(child).parent = Some(parent);
                Ok(())
            }
            None => Err(BuildError::State(format!(
                "item '{}' cannot hold child items",
                self.get(parent).name()
            ))
            .into()),
        }
    }

    /// Create a source child by filename; the file must exist in the
    /// container's source directory.
    pub fn add_source_child(&mut self, parent: ItemId, name: &str) -> Result<ItemId> {
        let dir = self.get(parent).dir().clone();
        if !dir.exists(name) {
            return Err(BuildError::MissingSource {
                name: name.to_owned(),
                dir: dir.fullpath(),
            }
            .into());
        }
        let child = self.add(name, dir, ItemKind::Source)?;
        self.add_child(parent, child)?;
        Ok(child)
    }

    /// Walk the parent chain for the first non-empty value of a variable.
    pub fn find_variable_value_recursive(&self, from: ItemId, name: &str) -> Option<String> {
        let mut cur = Some(from);
        while let Some(id) = cur {
            let item = self.get(id);
            if let Some(v) = item.variable(name) {
                if !v.is_empty() {
                    return Some(v.value(None));
                }
            }
            cur = item.parent();
        }
        None
    }

    /// Merge this item's variables into `out` (existing entries extended).
    pub fn extract_variables(&self, from: ItemId, out: &mut VariableSet) {
        self.extract_variables_except(from, out, &[]);
    }

    pub fn extract_variables_except(&self, from: ItemId, out: &mut VariableSet, skip: &[&str]) {
        for (name, var) in &self.get(from).variables {
            if skip.contains(&name.as_str()) {
                continue;
            }
            variable::entry(out, name).merge(var);
        }
    }

    /// Fail when any item still has a dependency that never resolved to a
    /// registered item.
    pub fn check_dependencies(&self) -> Result<()> {
        for item in &self.items {
            if item.has_unresolved() {
                return Err(BuildError::UnresolvedDependency(item.name().to_owned()).into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_with(names: &[&str]) -> (ItemArena, Vec<ItemId>) {
        let mut arena = ItemArena::new();
        let dir = Directory::from_root("/src");
        let ids = names
            .iter()
            .map(|n| arena.add(*n, dir.clone(), ItemKind::Source).unwrap())
            .collect();
        (arena, ids)
    }

    #[test]
    fn test_cycle_detection_leaves_graph_unchanged() {
        let (mut arena, ids) = arena_with(&["a", "b", "c"]);
        arena.add_dependency(ids[0], DepKind::Explicit, ids[1]).unwrap();
        arena.add_dependency(ids[1], DepKind::Explicit, ids[2]).unwrap();
        let err = arena.add_dependency(ids[2], DepKind::Order, ids[0]).unwrap_err();
        assert!(err.to_string().contains("circular dependency"));
        assert!(arena.get(ids[2]).deps().is_empty());
        // self edges count as cycles too
        assert!(arena.add_dependency(ids[0], DepKind::Chain, ids[0]).is_err());
    }

    #[test]
    fn test_edge_strengthening() {
        let (mut arena, ids) = arena_with(&["a", "b"]);
        arena.add_dependency(ids[0], DepKind::Order, ids[1]).unwrap();
        arena.add_dependency(ids[0], DepKind::Explicit, ids[1]).unwrap();
        assert_eq!(arena.get(ids[0]).deps()[&ids[1]], DepKind::Explicit);
        // weaker re-add does not downgrade
        arena.add_dependency(ids[0], DepKind::Order, ids[1]).unwrap();
        assert_eq!(arena.get(ids[0]).deps()[&ids[1]], DepKind::Explicit);
    }

    #[test]
    fn test_chain_extraction_shared_stage_lands_last() {
        // a chains to b and c; both chain to d. d must land after b and c.
        let (mut arena, ids) = arena_with(&["a", "b", "c", "d"]);
        arena.add_dependency(ids[0], DepKind::Chain, ids[1]).unwrap();
        arena.add_dependency(ids[0], DepKind::Chain, ids[2]).unwrap();
        arena.add_dependency(ids[1], DepKind::Chain, ids[3]).unwrap();
        arena.add_dependency(ids[2], DepKind::Chain, ids[3]).unwrap();
        let chain = arena.extract_dependencies(ids[0], DepKind::Chain);
        assert_eq!(chain, vec![ids[1], ids[2], ids[3]]);
    }

    #[test]
    fn test_chain_extraction_no_duplicates() {
        let (mut arena, ids) = arena_with(&["a", "b", "c"]);
        arena.add_dependency(ids[0], DepKind::Chain, ids[1]).unwrap();
        arena.add_dependency(ids[0], DepKind::Chain, ids[2]).unwrap();
        arena.add_dependency(ids[1], DepKind::Chain, ids[2]).unwrap();
        let chain = arena.extract_dependencies(ids[0], DepKind::Chain);
        let mut dedup = chain.clone();
        dedup.dedup();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain, dedup);
    }

    #[test]
    fn test_non_chain_extraction_sorted_by_name() {
        let mut arena = ItemArena::new();
        let d1 = Directory::from_root("/src");
        let d2 = Directory::from_root("/other");
        let root = arena.add("root", d1.clone(), ItemKind::Source).unwrap();
        let z = arena.add("z", d1.clone(), ItemKind::Source).unwrap();
        let a2 = arena.add("a", d2, ItemKind::Source).unwrap();
        let a1 = arena.add("a", d1, ItemKind::Source).unwrap();
        for id in [z, a1, a2] {
            arena.add_dependency(root, DepKind::Explicit, id).unwrap();
        }
        let deps = arena.extract_dependencies(root, DepKind::Explicit);
        assert_eq!(deps, vec![a2, a1, z]);
        assert!(arena.extract_dependencies(root, DepKind::Order).is_empty());
    }

    #[test]
    fn test_named_dependency_resolves_late() {
        let (mut arena, ids) = arena_with(&["app"]);
        arena
            .add_dependency_by_name(ids[0], DepKind::Implicit, "libz")
            .unwrap();
        assert!(arena.check_dependencies().is_err());
        let lib = arena
            .add("libz", Directory::from_root("/src"), ItemKind::Source)
            .unwrap();
        arena.check_dependencies().unwrap();
        assert_eq!(arena.get(ids[0]).deps()[&lib], DepKind::Implicit);
    }

    #[test]
    fn test_missing_source_child() {
        let mut arena = ItemArena::new();
        let dir = Directory::from_root("/definitely/not/here");
        let set = arena
            .add("prog", dir, ItemKind::Executable { children: vec![] })
            .unwrap();
        let err = arena.add_source_child(set, "main.c").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_variable_lookup_walks_parents() {
        let mut arena = ItemArena::new();
        let dir = Directory::from_root("/src");
        let lib = arena
            .add("mylib", dir.clone(), ItemKind::Library { children: vec![], kind: None })
            .unwrap();
        let src = arena.add("a.c", dir, ItemKind::Source).unwrap();
        arena.add_child(lib, src).unwrap();
        arena.get_mut(lib).variable_mut("library_type").add("shared");
        assert_eq!(
            arena.find_variable_value_recursive(src, "library_type"),
            Some("shared".to_owned())
        );
        assert_eq!(arena.find_variable_value_recursive(src, "absent"), None);
    }
}
