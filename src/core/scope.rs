//! Scopes: nested containers of variables, options, items, tools, toolsets
//! and pools, mirroring the project-file directory tree.

use anyhow::Result;

use crate::core::error::BuildError;
use crate::core::item::ItemId;
use crate::core::pool::Pool;
#[cfg(test)]
use crate::core::tool::Tool;
use crate::core::tool::{ToolArena, ToolId};
use crate::core::toolset::{ToolsetArena, ToolsetId};
use crate::core::variable::VariableSet;

use std::collections::BTreeMap;

/// Index into the scope arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Default)]
pub struct Scope {
    parent: Option<ScopeId>,
    pub sub_scopes: Vec<ScopeId>,

    pub variables: VariableSet,
    pub options: VariableSet,
    pub items: Vec<ItemId>,

    /// insertion-ordered tool list
    pub tools: Vec<ToolId>,
    /// tag -> tools carrying that tag
    pub tools_by_tag: BTreeMap<String, Vec<ToolId>>,
    /// extension -> preferred tool, for adoption comparison and lookup
    pub extension_map: BTreeMap<String, ToolId>,

    pub toolsets: BTreeMap<String, ToolsetId>,
    pub enabled_toolsets: Vec<ToolsetId>,

    pub pools: Vec<Pool>,
}

impl Scope {
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    /// Register a tool. A `(tag, name)` pair already present is replaced in
    /// every index rather than duplicated.
    pub fn add_tool(&mut self, arena: &ToolArena, id: ToolId) {
        let (tag, name) = {
            let t = arena.get(id);
            (t.tag().to_owned(), t.name().to_owned())
        };
        let mut replaced = false;
        for cur in self.tools.iter_mut() {
            let c = arena.get(*cur);
            if c.tag() == tag && c.name() == name {
                tracing::debug!("overriding tool '{}'", name);
                *cur = id;
                replaced = true;
                break;
            }
        }
        if replaced {
            if let Some(list) = self.tools_by_tag.get_mut(&tag) {
                for cur in list.iter_mut() {
                    if arena.get(*cur).name() == name {
                        *cur = id;
                    }
                }
            }
        } else {
            self.tools.push(id);
            self.tools_by_tag.entry(tag).or_default().push(id);
        }
        for ext in arena.get(id).extensions() {
            self.extension_map.insert(ext.clone(), id);
        }
    }

    /// First registered tool handling the given extension.
    pub fn find_tool_for_ext(&self, arena: &ToolArena, ext: &str) -> Option<ToolId> {
        self.tools
            .iter()
            .copied()
            .find(|t| arena.get(*t).handles_extension(ext))
    }

    pub fn find_tool_by_name(&self, arena: &ToolArena, name: &str) -> Option<ToolId> {
        self.tools
            .iter()
            .copied()
            .find(|t| arena.get(*t).name() == name)
    }

    pub fn add_toolset(&mut self, arena: &ToolsetArena, id: ToolsetId) -> Result<()> {
        let name = arena.get(id).name().to_owned();
        if self.toolsets.contains_key(&name) {
            return Err(BuildError::Duplicate {
                kind: "toolset",
                name,
            }
            .into());
        }
        self.toolsets.insert(name, id);
        Ok(())
    }

    pub fn find_toolset(&self, name: &str) -> Option<ToolsetId> {
        self.toolsets.get(name).copied()
    }

    /// Enable a toolset; any enabled toolset with the same tag is replaced.
    pub fn use_toolset(&mut self, arena: &ToolsetArena, name: &str) -> Result<()> {
        let id = self.find_toolset(name).ok_or_else(|| BuildError::State(format!(
            "unable to find toolset '{name}' definition"
        )))?;
        let tag = arena.get(id).tag().to_owned();
        for cur in self.enabled_toolsets.iter_mut() {
            if *cur == id {
                return Ok(());
            }
            if arena.get(*cur).tag() == tag {
                tracing::debug!(
                    "replacing toolset '{}' with '{}'",
                    arena.get(*cur).name(),
                    name
                );
                *cur = id;
                return Ok(());
            }
        }
        self.enabled_toolsets.push(id);
        Ok(())
    }

    pub fn add_pool(&mut self, pool: Pool) -> Result<()> {
        if self.pools.iter().any(|p| p.name() == pool.name()) {
            return Err(BuildError::Duplicate {
                kind: "pool",
                name: pool.name().to_owned(),
            }
            .into());
        }
        self.pools.push(pool);
        Ok(())
    }

    /// Register an item; an item appears in a scope at most once.
    pub fn add_item(&mut self, id: ItemId) {
        if !self.items.contains(&id) {
            self.items.push(id);
        }
    }

    pub fn remove_item(&mut self, id: ItemId) {
        self.items.retain(|i| *i != id);
    }
}

/// Owning arena for scopes plus the active-scope stack.
#[derive(Debug)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
    stack: Vec<ScopeId>,
}

impl ScopeArena {
    /// Creates the arena with an empty root scope on the stack.
    pub fn new() -> ScopeArena {
        ScopeArena {
            scopes: vec![Scope::default()],
            stack: vec![ScopeId(0)],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn current(&self) -> ScopeId {
        *self.stack.last().expect("scope stack can never be empty")
    }

    /// Create a child scope; with `inherits` the parent's tool/toolset/
    /// variable state is carried over.
    pub fn new_sub_scope(&mut self, parent: ScopeId, inherits: bool) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        let mut s = Scope {
            parent: Some(parent),
            ..Scope::default()
        };
        if inherits {
            let p = self.get(parent);
            s.variables = p.variables.clone();
            s.options = p.options.clone();
            s.tools = p.tools.clone();
            s.tools_by_tag = p.tools_by_tag.clone();
            s.extension_map = p.extension_map.clone();
            s.toolsets = p.toolsets.clone();
            s.enabled_toolsets = p.enabled_toolsets.clone();
            s.pools = p.pools.clone();
        }
        self.scopes.push(s);
        self.get_mut(parent).sub_scopes.push(id);
        id
    }

    /// Detach a child from its parent (used for configuration
    /// pseudo-scopes, which live outside the tree).
    pub fn detach(&mut self, parent: ScopeId, child: ScopeId) {
        self.get_mut(parent).sub_scopes.retain(|s| *s != child);
    }

    pub fn push(&mut self, id: ScopeId) {
        self.stack.push(id);
    }

    /// Pop the active scope. With `adopt`, the parent absorbs the child when
    /// the child only accumulated items and tools; a child that diverged in
    /// variables, options, toolsets, pools or extension mappings stays a
    /// distinct sub-scope.
    pub fn pop(&mut self, adopt: bool) -> Result<()> {
        if self.stack.len() <= 1 {
            return Err(BuildError::State(
                "unbalanced scope management -- too many pops for pushes".into(),
            )
            .into());
        }
        let child = self.stack.pop().expect("checked above");
        if adopt {
            if let Some(parent) = self.get(child).parent() {
                self.check_adopt(parent, child);
            }
        }
        Ok(())
    }

    fn check_adopt(&mut self, parent: ScopeId, child: ScopeId) -> bool {
        {
            let (p, c) = (self.get(parent), self.get(child));
            let same = c.variables == p.variables
                && c.options == p.options
                && c.toolsets == p.toolsets
                && c.enabled_toolsets == p.enabled_toolsets
                && c.extension_map == p.extension_map
                && c.pools == p.pools;
            if !same {
                return false;
            }
        }
        let (child_tools, child_tags, child_items, child_subs) = {
            let c = self.get_mut(child);
            (
                std::mem::take(&mut c.tools),
                std::mem::take(&mut c.tools_by_tag),
                std::mem::take(&mut c.items),
                std::mem::take(&mut c.sub_scopes),
            )
        };
        {
            let p = self.get_mut(parent);
            for t in child_tools {
                if !p.tools.contains(&t) {
                    p.tools.push(t);
                }
            }
            for (tag, list) in child_tags {
                let entry = p.tools_by_tag.entry(tag).or_default();
                for t in list {
                    if !entry.contains(&t) {
                        entry.push(t);
                    }
                }
            }
            for i in child_items {
                if !p.items.contains(&i) {
                    p.items.push(i);
                }
            }
            p.sub_scopes.retain(|s| *s != child);
            p.sub_scopes.extend(child_subs.iter().copied());
        }
        for s in child_subs {
            self.get_mut(s).parent = Some(parent);
        }
        true
    }
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::item::{ItemArena, ItemKind};
    use crate::util::paths::Directory;

    #[test]
    fn test_tool_replacement_by_tag_name() {
        let mut tools = ToolArena::new();
        let mut scopes = ScopeArena::new();
        let root = scopes.root();

        let mut old = Tool::new("cc", "gcc");
        old.set_extensions(vec![".c".into()]);
        let old = tools.add(old);
        let mut newer = Tool::new("cc", "gcc");
        newer.set_extensions(vec![".c".into()]);
        let newer = tools.add(newer);
        let other = tools.add(Tool::new("cc", "clang"));

        scopes.get_mut(root).add_tool(&tools, old);
        scopes.get_mut(root).add_tool(&tools, other);
        scopes.get_mut(root).add_tool(&tools, newer);

        let s = scopes.get(root);
        assert_eq!(s.tools.len(), 2);
        assert_eq!(s.tools_by_tag["cc"], vec![newer, other]);
        assert_eq!(s.find_tool_for_ext(&tools, ".c"), Some(newer));
    }

    #[test]
    fn test_pool_duplicate_rejected() {
        let mut scopes = ScopeArena::new();
        let root = scopes.root();
        scopes.get_mut(root).add_pool(Pool::new("heavy", 2)).unwrap();
        let err = scopes.get_mut(root).add_pool(Pool::new("heavy", 4)).unwrap_err();
        assert!(err.to_string().contains("duplicate pool"));
        assert_eq!(scopes.get(root).pools.len(), 1);
    }

    #[test]
    fn test_pop_unbalanced_fails() {
        let mut scopes = ScopeArena::new();
        assert!(scopes.pop(false).is_err());
    }

    #[test]
    fn test_adoption_absorbs_clean_child() {
        let mut scopes = ScopeArena::new();
        let mut items = ItemArena::new();
        let root = scopes.root();
        let child = scopes.new_sub_scope(root, true);
        scopes.push(child);

        let it = items
            .add("main.c", Directory::from_root("/src"), ItemKind::Source)
            .unwrap();
        scopes.get_mut(child).add_item(it);
        scopes.pop(true).unwrap();

        assert!(scopes.get(root).items.contains(&it));
        assert!(scopes.get(root).sub_scopes.is_empty());
    }

    #[test]
    fn test_adoption_keeps_diverged_child() {
        let mut scopes = ScopeArena::new();
        let root = scopes.root();
        let child = scopes.new_sub_scope(root, true);
        scopes.push(child);
        crate::core::variable::entry(&mut scopes.get_mut(child).variables, "defines").add("X");
        scopes.pop(true).unwrap();

        assert_eq!(scopes.get(root).sub_scopes, vec![child]);
        assert!(scopes.get(root).variables.is_empty());
    }
}
