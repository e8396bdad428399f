//! Toolsets: named groups of tools activated together.

use std::collections::BTreeMap;

use crate::core::tool::{ToolArena, ToolId};
use crate::util::text;

/// Index into the toolset arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ToolsetId(pub u32);

/// A named group of tools with a replacement tag. Within one scope only one
/// toolset per tag is active; enabling another replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolset {
    name: String,
    tag: String,
    tools: BTreeMap<String, ToolId>,
    lib_search_path: Vec<String>,
    pkg_search_path: Vec<String>,
}

impl Toolset {
    pub fn new(name: impl Into<String>) -> Toolset {
        Toolset {
            name: name.into(),
            tag: String::new(),
            tools: BTreeMap::new(),
            lib_search_path: Vec::new(),
            pkg_search_path: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = tag.into();
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Register a tool under its name, replacing any previous one.
    pub fn add_tool(&mut self, tools: &ToolArena, id: ToolId) {
        self.tools.insert(tools.get(id).name().to_owned(), id);
    }

    pub fn has_tool(&self, id: ToolId) -> bool {
        self.tools.values().any(|t| *t == id)
    }

    pub fn find_tool(&self, name: &str) -> Option<ToolId> {
        self.tools.get(name).copied()
    }

    pub fn tools(&self) -> impl Iterator<Item = ToolId> + '_ {
        self.tools.values().copied()
    }

    /// Colon-separated additions to the library search path.
    pub fn add_lib_search_path(&mut self, p: &str) {
        text::split_append(&mut self.lib_search_path, p, ':');
    }

    /// Colon-separated additions to the pkg-config search path.
    pub fn add_pkg_search_path(&mut self, p: &str) {
        text::split_append(&mut self.pkg_search_path, p, ':');
    }

    pub fn lib_search_path(&self) -> &[String] {
        &self.lib_search_path
    }

    pub fn pkg_search_path(&self) -> &[String] {
        &self.pkg_search_path
    }
}

/// Owning arena for toolsets.
#[derive(Debug, Default)]
pub struct ToolsetArena {
    sets: Vec<Toolset>,
}

impl ToolsetArena {
    pub fn new() -> ToolsetArena {
        ToolsetArena::default()
    }

    pub fn add(&mut self, ts: Toolset) -> ToolsetId {
        let id = ToolsetId(self.sets.len() as u32);
        self.sets.push(ts);
        id
    }

    pub fn get(&self, id: ToolsetId) -> &Toolset {
        &self.sets[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ToolsetId) -> &mut Toolset {
        &mut self.sets[id.0 as usize]
    }
}

/// Merge `extra` onto `active`: same-tag entries are replaced, new tags are
/// appended. This is how a configuration's pseudo-scope swaps toolchains.
pub fn modify_active(active: &mut Vec<ToolsetId>, extra: &[ToolsetId], arena: &ToolsetArena) {
    for ts in extra {
        let tag = arena.get(*ts).tag().to_owned();
        let mut replaced = false;
        for cur in active.iter_mut() {
            if arena.get(*cur).tag() == tag {
                if *cur != *ts {
                    tracing::debug!(
                        "replacing toolset '{}' with '{}'",
                        arena.get(*cur).name(),
                        arena.get(*ts).name()
                    );
                }
                *cur = *ts;
                replaced = true;
            }
        }
        if !replaced {
            active.push(*ts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tool::Tool;

    #[test]
    fn test_add_tool_replaces_by_name() {
        let mut tools = ToolArena::new();
        let a = tools.add(Tool::new("cc", "gcc"));
        let b = tools.add(Tool::new("cc", "gcc"));
        let mut ts = Toolset::new("gcc");
        ts.add_tool(&tools, a);
        ts.add_tool(&tools, b);
        assert_eq!(ts.find_tool("gcc"), Some(b));
        assert!(!ts.has_tool(a));
    }

    #[test]
    fn test_search_paths_split_on_colon() {
        let mut ts = Toolset::new("local");
        ts.add_lib_search_path("/opt/lib:/usr/lib");
        assert_eq!(ts.lib_search_path(), ["/opt/lib", "/usr/lib"]);
    }

    #[test]
    fn test_modify_active_replaces_same_tag() {
        let mut arena = ToolsetArena::new();
        let mut gcc = Toolset::new("gcc");
        gcc.set_tag("compile");
        let mut clang = Toolset::new("clang");
        clang.set_tag("compile");
        let mut ar = Toolset::new("ar");
        ar.set_tag("archive");
        let gcc = arena.add(gcc);
        let clang = arena.add(clang);
        let ar = arena.add(ar);

        let mut active = vec![gcc];
        modify_active(&mut active, &[clang, ar], &arena);
        assert_eq!(active, vec![clang, ar]);
    }
}
