//! The output container of a transform pass.

use std::collections::{BTreeSet, HashMap};

use crate::core::item::ItemId;
use crate::core::pool::Pool;
use crate::core::tool::{ToolArena, ToolId};
use crate::core::variable::{self, VariableSet};
use crate::transform::build_item::{BuildArena, BuildId};
use crate::util::paths::Directory;

/// Chain bookkeeping attached to a transformed item: the terminal outputs a
/// parent links against, the tool tags that produced them, and the
/// tool-bearing steps flags propagate onto.
#[derive(Debug, Clone, Default)]
pub struct ChainInfo {
    pub terminals: Vec<BuildId>,
    pub tags: BTreeSet<String>,
    pub compiles: Vec<BuildId>,
}

/// Per-scope result of lowering under one configuration: resolved tools,
/// merged variables, pools, search paths, and the build-item graph.
#[derive(Debug)]
pub struct TransformSet {
    out_dir: Directory,
    bin_dir: Directory,
    lib_dir: Directory,
    artifact_dir: Directory,
    system: String,

    tools: Vec<ToolId>,
    pub vars: VariableSet,
    pub options: VariableSet,
    pub pools: Vec<Pool>,
    lib_search_path: Vec<String>,
    pkg_search_path: Vec<String>,

    pub builds: BuildArena,
    transformed: HashMap<ItemId, BuildId>,
    /// `(dir, name)` -> first stage, so chain expansion never duplicates
    chain_cache: HashMap<(String, String), BuildId>,
    chain_info: HashMap<BuildId, ChainInfo>,

    pub children: Vec<TransformSet>,
}

impl TransformSet {
    pub fn new(out_dir: Directory, system: impl Into<String>) -> TransformSet {
        let mut out_dir = out_dir;
        out_dir.promote_full();
        let sub = |name: &str| {
            let mut d = out_dir.clone();
            d.cd(name).expect("static subdirectory name");
            d.promote_full();
            d
        };
        let bin_dir = sub("bin");
        let lib_dir = sub("lib");
        let artifact_dir = sub("artifacts");
        TransformSet {
            out_dir,
            bin_dir,
            lib_dir,
            artifact_dir,
            system: system.into(),
            tools: Vec::new(),
            vars: VariableSet::new(),
            options: VariableSet::new(),
            pools: Vec::new(),
            lib_search_path: Vec::new(),
            pkg_search_path: Vec::new(),
            builds: BuildArena::new(),
            transformed: HashMap::new(),
            chain_cache: HashMap::new(),
            chain_info: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn out_dir(&self) -> &Directory {
        &self.out_dir
    }

    pub fn bin_dir(&self) -> &Directory {
        &self.bin_dir
    }

    pub fn lib_dir(&self) -> &Directory {
        &self.lib_dir
    }

    pub fn artifact_dir(&self) -> &Directory {
        &self.artifact_dir
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn add_tool(&mut self, id: ToolId) {
        self.tools.push(id);
    }

    pub fn tools(&self) -> &[ToolId] {
        &self.tools
    }

    /// First tool handling an extension.
    pub fn find_tool(&self, arena: &ToolArena, ext: &str) -> Option<ToolId> {
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

    /// Tool with an exact tag, preferring one that also handles `ext`;
    /// falls back to the plain extension search.
    pub fn find_tool_by_tag(&self, arena: &ToolArena, tag: &str, ext: &str) -> Option<ToolId> {
        if let Some(t) = self
            .tools
            .iter()
            .copied()
            .find(|t| arena.get(*t).tag() == tag && arena.get(*t).handles_extension(ext))
        {
            return Some(t);
        }
        if ext.is_empty() {
            if let Some(t) = self.tools.iter().copied().find(|t| arena.get(*t).tag() == tag) {
                return Some(t);
            }
        }
        tracing::debug!("tool tag '{tag}' not found for extension '{ext}', falling back");
        self.find_tool(arena, ext)
    }

    /// The tool whose tag starts with `tag_prefix` and whose accepted input
    /// tools cover every tag in `set`; this is linker/archiver selection.
    pub fn find_tool_for_set(
        &self,
        arena: &ToolArena,
        tag_prefix: &str,
        set: &BTreeSet<String>,
    ) -> Option<ToolId> {
        self.tools.iter().copied().find(|t| {
            let tool = arena.get(*t);
            tool.tag().starts_with(tag_prefix) && tool.handles_tools(set)
        })
    }

    /// Overlay variables onto the set; later merges win on conflict, so the
    /// configuration pseudo-scope is merged after the scope base.
    pub fn merge_variables(&mut self, vs: &VariableSet) {
        variable::overlay(&mut self.vars, vs);
    }

    pub fn merge_options(&mut self, vs: &VariableSet) {
        variable::overlay(&mut self.options, vs);
    }

    pub fn var_value(&self, name: &str) -> String {
        self.vars
            .get(name)
            .map(|v| v.value(Some(&self.system)))
            .unwrap_or_default()
    }

    pub fn option_value(&self, name: &str) -> String {
        self.options
            .get(name)
            .map(|v| v.value(Some(&self.system)))
            .unwrap_or_default()
    }

    pub fn set_lib_search_path(&mut self, p: Vec<String>) {
        self.lib_search_path = p;
    }

    pub fn set_pkg_search_path(&mut self, p: Vec<String>) {
        self.pkg_search_path = p;
    }

    pub fn lib_search_path(&self) -> &[String] {
        &self.lib_search_path
    }

    pub fn pkg_search_path(&self) -> &[String] {
        &self.pkg_search_path
    }

    pub fn add_pool(&mut self, p: Pool) {
        if !self.pools.iter().any(|e| e.name() == p.name()) {
            self.pools.push(p);
        }
    }

    pub fn is_transformed(&self, item: ItemId) -> bool {
        self.transformed.contains_key(&item)
    }

    /// The memoized image of an item, stable across repeated transforms.
    pub fn get_transform(&self, item: ItemId) -> Option<BuildId> {
        self.transformed.get(&item).copied()
    }

    pub fn record_transform(&mut self, item: ItemId, build: BuildId) {
        self.transformed.insert(item, build);
    }

    pub fn transformed(&self) -> impl Iterator<Item = (ItemId, BuildId)> + '_ {
        self.transformed.iter().map(|(i, b)| (*i, *b))
    }

    pub fn chain_cached(&self, dir: &Directory, name: &str) -> Option<BuildId> {
        self.chain_cache.get(&(dir.fullpath(), name.to_owned())).copied()
    }

    pub fn record_chain(&mut self, dir: &Directory, name: &str, build: BuildId) {
        self.chain_cache.insert((dir.fullpath(), name.to_owned()), build);
    }

    pub fn chain_info(&self, build: BuildId) -> Option<&ChainInfo> {
        self.chain_info.get(&build)
    }

    pub fn record_chain_info(&mut self, build: BuildId, info: ChainInfo) {
        self.chain_info.insert(build, info);
    }

    pub fn add_child(&mut self, child: TransformSet) {
        self.children.push(child);
    }
}
