//! The binding surface.
//!
//! Everything a project-file host may do is a method here, operating on the
//! current scope and configuration state in the [`Context`]. The loader is
//! one consumer; tests drive this API directly. Ownership of items, tools
//! and scopes always stays on this side of the boundary.

use anyhow::Result;

use crate::core::configuration::Configuration;
use crate::core::context::Context;
use crate::core::dependency::DepKind;
use crate::core::error::BuildError;
use crate::core::item::{
    CodeGenPayload, ItemId, ItemKind, LibraryKind, OptionalPayload,
};
use crate::core::pool::Pool;
use crate::core::tool::{Tool, ToolSpec};
use crate::core::toolset::{Toolset, ToolsetId};
use crate::core::variable;
use crate::pkg::version;

/// The host-facing API. Holds the context for the duration of a project
/// load plus the small amount of call-chaining state the bindings need.
#[derive(Debug)]
pub struct BuildApi {
    pub ctx: Context,
    /// target of `add_toolset` that `tag`/`toolset_tool`/search-path calls
    /// chain onto
    last_toolset: Option<ToolsetId>,
}

impl BuildApi {
    pub fn new(ctx: Context) -> BuildApi {
        BuildApi {
            ctx,
            last_toolset: None,
        }
    }

    pub fn into_context(self) -> Context {
        self.ctx
    }

    // ----- configurations -----

    pub fn configuration(&mut self, name: &str) -> Result<()> {
        self.ctx.configs.begin_creating();
        let parent = self.ctx.scopes.current();
        let pseudo = self.ctx.scopes.new_sub_scope(parent, true);
        self.ctx.scopes.detach(parent, pseudo);
        let conf = Configuration::new(name, pseudo);
        let result = conf.and_then(|c| self.ctx.configs.add(c));
        self.ctx.configs.finish_creating();
        result
    }

    pub fn default_configuration(&mut self, name: &str) -> Result<()> {
        if self.ctx.configs.find_mut(name).is_none() {
            return Err(BuildError::State(format!(
                "cannot default to unknown configuration '{name}'"
            ))
            .into());
        }
        self.ctx.configs.set_default(name);
        Ok(())
    }

    /// Target-system override for the configuration being defined.
    pub fn system(&mut self, name: &str) -> Result<()> {
        self.ctx.configs.last_mut()?.set_system(name);
        Ok(())
    }

    pub fn skip_on_error(&mut self, b: bool) -> Result<()> {
        self.ctx.configs.last_mut()?.set_skip_on_error(b);
        Ok(())
    }

    // ----- variables and options -----

    pub fn set_option(&mut self, name: &str, value: &str) {
        let scope = self.ctx.current_scope();
        let opts = &mut self.ctx.scopes.get_mut(scope).options;
        variable::entry(opts, name).reset([value]);
    }

    pub fn defines<I, S>(&mut self, vals: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scope = self.ctx.current_scope();
        let vars = &mut self.ctx.scopes.get_mut(scope).variables;
        let v = variable::entry(vars, "defines");
        v.set_tool_tag("cc");
        v.add_many(vals);
    }

    pub fn system_defines<I, S>(&mut self, system: &str, vals: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scope = self.ctx.current_scope();
        let vars = &mut self.ctx.scopes.get_mut(scope).variables;
        let v = variable::entry(vars, "defines");
        v.set_tool_tag("cc");
        for val in vals {
            v.add_system(system, val);
        }
    }

    pub fn includes<I, S>(&mut self, dirs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let abs: Vec<String> = {
            let cur = self.ctx.dirs.current();
            dirs.into_iter()
                .map(|d| {
                    let d = d.into();
                    if d.starts_with('/') || d.starts_with('$') {
                        d
                    } else {
                        cur.makefilename(&d)
                    }
                })
                .collect()
        };
        let scope = self.ctx.current_scope();
        let vars = &mut self.ctx.scopes.get_mut(scope).variables;
        let v = variable::entry(vars, "includes");
        v.set_tool_tag("cc");
        v.add_many(abs);
    }

    pub fn default_library_kind(&mut self, kind: &str) -> Result<()> {
        LibraryKind::parse(kind).ok_or_else(|| {
            BuildError::Malformed(format!("unknown library kind '{kind}'"))
        })?;
        let scope = self.ctx.current_scope();
        let vars = &mut self.ctx.scopes.get_mut(scope).variables;
        variable::entry(vars, "default_library_type").reset([kind]);
        Ok(())
    }

    pub fn default_executable_kind(&mut self, kind: &str) {
        let scope = self.ctx.current_scope();
        let vars = &mut self.ctx.scopes.get_mut(scope).variables;
        variable::entry(vars, "default_executable_kind").reset([kind]);
    }

    // ----- pools and tools -----

    pub fn pool(&mut self, name: &str, jobs: u32) -> Result<()> {
        let scope = self.ctx.current_scope();
        self.ctx.scopes.get_mut(scope).add_pool(Pool::new(name, jobs))
    }

    /// Register a tool from its declarative (JSON table) description.
    pub fn add_tool(&mut self, spec: ToolSpec) -> Result<()> {
        let exe_item = match &spec.exe_item {
            Some(name) => Some(self.ctx.items.find_by_name(name).ok_or_else(|| {
                BuildError::Malformed(format!(
                    "tool '{}' references unknown item '{}' as its executable",
                    spec.name, name
                ))
            })?),
            None => None,
        };
        let tool = Tool::from_spec(spec, exe_item)?;
        let id = self.ctx.tools.add(tool);
        let scope = self.ctx.current_scope();
        self.ctx.scopes.get_mut(scope).add_tool(&self.ctx.tools, id);
        if let Some(ts) = self.last_toolset {
            self.ctx.toolsets.get_mut(ts).add_tool(&self.ctx.tools, id);
        }
        Ok(())
    }

    pub fn add_toolset(&mut self, name: &str) -> Result<()> {
        let id = self.ctx.toolsets.add(Toolset::new(name));
        let scope = self.ctx.current_scope();
        self.ctx.scopes.get_mut(scope).add_toolset(&self.ctx.toolsets, id)?;
        self.last_toolset = Some(id);
        Ok(())
    }

    fn chained_toolset(&mut self) -> Result<ToolsetId> {
        self.last_toolset.ok_or_else(|| {
            BuildError::State("no toolset is being defined; call add_toolset first".into()).into()
        })
    }

    pub fn tag(&mut self, tag: &str) -> Result<()> {
        let ts = self.chained_toolset()?;
        self.ctx.toolsets.get_mut(ts).set_tag(tag);
        Ok(())
    }

    /// Add an already registered tool (by name) to the toolset being
    /// defined.
    pub fn toolset_tool(&mut self, tool_name: &str) -> Result<()> {
        let scope = self.ctx.current_scope();
        let tool = self
            .ctx
            .scopes
            .get(scope)
            .find_tool_by_name(&self.ctx.tools, tool_name)
            .ok_or_else(|| BuildError::NoTool(format!("unknown tool '{tool_name}'")))?;
        let ts = self.chained_toolset()?;
        self.ctx.toolsets.get_mut(ts).add_tool(&self.ctx.tools, tool);
        Ok(())
    }

    pub fn lib_search_path(&mut self, path: &str) -> Result<()> {
        let ts = self.chained_toolset()?;
        self.ctx.toolsets.get_mut(ts).add_lib_search_path(path);
        Ok(())
    }

    pub fn pkg_search_path(&mut self, path: &str) -> Result<()> {
        let ts = self.chained_toolset()?;
        self.ctx.toolsets.get_mut(ts).add_pkg_search_path(path);
        Ok(())
    }

    /// Enable a toolset in the current scope (replacing same-tagged ones).
    pub fn use_toolset(&mut self, name: &str) -> Result<()> {
        let scope = self.ctx.current_scope();
        self.ctx.scopes.get_mut(scope).use_toolset(&self.ctx.toolsets, name)
    }

    pub fn tool_option(
        &mut self,
        tool: &str,
        group: &str,
        choice: &str,
        cmd: Vec<String>,
    ) -> Result<()> {
        let scope = self.ctx.current_scope();
        let id = self
            .ctx
            .scopes
            .get(scope)
            .find_tool_by_name(&self.ctx.tools, tool)
            .ok_or_else(|| BuildError::NoTool(format!("unknown tool '{tool}'")))?;
        self.ctx.tools.get_mut(id).add_option(group, choice, cmd)
    }

    // ----- items -----

    fn check_duplicate_target(&self, name: &str) -> Result<()> {
        if let Some(existing) = self.ctx.items.find_by_name(name) {
            if matches!(
                self.ctx.items.get(existing).kind,
                ItemKind::Executable { .. } | ItemKind::Library { .. }
            ) {
                return Err(BuildError::Duplicate {
                    kind: "target",
                    name: name.to_owned(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn add_target(&mut self, name: &str, kind: ItemKind) -> Result<ItemId> {
        self.ctx.configs.check_default()?;
        self.check_duplicate_target(name)?;
        let dir = self.ctx.dirs.current().clone();
        let id = self.ctx.items.add(name, dir, kind)?;
        {
            let item = self.ctx.items.get_mut(id);
            item.set_top_level(true);
            item.set_use_name_as_input(false);
            item.set_default_target(true);
        }
        let scope = self.ctx.current_scope();
        self.ctx.scopes.get_mut(scope).add_item(id);
        Ok(id)
    }

    pub fn executable(&mut self, name: &str) -> Result<ItemId> {
        self.add_target(name, ItemKind::Executable { children: vec![] })
    }

    pub fn library(&mut self, name: &str) -> Result<ItemId> {
        self.add_target(name, ItemKind::Library { children: vec![], kind: None })
    }

    pub fn kind(&mut self, target: ItemId, k: &str) -> Result<()> {
        let parsed = LibraryKind::parse(k).ok_or_else(|| {
            BuildError::Malformed(format!("unknown library kind '{k}'"))
        })?;
        match &mut self.ctx.items.get_mut(target).kind {
            ItemKind::Library { kind, .. } => {
                *kind = Some(parsed);
                Ok(())
            }
            _ => Err(BuildError::State("kind() applies to libraries only".into()).into()),
        }
    }

    /// A compile set over named source files in the current directory.
    pub fn source<I, S>(&mut self, names: I) -> Result<ItemId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let dir = self.ctx.dirs.current().clone();
        let set = self
            .ctx
            .items
            .add("__source__", dir, ItemKind::CompileSet { children: vec![] })?;
        for n in names {
            self.ctx.items.add_source_child(set, n.as_ref())?;
        }
        Ok(set)
    }

    /// Attach one argument to a target: an existing file becomes a source,
    /// a glob pattern expands to sources, a known item (library, generator,
    /// ...) becomes a child.
    pub fn target_add(&mut self, target: ItemId, arg: &str) -> Result<()> {
        let dir = self.ctx.items.get(target).dir().clone();
        if dir.exists(arg) {
            self.ctx.items.add_source_child(target, arg)?;
            return Ok(());
        }
        if arg.contains(['*', '?', '[']) {
            let matches = self.glob_files(arg)?;
            if matches.is_empty() {
                return Err(BuildError::MissingSource {
                    name: arg.to_owned(),
                    dir: dir.fullpath(),
                }
                .into());
            }
            for m in matches {
                self.ctx.items.add_source_child(target, &m)?;
            }
            return Ok(());
        }
        match self.ctx.items.find_by_name(arg) {
            Some(child) => self.ctx.items.add_child(target, child),
            None => Err(BuildError::MissingSource {
                name: arg.to_owned(),
                dir: dir.fullpath(),
            }
            .into()),
        }
    }

    /// Expand a glob pattern relative to the current directory, returning
    /// paths relative to it (sorted, files only).
    pub fn glob_files(&self, pattern: &str) -> Result<Vec<String>> {
        let cur = self.ctx.dirs.current();
        let full = cur.makefilename(pattern);
        let base = cur.fullpath();
        let mut out = Vec::new();
        for entry in glob::glob(&full)
            .map_err(|e| BuildError::Malformed(format!("invalid glob pattern '{pattern}': {e}")))?
        {
            match entry {
                Ok(path) if path.is_file() => {
                    let p = path.to_string_lossy().into_owned();
                    out.push(
                        p.strip_prefix(&format!("{base}/"))
                            .map(str::to_owned)
                            .unwrap_or(p),
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("glob error: {e}"),
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    pub fn target_add_item(&mut self, target: ItemId, child: ItemId) -> Result<()> {
        self.ctx.items.add_child(target, child)
    }

    /// Link named project libraries into a target.
    pub fn libs(&mut self, target: ItemId, names: &[String]) -> Result<()> {
        for name in names {
            let child = self.ctx.items.find_by_name(name).ok_or_else(|| {
                BuildError::MissingSource {
                    name: name.clone(),
                    dir: "library registry".to_owned(),
                }
            })?;
            self.ctx.items.add_child(target, child)?;
        }
        Ok(())
    }

    /// Drop a target whose item list ended up empty; no build item will be
    /// produced for it.
    pub fn finish_target(&mut self, target: ItemId) -> Result<()> {
        let empty = self.ctx.items.get(target).kind.children().is_empty();
        if empty {
            tracing::warn!(
                "target '{}' has no items and will be ignored",
                self.ctx.items.get(target).name()
            );
            let scope = self.ctx.current_scope();
            self.ctx.scopes.get_mut(scope).remove_item(target);
        }
        Ok(())
    }

    /// Conditionally included sources (`system` plus external libraries).
    pub fn optional_source(&mut self, payload: OptionalSpec) -> Result<ItemId> {
        let dir = self.ctx.dirs.current().clone();
        let id = self.ctx.items.add(
            "__optional__",
            dir,
            ItemKind::OptionalSource(OptionalPayload::default()),
        )?;
        self.fill_optional(id, payload)?;
        Ok(id)
    }

    /// External libraries guarded by system conditions.
    pub fn external_lib(&mut self, payload: OptionalSpec) -> Result<ItemId> {
        let dir = self.ctx.dirs.current().clone();
        let id = self.ctx.items.add(
            "__extern_lib__",
            dir,
            ItemKind::ExternLibrarySet(OptionalPayload::default()),
        )?;
        self.fill_optional(id, payload)?;
        Ok(id)
    }

    fn fill_optional(&mut self, id: ItemId, payload: OptionalSpec) -> Result<()> {
        for src in &payload.source {
            self.ctx.items.add_source_child(id, src)?;
        }
        let item = self.ctx.items.get_mut(id);
        let p = match &mut item.kind {
            ItemKind::OptionalSource(p) | ItemKind::ExternLibrarySet(p) => p,
            _ => unreachable!("fill_optional on optional items only"),
        };
        if let Some(system) = payload.system {
            p.conditions.insert("system".to_owned(), system);
        }
        for lib in payload.libs {
            // validate the predicate early so errors name the project file
            if !lib.1.is_empty() {
                version::parse_predicate(&lib.1)?;
            }
            p.extern_libs.push(lib);
        }
        p.defines = payload.defines;
        p.required = payload.required;
        Ok(())
    }

    /// Resolve an external library now; fails when it cannot be found.
    pub fn required_library(&mut self, name: &str, req_version: &str) -> Result<ItemId> {
        let host = self.ctx.host_system().to_owned();
        let system = match self.ctx.configs.default() {
            Ok(c) => c.system(&host).to_owned(),
            Err(_) => host,
        };
        self.ctx
            .find_package(&system, name, req_version, &[], &[])?
            .ok_or_else(|| {
                BuildError::PackageNotFound {
                    name: name.to_owned(),
                    predicate: req_version.to_owned(),
                }
                .into()
            })
    }

    /// Resolve an external library, `None` when absent.
    pub fn sys_library(&mut self, name: &str, req_version: &str) -> Result<Option<ItemId>> {
        let host = self.ctx.host_system().to_owned();
        self.ctx.find_package(&host, name, req_version, &[], &[])
    }

    // ----- code generation -----

    pub fn code_create(&mut self, name: &str, lines: Vec<String>) -> Result<ItemId> {
        let dir = self.ctx.dirs.current().clone();
        let id = self.ctx.items.add(name, dir, ItemKind::CreateFile { lines })?;
        let scope = self.ctx.current_scope();
        self.ctx.scopes.get_mut(scope).add_item(id);
        Ok(id)
    }

    pub fn code_generate(&mut self, spec: CodeGenSpec) -> Result<ItemId> {
        let dir = self.ctx.dirs.current().clone();
        let payload = CodeGenPayload {
            children: Vec::new(),
            item_prefix: spec.item_prefix,
            item_suffix: spec.item_suffix,
            file_prefix: spec.file_prefix,
            file_suffix: spec.file_suffix,
            item_indent: spec.item_indent,
            comma_separate: spec.comma_separate,
        };
        let id = self
            .ctx
            .items
            .add(&spec.name, dir, ItemKind::CodeGenerator(payload))?;
        for src in &spec.source {
            self.ctx.items.add_source_child(id, src)?;
        }
        Ok(id)
    }

    pub fn code_filter(&mut self, spec: CodeFilterSpec) -> Result<ItemId> {
        let scope = self.ctx.current_scope();
        let tool = match &spec.tool {
            Some(name) => Some(
                self.ctx
                    .scopes
                    .get(scope)
                    .find_tool_by_name(&self.ctx.tools, name)
                    .ok_or_else(|| BuildError::NoTool(format!("unknown tool '{name}'")))?,
            ),
            None => None,
        };
        let dir = self.ctx.dirs.current().clone();
        let id = self.ctx.items.add(
            &spec.name,
            dir,
            ItemKind::CodeFilter {
                children: vec![],
                tool,
                outputs: spec.outputs,
            },
        )?;
        for src in &spec.source {
            self.ctx.items.add_source_child(id, src)?;
        }
        Ok(id)
    }

    // ----- item methods -----

    pub fn item_add_dependency(&mut self, item: ItemId, kind: &str, other: ItemId) -> Result<()> {
        let kind = DepKind::parse(kind).ok_or_else(|| {
            BuildError::Malformed(format!(
                "invalid dependency type '{kind}': expect explicit, implicit, order, or chain"
            ))
        })?;
        self.ctx.items.add_dependency(item, kind, other)
    }

    pub fn item_depends(&self, item: ItemId, other: ItemId) -> bool {
        self.ctx.items.has_dependency(item, other)
    }

    pub fn item_force_tool(&mut self, item: ItemId, ext: Option<&str>, tool: &str) -> Result<()> {
        self.ctx.items.get_mut(item).force_tool(ext, tool)
    }

    pub fn item_override_option(&mut self, item: ItemId, opt: &str, choice: &str) -> Result<()> {
        self.ctx.items.get_mut(item).override_tool_setting(opt, choice)
    }

    pub fn item_defines<I, S>(&mut self, item: ItemId, vals: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let v = self.ctx.items.get_mut(item).variable_mut("defines");
        v.set_tool_tag("cc");
        v.add_many(vals);
    }

    pub fn item_system_defines<I, S>(&mut self, item: ItemId, system: &str, vals: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let v = self.ctx.items.get_mut(item).variable_mut("defines");
        v.set_tool_tag("cc");
        for val in vals {
            v.add_system(system, val);
        }
    }

    pub fn item_includes<I, S>(&mut self, item: ItemId, dirs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let abs: Vec<String> = {
            let cur = self.ctx.items.get(item).dir().clone();
            dirs.into_iter()
                .map(|d| {
                    let d = d.into();
                    if d.starts_with('/') || d.starts_with('$') {
                        d
                    } else {
                        cur.makefilename(&d)
                    }
                })
                .collect()
        };
        let v = self.ctx.items.get_mut(item).variable_mut("includes");
        v.set_tool_tag("cc");
        v.add_many(abs);
    }

    /// Compile against the per-configuration artifact directory (where
    /// generated headers land).
    pub fn item_include_artifact_dir(&mut self, item: ItemId) {
        let v = self.ctx.items.get_mut(item).variable_mut("includes");
        v.set_tool_tag("cc");
        v.add_if_missing("$builddir/artifacts");
    }

    pub fn item_set_variable(&mut self, item: ItemId, name: &str, value: &str, split: bool) {
        self.ctx.items.get_mut(item).set_variable(name, value, split);
    }

    pub fn item_add_to_variable(&mut self, item: ItemId, name: &str, value: &str) {
        self.ctx.items.get_mut(item).variable_mut(name).add(value);
    }

    pub fn item_clear_variable(&mut self, item: ItemId, name: &str) {
        self.ctx.items.get_mut(item).variable_mut(name).clear();
    }

    pub fn item_inherit_variable(&mut self, item: ItemId, name: &str, inherit: bool) {
        self.ctx.items.get_mut(item).variable_mut(name).set_inherit(inherit);
    }

    pub fn item_variable_value(&self, item: ItemId, name: &str, system: Option<&str>) -> String {
        self.ctx
            .items
            .get(item)
            .variable(name)
            .map(|v| v.value(system))
            .unwrap_or_default()
    }

    pub fn item_set_top_level(&mut self, item: ItemId, b: bool) {
        self.ctx.items.get_mut(item).set_top_level(b);
    }

    pub fn item_set_default_target(&mut self, item: ItemId, b: bool) {
        self.ctx.items.get_mut(item).set_default_target(b);
    }

    pub fn item_set_pseudo_target(&mut self, item: ItemId, name: Option<&str>) {
        let pseudo = name
            .map(str::to_owned)
            .unwrap_or_else(|| self.ctx.items.get(item).name().to_owned());
        self.ctx.items.get_mut(item).set_pseudo_target(pseudo);
    }

    pub fn item_set_use_name_for_input(&mut self, item: ItemId, b: bool) {
        self.ctx.items.get_mut(item).set_use_name_as_input(b);
    }

    // ----- scopes and directories -----

    /// Enter the named sub-directory; with `fresh_scope` (sub-projects) a
    /// new inheriting scope is pushed as well.
    pub fn push_subdir(&mut self, name: &str, fresh_scope: bool) -> Result<()> {
        self.ctx.dirs.pushd(name)?;
        if fresh_scope {
            let parent = self.ctx.scopes.current();
            let sub = self.ctx.scopes.new_sub_scope(parent, true);
            self.ctx.scopes.push(sub);
        }
        Ok(())
    }

    /// Leave a sub-directory; a popped scope that only accumulated items
    /// and tools is folded back into its parent.
    pub fn pop_subdir(&mut self, fresh_scope: bool) -> Result<()> {
        if fresh_scope {
            self.ctx.scopes.pop(true)?;
        }
        self.ctx.dirs.popd()
    }

    /// Fail when any named dependency never resolved to a real item.
    pub fn check_dependencies(&self) -> Result<()> {
        self.ctx.items.check_dependencies()
    }

    // ----- file and system helpers -----

    pub fn file_exists(&self, name: &str) -> bool {
        self.ctx.dirs.current().exists(name)
    }

    pub fn file_basename(&self, name: &str) -> String {
        name.rsplit('/').next().unwrap_or(name).to_owned()
    }

    pub fn file_extension(&self, name: &str) -> String {
        crate::util::text::extension(name).to_owned()
    }

    pub fn file_replace_extension(&self, name: &str, ext: &str) -> String {
        crate::util::text::replace_extension(name, ext)
    }

    /// First of `names` that exists in the current directory.
    pub fn file_find(&self, names: &[String]) -> Option<String> {
        self.ctx.dirs.current().find(names)
    }

    /// Whether two files differ (byte-wise). Identical paths never differ.
    pub fn file_compare(&self, a: &str, b: &str) -> Result<bool> {
        if a == b {
            return Ok(false);
        }
        let read = |p: &str| {
            std::fs::read(self.ctx.dirs.current().makefilename(p))
                .map_err(|e| BuildError::State(format!("unable to open '{p}' for comparison: {e}")))
        };
        Ok(read(a)? != read(b)?)
    }

    /// Whether the file's content differs from the given lines. A missing
    /// file always differs.
    pub fn file_diff(&self, name: &str, lines: &[String]) -> bool {
        let path = self.ctx.dirs.current().makefilename(name);
        let mut fresh = String::new();
        for l in lines {
            fresh.push_str(l);
            fresh.push('\n');
        }
        match std::fs::read_to_string(path) {
            Ok(existing) => existing != fresh,
            Err(_) => true,
        }
    }

    pub fn file_find_exe(&self, name: &str) -> Option<String> {
        self.ctx
            .exe_search
            .find(name)
            .map(|p| p.to_string_lossy().into_owned())
    }

    /// Override the executable search path for subsequent probes.
    pub fn file_set_exe_path(&mut self, path: &str) {
        self.ctx
            .exe_search
            .set_path(crate::util::text::split(path, ':'));
    }

    pub fn sys_system(&self) -> &str {
        &self.ctx.sysinfo.system
    }

    pub fn sys_machine(&self) -> &str {
        &self.ctx.sysinfo.machine
    }

    pub fn sys_release(&self) -> &str {
        &self.ctx.sysinfo.release
    }

    pub fn sys_version(&self) -> &str {
        &self.ctx.sysinfo.version
    }

    pub fn sys_node(&self) -> &str {
        &self.ctx.sysinfo.node
    }

    pub fn sys_is_64bit(&self) -> bool {
        self.ctx.sysinfo.is_64bit
    }
}

/// Table argument of `optional_source` / `external_lib` / `system_libs`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptionalSpec {
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub source: Vec<String>,
    /// library names, optionally with a version predicate
    #[serde(default, deserialize_with = "de_libs")]
    pub libs: Vec<(String, String)>,
    #[serde(default)]
    pub defines: Vec<String>,
    #[serde(default)]
    pub required: bool,
}

fn de_libs<'de, D>(de: D) -> std::result::Result<Vec<(String, String)>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum LibEntry {
        Plain(String),
        Versioned(Vec<String>),
    }
    let raw: Vec<LibEntry> = serde::Deserialize::deserialize(de)?;
    let mut out = Vec::with_capacity(raw.len());
    for e in raw {
        match e {
            LibEntry::Plain(name) => out.push((name, String::new())),
            LibEntry::Versioned(mut parts) => {
                let name = if parts.is_empty() {
                    String::new()
                } else {
                    parts.remove(0)
                };
                let ver = parts.join(" ");
                out.push((name, ver));
            }
        }
    }
    Ok(out)
}

/// Table argument of `code_generate`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeGenSpec {
    pub name: String,
    #[serde(default)]
    pub source: Vec<String>,
    #[serde(default)]
    pub item_prefix: Vec<String>,
    #[serde(default)]
    pub item_suffix: Vec<String>,
    #[serde(default)]
    pub file_prefix: Vec<String>,
    #[serde(default)]
    pub file_suffix: Vec<String>,
    #[serde(default)]
    pub item_indent: Option<String>,
    #[serde(default)]
    pub comma_separate: bool,
}

/// Table argument of `code_filter`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeFilterSpec {
    pub name: String,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub source: Vec<String>,
}
