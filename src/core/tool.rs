//! Tools: tagged command templates.
//!
//! A tool knows which extensions it consumes, which extensions it produces,
//! which other tools' outputs it accepts (linker acceptance), its option
//! groups and defaults, and the command template a generator renders into an
//! executor rule.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::Deserialize;

use crate::core::error::BuildError;
use crate::core::item::ItemId;
use crate::util::text;

/// Index into the tool arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ToolId(pub u32);

/// What actually runs: a resolved path, or an item built by this very
/// project (code generators are the chicken-and-egg case).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolExe {
    #[default]
    None,
    Path(String),
    Generated(ItemId),
}

/// How a tool emits a dependency sidecar at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplicitDeps {
    /// sidecar filename template, e.g. `$out.d`
    pub file: String,
    /// dep style understood by the executor (`gcc`, `msvc`)
    pub style: String,
    /// extra command flags that make the tool write the sidecar
    pub flags: Vec<String>,
}

pub type OptionSet = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    tag: String,
    name: String,
    description: String,
    exe: ToolExe,
    extensions: Vec<String>,
    alt_extensions: Vec<String>,
    output_prefix: String,
    outputs: Vec<String>,
    input_tools: Vec<String>,
    options: BTreeMap<String, OptionSet>,
    option_defaults: BTreeMap<String, String>,
    flag_prefixes: BTreeMap<String, String>,
    implicit_deps: Option<ImplicitDeps>,
    command: Vec<String>,
    pool: Option<String>,
    language: Option<String>,
}

impl Tool {
    pub fn new(tag: impl Into<String>, name: impl Into<String>) -> Tool {
        Tool {
            tag: tag.into(),
            name: name.into(),
            description: String::new(),
            exe: ToolExe::None,
            extensions: Vec::new(),
            alt_extensions: Vec::new(),
            output_prefix: String::new(),
            outputs: Vec::new(),
            input_tools: Vec::new(),
            options: BTreeMap::new(),
            option_defaults: BTreeMap::new(),
            flag_prefixes: BTreeMap::new(),
            implicit_deps: None,
            command: Vec::new(),
            pool: None,
            language: None,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, d: impl Into<String>) {
        self.description = d.into();
    }

    pub fn exe(&self) -> &ToolExe {
        &self.exe
    }

    pub fn set_exe(&mut self, e: ToolExe) {
        self.exe = e;
    }

    /// The item that produces this tool's executable, when self-hosted.
    pub fn generated_exe(&self) -> Option<ItemId> {
        match self.exe {
            ToolExe::Generated(id) => Some(id),
            _ => None,
        }
    }

    pub fn set_extensions(&mut self, ext: Vec<String>) {
        self.extensions = ext;
    }

    pub fn set_alt_extensions(&mut self, ext: Vec<String>) {
        self.alt_extensions = ext;
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn set_outputs(&mut self, out: Vec<String>) {
        self.outputs = out;
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn set_output_prefix(&mut self, p: impl Into<String>) {
        self.output_prefix = p.into();
    }

    /// Output filenames produced when this tool consumes `input`.
    pub fn outputs_for(&self, input: &str) -> Vec<String> {
        self.outputs
            .iter()
            .map(|ext| format!("{}{}", self.output_prefix, text::replace_extension(input, ext)))
            .collect()
    }

    pub fn set_input_tools(&mut self, tags: Vec<String>) {
        self.input_tools = tags;
    }

    pub fn input_tools(&self) -> &[String] {
        &self.input_tools
    }

    pub fn set_command(&mut self, cmd: Vec<String>) {
        self.command = cmd;
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn set_pool(&mut self, p: impl Into<String>) {
        self.pool = Some(p.into());
    }

    pub fn pool(&self) -> Option<&str> {
        self.pool.as_deref()
    }

    pub fn set_implicit_deps(&mut self, d: ImplicitDeps) {
        self.implicit_deps = Some(d);
    }

    pub fn implicit_deps(&self) -> Option<&ImplicitDeps> {
        self.implicit_deps.as_ref()
    }

    pub fn set_flag_prefixes(&mut self, p: BTreeMap<String, String>) {
        self.flag_prefixes = p;
    }

    /// Flag prefix for a variable name, e.g. `-I` for `includes`.
    pub fn command_prefix(&self, varname: &str) -> Option<&str> {
        self.flag_prefixes.get(varname).map(String::as_str)
    }

    pub fn set_options(&mut self, options: BTreeMap<String, OptionSet>) {
        self.options = options;
    }

    pub fn set_option_group(&mut self, group: impl Into<String>, set: OptionSet) {
        self.options.insert(group.into(), set);
    }

    pub fn set_option_defaults(&mut self, defaults: BTreeMap<String, String>) {
        self.option_defaults = defaults;
    }

    pub fn has_option(&self, group: &str) -> bool {
        self.options.contains_key(group)
    }

    pub fn option_groups(&self) -> impl Iterator<Item = &String> {
        self.options.keys()
    }

    /// Token list for a specific choice of an option group.
    pub fn option_tokens(&self, group: &str, choice: &str) -> Option<&[String]> {
        self.options.get(group)?.get(choice).map(Vec::as_slice)
    }

    pub fn default_option(&self, group: &str) -> Option<&str> {
        self.option_defaults.get(group).map(String::as_str)
    }

    /// Add or replace one choice inside an existing option group.
    pub fn add_option(
        &mut self,
        group: &str,
        choice: impl Into<String>,
        cmd: Vec<String>,
    ) -> Result<()> {
        match self.options.get_mut(group) {
            Some(set) => {
                set.insert(choice.into(), cmd);
                Ok(())
            }
            None => Err(BuildError::Malformed(format!(
                "option '{}' does not exist in tool '{}'",
                group, self.name
            ))
            .into()),
        }
    }

    /// Select a specific language choice; refuses a second, different one.
    pub fn enable_language(&mut self, lang: &str) -> Result<()> {
        let Some(choices) = self.options.get("language") else {
            return Ok(());
        };
        if !choices.contains_key(lang) {
            return Ok(());
        }
        match &self.language {
            Some(cur) if cur.as_str() != lang => Err(BuildError::State(format!(
                "only one language per tool is supported: '{}' already enabled on '{}'",
                cur, self.name
            ))
            .into()),
            _ => {
                self.language = Some(lang.to_owned());
                Ok(())
            }
        }
    }

    /// The effective language: enabled choice, else the group default, else
    /// the first defined choice.
    pub fn language(&self) -> Option<&str> {
        if let Some(l) = &self.language {
            return Some(l);
        }
        if let Some(d) = self.option_defaults.get("language") {
            return Some(d);
        }
        self.options
            .get("language")
            .and_then(|set| set.keys().next())
            .map(String::as_str)
    }

    /// Whether this tool consumes files with the given extension.
    pub fn handles_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e == ext)
            || self.alt_extensions.iter().any(|e| e == ext)
    }

    /// Whether this tool accepts the output of *every* tag in `set`.
    pub fn handles_tools(&self, set: &BTreeSet<String>) -> bool {
        set.iter().all(|t| self.input_tools.iter().any(|i| i == t))
    }
}

/// Declarative tool description, the table argument of the `add_tool`
/// binding.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSpec {
    pub tag: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// resolved executable path
    #[serde(default)]
    pub exe: Option<String>,
    /// name of a project item that builds the executable
    #[serde(default)]
    pub exe_item: Option<String>,
    #[serde(default)]
    pub input_extensions: Vec<String>,
    #[serde(default)]
    pub alt_extensions: Vec<String>,
    #[serde(default)]
    pub output_extensions: Vec<String>,
    #[serde(default)]
    pub output_prefix: Option<String>,
    #[serde(default)]
    pub input_tools: Vec<String>,
    #[serde(default)]
    pub options: BTreeMap<String, OptionSet>,
    #[serde(default)]
    pub option_defaults: BTreeMap<String, String>,
    #[serde(default)]
    pub flag_prefixes: BTreeMap<String, String>,
    #[serde(default)]
    pub implicit_dependencies: Option<ImplicitDepsSpec>,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub cmd: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImplicitDepsSpec {
    pub file: String,
    #[serde(default = "default_dep_style")]
    pub style: String,
    #[serde(default)]
    pub cmd: Vec<String>,
}

fn default_dep_style() -> String {
    "gcc".to_owned()
}

impl Tool {
    /// Build a tool from its declarative description. `exe_item` has already
    /// been resolved by the binding layer when present.
    pub fn from_spec(spec: ToolSpec, exe_item: Option<ItemId>) -> Result<Tool> {
        let mut t = Tool::new(spec.tag, spec.name);
        if let Some(d) = spec.description {
            t.description = d;
        }
        t.exe = match (exe_item, spec.exe) {
            (Some(id), _) => ToolExe::Generated(id),
            (None, Some(path)) => ToolExe::Path(path),
            (None, None) => ToolExe::None,
        };
        t.extensions = spec.input_extensions;
        t.alt_extensions = spec.alt_extensions;
        t.outputs = spec.output_extensions;
        if let Some(p) = spec.output_prefix {
            t.output_prefix = p;
        }
        t.input_tools = spec.input_tools;
        t.options = spec.options;
        t.option_defaults = spec.option_defaults;
        t.flag_prefixes = spec.flag_prefixes;
        if let Some(id) = spec.implicit_dependencies {
            t.implicit_deps = Some(ImplicitDeps {
                file: id.file,
                style: id.style,
                flags: id.cmd,
            });
        }
        t.pool = spec.pool;
        t.command = spec.cmd;
        Ok(t)
    }
}

/// Owning arena for tools; everything else refers to tools by [`ToolId`].
#[derive(Debug, Default)]
pub struct ToolArena {
    tools: Vec<Tool>,
}

impl ToolArena {
    pub fn new() -> ToolArena {
        ToolArena::default()
    }

    pub fn add(&mut self, tool: Tool) -> ToolId {
        let id = ToolId(self.tools.len() as u32);
        self.tools.push(tool);
        id
    }

    pub fn get(&self, id: ToolId) -> &Tool {
        &self.tools[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ToolId) -> &mut Tool {
        &mut self.tools[id.0 as usize]
    }
}
