//! The threaded process state.
//!
//! The directory stack, the active-scope stack, the configuration list,
//! the package registry, and the object arenas all live in one [`Context`]
//! value passed through the call graph; there are no process-wide
//! singletons to reset between runs.

use anyhow::Result;

use crate::core::configuration::ConfigurationSet;
use crate::core::item::{ItemArena, ItemId};
use crate::core::scope::{ScopeArena, ScopeId};
use crate::core::tool::ToolArena;
use crate::core::toolset::ToolsetArena;
use crate::pkg::set::PackageRegistry;
use crate::util::paths::{DirStack, Directory};
use crate::util::platform::{ExeSearch, SystemInfo};

#[derive(Debug)]
pub struct Context {
    pub dirs: DirStack,
    pub items: ItemArena,
    pub tools: ToolArena,
    pub toolsets: ToolsetArena,
    pub scopes: ScopeArena,
    pub configs: ConfigurationSet,
    pub packages: PackageRegistry,
    pub sysinfo: SystemInfo,
    pub exe_search: ExeSearch,
    /// path of the running generator, for self-hosted tools
    pub self_exe: String,
}

impl Context {
    /// A context rooted at `root` with the default toolsets registered on
    /// the root scope.
    pub fn new(root: Directory) -> Result<Context> {
        let mut ctx = Context::bare(root);
        crate::core::defaults::register(&mut ctx)?;
        Ok(ctx)
    }

    /// A context without default tool probing; project files (and tests)
    /// must register every tool themselves.
    pub fn bare(root: Directory) -> Context {
        let self_exe = std::env::current_exe()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "slipway".to_owned());
        Context {
            dirs: DirStack::new(root),
            items: ItemArena::new(),
            tools: ToolArena::new(),
            toolsets: ToolsetArena::new(),
            scopes: ScopeArena::new(),
            configs: ConfigurationSet::new(),
            packages: PackageRegistry::new(),
            sysinfo: SystemInfo::probe(),
            exe_search: ExeSearch::new(),
            self_exe,
        }
    }

    /// The scope declarations attach to right now. While configurations are
    /// being defined (and no default has been named yet), that is the newest
    /// configuration's pseudo-scope rather than the top of the scope stack.
    pub fn current_scope(&self) -> ScopeId {
        if self.configs.have_any() && !self.configs.have_default() {
            if let Ok(last) = self.configs.last() {
                return last.pseudo_scope();
            }
        }
        self.scopes.current()
    }

    pub fn host_system(&self) -> &str {
        &self.sysinfo.system
    }

    /// Resolve a package for `system`, splitting the registry/arena borrow.
    pub fn find_package(
        &mut self,
        system: &str,
        name: &str,
        req_version: &str,
        lib_path: &[String],
        pkg_path: &[String],
    ) -> Result<Option<ItemId>> {
        let host = self.sysinfo.system.clone();
        let set = self.packages.get_mut(system, &host);
        if lib_path.is_empty() && pkg_path.is_empty() {
            set.find(&mut self.items, name, req_version)
        } else {
            set.find_with_paths(&mut self.items, name, req_version, lib_path, pkg_path)
        }
    }
}
