//! Package resolution.
//!
//! A [`PackageSet`] resolves library names to project items: first through a
//! lazily-built index of `.pc` files on the pkg-config search path, then
//! through a filesystem probe for plain libraries using system-specific
//! filename patterns. Resolved packages become [`ItemKind::Package`] items;
//! their `Requires` chains are expanded recursively into EXPLICIT edges.

use std::collections::{BTreeMap, HashMap};
use std::fs;

use anyhow::Result;

use crate::core::dependency::DepKind;
use crate::core::error::BuildError;
use crate::core::item::{ItemArena, ItemId, ItemKind};
use crate::pkg::config::PcFile;
use crate::pkg::version::{self, VersionOp};
use crate::util::paths::Directory;
use crate::util::text;

/// Library-directory defaults that never get an explicit `-L`.
const SYSTEM_LIB_DIRS: &[&str] = &["/lib", "/usr/lib", "/usr/local/lib"];

/// Per-target-system package resolver with memoized results.
#[derive(Debug)]
pub struct PackageSet {
    system: String,
    pkg_search_path: Vec<String>,
    lib_search_path: Vec<String>,
    /// package name -> `.pc` path, built on first query
    index: BTreeMap<String, String>,
    indexed: bool,
    /// package name -> resolved item, independent of version predicates
    resolved: HashMap<String, ItemId>,
}

impl PackageSet {
    /// A resolver for `system`. Environment seeding (`PKG_CONFIG_PATH`,
    /// `PKG_CONFIG_LIBDIR`) and default paths only apply when the target is
    /// the host system.
    pub fn new(system: impl Into<String>, host: &str) -> PackageSet {
        let system = system.into();
        let mut set = PackageSet {
            system,
            pkg_search_path: Vec::new(),
            lib_search_path: Vec::new(),
            index: BTreeMap::new(),
            indexed: false,
            resolved: HashMap::new(),
        };
        if set.system == host {
            if let Ok(p) = std::env::var("PKG_CONFIG_PATH") {
                set.add_pkg_path(&p);
            }
            match std::env::var("PKG_CONFIG_LIBDIR") {
                Ok(p) => set.add_pkg_path(&p),
                Err(_) => {
                    set.pkg_search_path.push("/usr/lib/pkgconfig".to_owned());
                    set.pkg_search_path.push("/usr/local/lib/pkgconfig".to_owned());
                }
            }
            if set.system == "Darwin" {
                set.lib_search_path.push("/System/Library/Frameworks".to_owned());
                set.lib_search_path.push("/Library/Frameworks".to_owned());
            }
            if set.system != "Windows" {
                for d in SYSTEM_LIB_DIRS {
                    set.lib_search_path.push((*d).to_owned());
                }
            }
        }
        set
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn add_pkg_path(&mut self, p: &str) {
        text::split_append(&mut self.pkg_search_path, p, ':');
    }

    pub fn set_pkg_path(&mut self, p: &str) {
        self.pkg_search_path.clear();
        self.indexed = false;
        self.index.clear();
        self.add_pkg_path(p);
    }

    pub fn add_lib_path(&mut self, p: &str) {
        text::split_append(&mut self.lib_search_path, p, ':');
    }

    pub fn set_lib_path(&mut self, p: &str) {
        self.lib_search_path.clear();
        self.add_lib_path(p);
    }

    /// Resolve `name` against a textual version spec like `">= 2.0"`.
    pub fn find(
        &mut self,
        items: &mut ItemArena,
        name: &str,
        req_version: &str,
    ) -> Result<Option<ItemId>> {
        if req_version.trim().is_empty() {
            return self.find_op(items, name, VersionOp::Any, "");
        }
        let (op, ver) = version::parse_predicate(req_version)?;
        self.find_op(items, name, op, &ver)
    }

    /// The short-lived override form: resolve with substitute search paths,
    /// restoring paths and the `.pc` index afterwards.
    pub fn find_with_paths(
        &mut self,
        items: &mut ItemArena,
        name: &str,
        req_version: &str,
        lib_path: &[String],
        pkg_path: &[String],
    ) -> Result<Option<ItemId>> {
        let saved_lib = if lib_path.is_empty() {
            None
        } else {
            Some(std::mem::replace(&mut self.lib_search_path, lib_path.to_vec()))
        };
        let saved_pkg = if pkg_path.is_empty() {
            None
        } else {
            self.indexed = false;
            Some((
                std::mem::replace(&mut self.pkg_search_path, pkg_path.to_vec()),
                std::mem::take(&mut self.index),
                std::mem::take(&mut self.resolved),
            ))
        };

        let ret = self.find(items, name, req_version);

        if let Some(lib) = saved_lib {
            self.lib_search_path = lib;
        }
        if let Some((pkg, index, resolved)) = saved_pkg {
            self.pkg_search_path = pkg;
            self.index = index;
            self.resolved = resolved;
            self.indexed = false;
        }
        ret
    }

    /// Resolve `name`, then apply the version predicate; a found package
    /// failing the predicate resolves to `None` with a warning.
    pub fn find_op(
        &mut self,
        items: &mut ItemArena,
        name: &str,
        op: VersionOp,
        req_version: &str,
    ) -> Result<Option<ItemId>> {
        self.init_index();

        let cached = self.resolved.get(name).copied();
        let found = match cached {
            Some(id) => Some(id),
            None => {
                let created = match self.index.get(name).cloned() {
                    Some(path) => {
                        tracing::debug!("using pkg-config information for {name}");
                        Some(self.load_pc(items, name, &path)?)
                    }
                    None => {
                        tracing::debug!("searching in OS path for library {name}");
                        self.probe_library(items, name)?
                    }
                };
                if let Some(id) = created {
                    self.resolved.insert(name.to_owned(), id);
                }
                created
            }
        };

        let Some(id) = found else {
            return Ok(None);
        };

        let found_version = items
            .get(id)
            .variable("version")
            .map(|v| v.value(None))
            .unwrap_or_default();
        if !op.matches(&found_version, req_version) {
            tracing::warn!(
                "found package '{}', version {} but failed version check against requested '{} {}'",
                name,
                found_version,
                op.as_str(),
                req_version
            );
            return Ok(None);
        }
        Ok(Some(id))
    }

    fn init_index(&mut self) {
        if self.indexed {
            return;
        }
        self.indexed = true;
        for dir in &self.pkg_search_path {
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            let mut names: Vec<String> = entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|n| n.ends_with(".pc"))
                .collect();
            names.sort();
            for file in names {
                let name = file.trim_end_matches(".pc").to_owned();
                // an earlier directory on the path wins
                self.index
                    .entry(name)
                    .or_insert_with(|| format!("{}/{}", dir.trim_end_matches('/'), file));
            }
        }
    }

    /// Parse a `.pc` file into a package item, promoting tags and local
    /// variables, then expand its `Requires` chain.
    fn load_pc(&mut self, items: &mut ItemArena, name: &str, path: &str) -> Result<ItemId> {
        let pc = PcFile::parse_file(path)?;
        let dir = Directory::current();
        let id = items.add(
            name,
            dir,
            ItemKind::Package {
                pc_file: Some(path.to_owned()),
                values: pc.values.clone(),
            },
        )?;
        {
            let item = items.get_mut(id);
            for (k, v) in &pc.locals {
                item.set_variable(k, v, false);
            }
            item.set_variable("version", pc.version(), false);
            item.set_variable("cflags", pc.cflags(), true);
            item.set_variable("libs", pc.libs(), true);
            item.set_variable("libs.static", pc.static_libs(), true);
        }
        let requires = pc.requires().to_owned();
        self.extract_modules(items, id, &requires, true)?;
        Ok(id)
    }

    /// Probe the library search path with system-specific filename
    /// patterns, synthesizing a package reference on a hit.
    fn probe_library(&self, items: &mut ItemArena, name: &str) -> Result<Option<ItemId>> {
        let stripped = name.strip_suffix("lib").map(str::to_owned);
        let attempts: Vec<(String, Vec<&str>)> = match self.system.as_str() {
            "Darwin" => {
                let mut v = vec![
                    (name.to_owned(), vec![".framework"]),
                    (format!("lib{name}"), vec![".dylib", ".a"]),
                ];
                if let Some(alt) = &stripped {
                    v.push((format!("lib{alt}"), vec![".dylib", ".a"]));
                }
                v
            }
            "Windows" => {
                let mut v = vec![
                    (name.to_owned(), vec![".lib", ".a"]),
                    (format!("lib{name}"), vec![".dll.a", ".a"]),
                ];
                if let Some(alt) = &stripped {
                    v.push((alt.clone(), vec![".lib", ".a"]));
                }
                v
            }
            _ => {
                let mut v = vec![(format!("lib{name}"), vec![".so", ".a"])];
                if let Some(alt) = &stripped {
                    v.push((format!("lib{alt}"), vec![".so", ".a"]));
                }
                v
            }
        };

        for (stem, exts) in attempts {
            for dir in &self.lib_search_path {
                for ext in &exts {
                    let candidate = format!("{}/{}{}", dir.trim_end_matches('/'), stem, ext);
                    if std::path::Path::new(&candidate).exists() {
                        return Ok(Some(self.make_library_reference(items, name, &candidate)?));
                    }
                }
            }
        }
        Ok(None)
    }

    /// A package item for a plain (non pkg-config) library hit.
    fn make_library_reference(
        &self,
        items: &mut ItemArena,
        name: &str,
        path: &str,
    ) -> Result<ItemId> {
        tracing::debug!("creating external library reference for '{name}' at {path}");
        let id = items.add(
            name,
            Directory::current(),
            ItemKind::Package {
                pc_file: None,
                values: BTreeMap::new(),
            },
        )?;

        if self.system == "Darwin" && path.contains(".framework") {
            // single tokens so repeated-value compression cannot split them
            let item = items.get_mut(id);
            item.variable_mut("cflags").add(format!("-F {name}"));
            item.variable_mut("ldflags").add(format!("-framework {name}"));
            return Ok(id);
        }

        let mut dir = Directory::from_root(path);
        dir.cd_up()?;
        let basepath = dir.fullpath();

        let item = items.get_mut(id);
        item.variable_mut("ldflags").add(format!("-l{name}"));

        if !SYSTEM_LIB_DIRS.contains(&basepath.as_str()) {
            let libdirs = item.variable_mut("libdirs");
            libdirs.set_tool_tag("ld");
            libdirs.add(basepath);

            dir.cd_up()?;
            if dir.exists("include") {
                dir.cd("include")?;
                let includes = item.variable_mut("includes");
                includes.set_tool_tag("cc");
                includes.add(dir.fullpath());
            }
        }
        Ok(id)
    }

    /// Tokenize a `Requires` value and resolve each module, adding EXPLICIT
    /// edges onto `pkg`. Grammar: `name [op version]`, with commas and/or
    /// whitespace separating modules.
    pub fn extract_modules(
        &mut self,
        items: &mut ItemArena,
        pkg: ItemId,
        val: &str,
        required: bool,
    ) -> Result<()> {
        for spec in tokenize_modules(val)? {
            let found = match &spec.predicate {
                Some((op, ver)) => self.find_op(items, &spec.name, *op, ver)?,
                None => self.find_op(items, &spec.name, VersionOp::Any, "")?,
            };
            match found {
                Some(dep) => items.add_dependency(pkg, DepKind::Explicit, dep)?,
                None if required => {
                    let predicate = spec
                        .predicate
                        .as_ref()
                        .map(|(op, v)| format!("{} {}", op.as_str(), v))
                        .unwrap_or_default();
                    return Err(BuildError::PackageNotFound {
                        name: spec.name,
                        predicate,
                    }
                    .into());
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// One parsed module requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    pub name: String,
    pub predicate: Option<(VersionOp, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Looking,
    InName,
    LookingOp,
    InOp,
    LookingVer,
    InVersion,
}

/// The Requires tokenizer: a state machine over
/// LOOKING -> IN_NAME -> LOOKING_OP -> IN_OP -> LOOKING_VER -> IN_VERSION,
/// falling back to LOOKING on separators.
pub fn tokenize_modules(val: &str) -> Result<Vec<ModuleSpec>> {
    let mut out = Vec::new();
    let bytes = val.as_bytes();
    let n = bytes.len();

    let mut state = ParseState::Looking;
    let mut name = (0usize, 0usize);
    let mut op = (usize::MAX, usize::MAX);
    let mut ver = (usize::MAX, usize::MAX);

    let is_op_char = |c: u8| matches!(c, b'<' | b'>' | b'=' | b'!');
    let is_sep = |c: u8| c == b',' || c.is_ascii_whitespace();

    let mut p = 0usize;
    while p <= n {
        let last = p == n;
        let c = if last { b' ' } else { bytes[p] };
        let prev_state = state;
        match state {
            ParseState::Looking => {
                if !last && !is_sep(c) {
                    name = (p, p);
                    op = (usize::MAX, usize::MAX);
                    ver = (usize::MAX, usize::MAX);
                    state = ParseState::InName;
                }
            }
            ParseState::InName => {
                if last {
                    name.1 = p;
                    state = ParseState::Looking;
                } else if is_sep(c) {
                    name.1 = p;
                    state = if c == b',' {
                        ParseState::Looking
                    } else {
                        ParseState::LookingOp
                    };
                }
            }
            ParseState::LookingOp => {
                if is_op_char(c) {
                    op.0 = p;
                    state = ParseState::InOp;
                } else if c == b',' || last {
                    state = ParseState::Looking;
                } else if !c.is_ascii_whitespace() {
                    // next module begins; reprocess this byte
                    state = ParseState::Looking;
                    close_spec(&mut out, val, name, op, ver)?;
                    continue;
                }
            }
            ParseState::InOp => {
                if last {
                    op.1 = p;
                    state = ParseState::Looking;
                } else if !is_op_char(c) {
                    op.1 = p;
                    state = ParseState::LookingVer;
                }
            }
            ParseState::LookingVer => {
                if !last && !c.is_ascii_whitespace() {
                    ver.0 = p;
                    state = ParseState::InVersion;
                } else if last {
                    state = ParseState::Looking;
                }
            }
            ParseState::InVersion => {
                if is_sep(c) {
                    ver.1 = p;
                    state = ParseState::Looking;
                }
            }
        }

        if state == ParseState::Looking && prev_state != ParseState::Looking {
            close_spec(&mut out, val, name, op, ver)?;
        }
        p += 1;
    }

    Ok(out)
}

fn close_spec(
    out: &mut Vec<ModuleSpec>,
    val: &str,
    name: (usize, usize),
    op: (usize, usize),
    ver: (usize, usize),
) -> Result<()> {
    let name_str = val[name.0..name.1].to_owned();
    if name_str.is_empty() {
        return Err(BuildError::Parse(format!(
            "malformed package module specification in '{val}'"
        ))
        .into());
    }
    let predicate = if op.0 != usize::MAX {
        if ver.0 == usize::MAX || ver.1 == usize::MAX {
            return Err(BuildError::Parse(format!(
                "malformed module version check in '{val}': operator without version"
            ))
            .into());
        }
        let op_str = &val[op.0..op.1];
        Some((VersionOp::parse(op_str)?, val[ver.0..ver.1].to_owned()))
    } else {
        None
    };
    out.push(ModuleSpec {
        name: name_str,
        predicate,
    });
    Ok(())
}

/// Per-target-system registry of package sets.
#[derive(Debug, Default)]
pub struct PackageRegistry {
    sets: HashMap<String, PackageSet>,
}

impl PackageRegistry {
    pub fn new() -> PackageRegistry {
        PackageRegistry::default()
    }

    pub fn get_mut(&mut self, system: &str, host: &str) -> &mut PackageSet {
        self.sets
            .entry(system.to_owned())
            .or_insert_with(|| PackageSet::new(system, host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn write_pc(dir: &std::path::Path, name: &str, content: &str) {
        let mut f = fs::File::create(dir.join(format!("{name}.pc"))).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    fn test_set(pkg_dir: &std::path::Path) -> PackageSet {
        // a system name that never matches the host avoids env seeding
        let mut set = PackageSet::new("TestOS", "Linux");
        set.set_pkg_path(&pkg_dir.to_string_lossy());
        set
    }

    #[test]
    fn test_tokenize_modules() {
        let mods = tokenize_modules("glib-2.0 >= 2.40, gtk+-3.0 zlib != 1.2.8").unwrap();
        assert_eq!(mods.len(), 3);
        assert_eq!(mods[0].name, "glib-2.0");
        assert_eq!(
            mods[0].predicate,
            Some((VersionOp::GreaterEqual, "2.40".to_owned()))
        );
        assert_eq!(mods[1].name, "gtk+-3.0");
        assert_eq!(mods[1].predicate, None);
        assert_eq!(
            mods[2].predicate,
            Some((VersionOp::NotEqual, "1.2.8".to_owned()))
        );
    }

    #[test]
    fn test_tokenize_commas_and_spaces_interchangeable() {
        let a = tokenize_modules("a,b c").unwrap();
        assert_eq!(
            a.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert!(tokenize_modules("").unwrap().is_empty());
    }

    #[test]
    fn test_tokenize_bad_operator() {
        assert!(tokenize_modules("foo >== 1.0").is_err());
    }

    #[test]
    fn test_find_parses_and_promotes_variables() {
        let tmp = TempDir::new().unwrap();
        write_pc(
            tmp.path(),
            "foo",
            "prefix=/opt/foo\nName: foo\nVersion: 1.2.3\nLibs: -L${prefix}/lib -lfoo\nCflags: -I${prefix}/include\n",
        );
        let mut set = test_set(tmp.path());
        let mut items = ItemArena::new();
        let id = set.find(&mut items, "foo", "").unwrap().unwrap();
        let item = items.get(id);
        assert_eq!(item.variable("version").unwrap().value(None), "1.2.3");
        assert_eq!(
            item.variable("libs").unwrap().values(),
            ["-L/opt/foo/lib", "-lfoo"]
        );
        // memoized: same item back
        let again = set.find(&mut items, "foo", ">= 1.0").unwrap().unwrap();
        assert_eq!(again, id);
    }

    #[test]
    fn test_version_predicate_gates_result() {
        let tmp = TempDir::new().unwrap();
        write_pc(tmp.path(), "foo", "Name: foo\nVersion: 1.2\n");
        let mut set = test_set(tmp.path());
        let mut items = ItemArena::new();
        assert!(set.find(&mut items, "foo", ">= 2.0").unwrap().is_none());
        assert!(set.find(&mut items, "foo", ">= 1.0").unwrap().is_some());
        assert!(set.find(&mut items, "foo", "!= 1.2").unwrap().is_none());
    }

    #[test]
    fn test_requires_expansion_adds_explicit_edges() {
        let tmp = TempDir::new().unwrap();
        write_pc(tmp.path(), "bar", "Name: bar\nVersion: 2.1\n");
        write_pc(
            tmp.path(),
            "foo",
            "Name: foo\nVersion: 1.0\nRequires: bar >= 2.0\n",
        );
        let mut set = test_set(tmp.path());
        let mut items = ItemArena::new();
        let foo = set.find(&mut items, "foo", "").unwrap().unwrap();
        let bar = items.find_by_name("bar").unwrap();
        assert_eq!(items.get(foo).deps()[&bar], DepKind::Explicit);
    }

    #[test]
    fn test_requires_version_failure_is_an_error() {
        let tmp = TempDir::new().unwrap();
        write_pc(tmp.path(), "bar", "Name: bar\nVersion: 1.9\n");
        write_pc(
            tmp.path(),
            "foo",
            "Name: foo\nVersion: 1.0\nRequires: bar >= 2.0\n",
        );
        let mut set = test_set(tmp.path());
        let mut items = ItemArena::new();
        let err = set.find(&mut items, "foo", "").unwrap_err();
        assert!(err.to_string().contains("bar"));
        assert!(err.to_string().contains(">= 2.0"));
    }

    #[test]
    fn test_fallback_probe_linux() {
        let tmp = TempDir::new().unwrap();
        let libdir = tmp.path().join("deps/lib");
        fs::create_dir_all(&libdir).unwrap();
        fs::create_dir_all(tmp.path().join("deps/include")).unwrap();
        fs::write(libdir.join("libz.so"), b"").unwrap();

        let mut set = PackageSet::new("Linux", "NotLinux");
        set.set_lib_path(&libdir.to_string_lossy());
        let mut items = ItemArena::new();
        let id = set.find(&mut items, "z", "").unwrap().unwrap();
        let item = items.get(id);
        assert_eq!(item.variable("ldflags").unwrap().values(), ["-lz"]);
        assert_eq!(
            item.variable("libdirs").unwrap().values(),
            [libdir.to_string_lossy().to_string()]
        );
        let includes = item.variable("includes").unwrap();
        assert!(includes.values()[0].ends_with("/deps/include"));
    }

    #[test]
    fn test_probe_miss_returns_none() {
        let tmp = TempDir::new().unwrap();
        let mut set = PackageSet::new("Linux", "NotLinux");
        set.set_lib_path(&tmp.path().to_string_lossy());
        let mut items = ItemArena::new();
        assert!(set.find(&mut items, "nosuchlib", "").unwrap().is_none());
    }

    #[test]
    fn test_find_with_paths_restores_state() {
        let tmp_a = TempDir::new().unwrap();
        let tmp_b = TempDir::new().unwrap();
        write_pc(tmp_a.path(), "foo", "Name: foo\nVersion: 1.0\n");
        write_pc(tmp_b.path(), "baz", "Name: baz\nVersion: 3.0\n");

        let mut set = test_set(tmp_a.path());
        let mut items = ItemArena::new();
        assert!(set.find(&mut items, "foo", "").unwrap().is_some());

        let override_path = vec![tmp_b.path().to_string_lossy().into_owned()];
        let baz = set
            .find_with_paths(&mut items, "baz", "", &[], &override_path)
            .unwrap();
        assert!(baz.is_some());

        // original index is back: foo resolves, baz no longer does
        assert!(set.find(&mut items, "foo", "").unwrap().is_some());
        assert!(set.find(&mut items, "baz", "").unwrap().is_none());
    }
}
