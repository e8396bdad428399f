//! The directory model.
//!
//! A [`Directory`] is an absolute, normalized path plus a "relative tail":
//! the segments accumulated by [`Directory::cd`] since construction. The
//! tail is what survives a [`Directory::reroot`], which is how source
//! directories are mapped into artifact directories.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{bail, Context as _, Result};

fn process_cwd() -> &'static Vec<String> {
    static CWD: OnceLock<Vec<String>> = OnceLock::new();
    CWD.get_or_init(|| {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        segments_of(&cwd.to_string_lossy())
    })
}

fn segments_of(path: &str) -> Vec<String> {
    path.split('/').filter(|s| !s.is_empty()).map(str::to_owned).collect()
}

/// An absolute directory path with a rerootable relative tail.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Directory {
    /// All path segments, root first. Never contains `.` or `..`.
    segments: Vec<String>,
    /// How many trailing entries of `segments` were added by `cd`.
    rel_len: usize,
}

impl Directory {
    /// The process working directory, captured once.
    pub fn current() -> Directory {
        Directory {
            segments: process_cwd().clone(),
            rel_len: 0,
        }
    }

    /// A directory rooted at an absolute path. Relative inputs are resolved
    /// against the captured process working directory.
    pub fn from_root(root: impl AsRef<str>) -> Directory {
        let root = root.as_ref();
        if root.starts_with('/') {
            Directory {
                segments: segments_of(root),
                rel_len: 0,
            }
        } else {
            let mut d = Directory::current();
            // a relative root still counts as root, not tail
            d.segments.extend(segments_of(root));
            d
        }
    }

    /// Descend into `name`, which may contain multiple `/`-separated
    /// segments. `.` segments are dropped and `..` pops.
    pub fn cd(&mut self, name: impl AsRef<str>) -> Result<()> {
        for seg in name.as_ref().split('/').filter(|s| !s.is_empty()) {
            match seg {
                "." => {}
                ".." => self.cd_up()?,
                _ => {
                    self.segments.push(seg.to_owned());
                    self.rel_len += 1;
                }
            }
        }
        Ok(())
    }

    /// Pop one segment. Fails when already at the filesystem root.
    pub fn cd_up(&mut self) -> Result<()> {
        if self.segments.pop().is_none() {
            bail!("attempt to change directories above root");
        }
        self.rel_len = self.rel_len.saturating_sub(1);
        Ok(())
    }

    /// Fold the relative tail into the root, so a later `reroot` keeps the
    /// full current path.
    pub fn promote_full(&mut self) {
        self.rel_len = 0;
    }

    /// The same relative tail attached under a different root.
    pub fn reroot(&self, new_root: &Directory) -> Directory {
        let mut out = new_root.clone();
        for seg in &self.segments[self.segments.len() - self.rel_len..] {
            out.segments.push(seg.clone());
            out.rel_len += 1;
        }
        out
    }

    /// Absolute path as a string; never contains `.` or `..`.
    pub fn fullpath(&self) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            out.push('/');
            out.push_str(seg);
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }

    /// Only the segments accumulated by `cd`.
    pub fn relpath(&self) -> String {
        self.segments[self.segments.len() - self.rel_len..].join("/")
    }

    /// Last path segment.
    pub fn basename(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Create this directory and any missing parents. An existing directory
    /// is not an error.
    pub fn mkpath(&self) -> Result<()> {
        let p = self.fullpath();
        fs::create_dir_all(&p).with_context(|| format!("unable to create directory '{p}'"))
    }

    /// Whether `name` exists inside this directory.
    pub fn exists(&self, name: impl AsRef<str>) -> bool {
        Path::new(&self.makefilename(name)).exists()
    }

    /// First of `names` that exists here, as a full path.
    pub fn find(&self, names: &[String]) -> Option<String> {
        names.iter().map(|n| self.makefilename(n)).find(|p| Path::new(p).exists())
    }

    /// Full path for a file in this directory.
    pub fn makefilename(&self, name: impl AsRef<str>) -> String {
        let name = name.as_ref();
        if name.starts_with('/') {
            return name.to_owned();
        }
        let mut p = self.fullpath();
        if p != "/" {
            p.push('/');
        }
        p.push_str(name);
        p
    }

    /// Relative-tail path for a file in this directory.
    pub fn relfilename(&self, name: impl AsRef<str>) -> String {
        let rel = self.relpath();
        if rel.is_empty() {
            name.as_ref().to_owned()
        } else {
            format!("{}/{}", rel, name.as_ref())
        }
    }

    /// Path of `name` in this directory, expressed relative to `other`.
    pub fn relative_to(&self, other: &Directory, name: &str) -> String {
        let here = PathBuf::from(self.makefilename(name));
        let base = PathBuf::from(other.fullpath());
        pathdiff::diff_paths(&here, &base)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| here.to_string_lossy().into_owned())
    }

    /// Write `lines` to `name` only when the current content differs;
    /// returns whether a write happened. Parents are created as needed.
    pub fn update_if_different(&self, name: &str, lines: &[String]) -> Result<bool> {
        let path = self.makefilename(name);
        let mut fresh = String::new();
        for l in lines {
            fresh.push_str(l);
            fresh.push('\n');
        }
        if let Ok(existing) = fs::read_to_string(&path) {
            if existing == fresh {
                return Ok(false);
            }
        }
        self.mkpath()?;
        let mut f = fs::File::create(&path)
            .with_context(|| format!("unable to open '{path}' for write"))?;
        f.write_all(fresh.as_bytes())
            .with_context(|| format!("unable to write '{path}'"))?;
        Ok(true)
    }
}

/// A push/pop stack of directories, giving project-file execution a current
/// directory notion independent of the OS working directory.
#[derive(Debug)]
pub struct DirStack {
    stack: Vec<Directory>,
    /// every directory ever visited, for generator regen dependencies
    visited: Vec<String>,
}

impl DirStack {
    pub fn new(root: Directory) -> DirStack {
        let visited = vec![root.fullpath()];
        DirStack {
            stack: vec![root],
            visited,
        }
    }

    pub fn current(&self) -> &Directory {
        self.stack.last().expect("directory stack can never be empty")
    }

    pub fn pushd(&mut self, subdir: &str) -> Result<&Directory> {
        let mut d = self.current().clone();
        d.cd(subdir)?;
        self.visited.push(d.fullpath());
        self.stack.push(d);
        Ok(self.current())
    }

    pub fn popd(&mut self) -> Result<()> {
        if self.stack.len() <= 1 {
            bail!("unbalanced directory stack -- too many pops for pushes");
        }
        self.stack.pop();
        Ok(())
    }

    pub fn visited(&self) -> &[String] {
        &self.visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cd_normalizes() {
        let mut d = Directory::from_root("/a/b");
        d.cd("c/./d/../e").unwrap();
        assert_eq!(d.fullpath(), "/a/b/c/e");
        assert_eq!(d.relpath(), "c/e");
    }

    #[test]
    fn test_cd_up_below_root_fails() {
        let mut d = Directory::from_root("/");
        assert!(d.cd_up().is_err());
    }

    #[test]
    fn test_reroot_keeps_tail() {
        let mut src = Directory::from_root("/src/proj");
        src.cd("lib/net").unwrap();
        let out = src.reroot(&Directory::from_root("/build/debug"));
        assert_eq!(out.fullpath(), "/build/debug/lib/net");
        assert_eq!(out.relpath(), "lib/net");
    }

    #[test]
    fn test_promote_full_clears_tail() {
        let mut d = Directory::from_root("/src");
        d.cd("sub").unwrap();
        d.promote_full();
        let out = d.reroot(&Directory::from_root("/dst"));
        assert_eq!(out.fullpath(), "/dst");
    }

    #[test]
    fn test_update_if_different_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let d = Directory::from_root(tmp.path().to_string_lossy());
        let lines = vec!["one".to_owned(), "two".to_owned()];
        assert!(d.update_if_different("out.txt", &lines).unwrap());
        assert!(!d.update_if_different("out.txt", &lines).unwrap());
        let changed = vec!["one".to_owned()];
        assert!(d.update_if_different("out.txt", &changed).unwrap());
    }

    #[test]
    fn test_dir_stack_balanced() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        let mut st = DirStack::new(Directory::from_root(tmp.path().to_string_lossy()));
        st.pushd("sub").unwrap();
        assert!(st.current().fullpath().ends_with("/sub"));
        st.popd().unwrap();
        assert!(st.popd().is_err());
    }
}
