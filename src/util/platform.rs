//! Host system probing and executable lookup.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// uname-shaped description of the host, captured once per [`SystemInfo`].
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub system: String,
    pub node: String,
    pub release: String,
    pub version: String,
    pub machine: String,
    pub is_64bit: bool,
}

impl SystemInfo {
    pub fn probe() -> SystemInfo {
        let system = match std::env::consts::OS {
            "linux" => "Linux",
            "macos" => "Darwin",
            "windows" => "Windows",
            other => other,
        }
        .to_owned();
        let machine = match std::env::consts::ARCH {
            "x86_64" => "x86_64",
            "aarch64" => "arm64",
            other => other,
        }
        .to_owned();
        SystemInfo {
            system,
            node: read_proc("/proc/sys/kernel/hostname"),
            release: read_proc("/proc/sys/kernel/osrelease"),
            version: read_proc("/proc/sys/kernel/version"),
            machine,
            is_64bit: cfg!(target_pointer_width = "64"),
        }
    }
}

fn read_proc(path: &str) -> String {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_owned())
        .unwrap_or_default()
}

/// Executable search over `PATH`, with an optional override path used by the
/// `file.set_exe_path` binding.
#[derive(Debug, Default)]
pub struct ExeSearch {
    override_path: Option<Vec<String>>,
}

impl ExeSearch {
    pub fn new() -> ExeSearch {
        ExeSearch::default()
    }

    pub fn set_path(&mut self, dirs: Vec<String>) {
        self.override_path = Some(dirs);
    }

    /// Locate one executable; `None` when it is not on the search path.
    pub fn find(&self, name: &str) -> Option<PathBuf> {
        match &self.override_path {
            Some(dirs) => {
                let joined = dirs.join(":");
                which::which_in(name, Some(joined), std::env::current_dir().ok()?).ok()
            }
            None => which::which(name).ok(),
        }
    }

    /// Locate several executables; absent ones are simply not in the map.
    pub fn find_all(&self, names: &[&str]) -> BTreeMap<String, PathBuf> {
        let mut out = BTreeMap::new();
        for n in names {
            if let Some(p) = self.find(n) {
                out.insert((*n).to_owned(), p);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_shape() {
        let info = SystemInfo::probe();
        assert!(!info.system.is_empty());
        assert!(!info.machine.is_empty());
    }

    #[test]
    fn test_find_sh() {
        // /bin/sh is a safe bet on any unix test host
        let search = ExeSearch::new();
        assert!(search.find("sh").is_some());
        assert!(search.find("definitely-not-a-real-tool-xyz").is_none());
    }

    #[test]
    fn test_override_path() {
        let mut search = ExeSearch::new();
        search.set_path(vec!["/nonexistent-dir".to_owned()]);
        assert!(search.find("sh").is_none());
    }
}
