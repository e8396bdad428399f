//! pkg-config file parsing.
//!
//! Byte-compatible with classic `.pc` files for the recognized tags: logical
//! lines with `\` continuation, `#` comments (`\#` is a literal hash),
//! `Tag: value` entries and `var = value` local variables, with `${var}`
//! substitution applied to values as they are read.

use std::collections::BTreeMap;
use std::fs;

use anyhow::{Context as _, Result};

use crate::util::text;

/// Recognized `Tag:` names. Anything else is kept but noted at debug level.
const KNOWN_TAGS: &[&str] = &[
    "Name",
    "Description",
    "URL",
    "Version",
    "Cflags",
    "CFlags",
    "Libs",
    "Libs.private",
    "Requires",
    "Requires.private",
    "Conflicts",
];

/// Parsed content of one pkg-config file.
#[derive(Debug, Clone, Default)]
pub struct PcFile {
    pub path: String,
    /// `Tag: value` entries; `Cflags` is normalized to `CFlags`
    pub values: BTreeMap<String, String>,
    /// `var = value` local variables
    pub locals: BTreeMap<String, String>,
}

impl PcFile {
    pub fn parse_file(path: &str) -> Result<PcFile> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("unable to read package config file '{path}'"))?;
        let mut pc = PcFile::parse_str(&content);
        pc.path = path.to_owned();
        Ok(pc)
    }

    pub fn parse_str(content: &str) -> PcFile {
        let mut pc = PcFile::default();
        let mut logical = String::new();
        for raw in content.lines() {
            let mut line = strip_comment(raw);
            let continued = line.ends_with('\\');
            if continued {
                line.pop();
            }
            logical.push_str(&line);
            if continued {
                continue;
            }
            let finished = std::mem::take(&mut logical);
            let finished = finished.trim();
            if !finished.is_empty() {
                pc.take_line(finished);
            }
        }
        let trailing = logical.trim();
        if !trailing.is_empty() {
            let trailing = trailing.to_owned();
            pc.take_line(&trailing);
        }
        pc
    }

    fn take_line(&mut self, line: &str) {
        // name runs over alphanumerics plus `_` and `.`
        let name_end = line
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(line.len());
        if name_end == 0 || name_end == line.len() {
            return;
        }
        let name = &line[..name_end];
        let rest = line[name_end..].trim_start();
        let Some(sep) = rest.chars().next() else {
            return;
        };
        let value = rest[sep.len_utf8()..].trim();
        let value = text::substitute_variables(value, true, |n| self.locals.get(n).cloned());

        match sep {
            ':' => {
                let name = if name == "Cflags" { "CFlags" } else { name };
                if self.values.contains_key(name) {
                    tracing::warn!(
                        "package config file '{}' has multiple entries for tag '{}'",
                        self.path,
                        name
                    );
                    return;
                }
                if !KNOWN_TAGS.contains(&name) {
                    tracing::debug!("ignoring unknown package config tag '{name}'");
                }
                self.values.insert(name.to_owned(), value);
            }
            '=' => {
                if self.locals.contains_key(name) {
                    tracing::warn!(
                        "package config file '{}' has multiple entries for variable '{}'",
                        self.path,
                        name
                    );
                    return;
                }
                self.locals.insert(name.to_owned(), value);
            }
            _ => {
                tracing::warn!(
                    "package config file '{}': unrecognized separator on line '{}'",
                    self.path,
                    line
                );
            }
        }
    }

    fn tag(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn package(&self) -> &str {
        self.tag("Name")
    }

    pub fn version(&self) -> &str {
        self.tag("Version")
    }

    pub fn description(&self) -> &str {
        self.tag("Description")
    }

    pub fn url(&self) -> &str {
        self.tag("URL")
    }

    pub fn cflags(&self) -> &str {
        self.tag("CFlags")
    }

    pub fn libs(&self) -> &str {
        self.tag("Libs")
    }

    pub fn static_libs(&self) -> &str {
        self.tag("Libs.private")
    }

    pub fn requires(&self) -> &str {
        self.tag("Requires")
    }

    pub fn static_requires(&self) -> &str {
        self.tag("Requires.private")
    }

    pub fn conflicts(&self) -> &str {
        self.tag("Conflicts")
    }
}

/// Drop a `#` comment, honoring the `\#` literal escape.
fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'#') {
            chars.next();
            out.push('#');
            continue;
        }
        if c == '#' {
            break;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
prefix=/opt/foo
libdir=${prefix}/lib
includedir=${prefix}/include

Name: foo
Description: a test package \\# with a literal hash
Version: 1.2.3
Requires: bar >= 2.0
Libs: -L${libdir} -lfoo
Cflags: -I${includedir}
";

    #[test]
    fn test_parse_tags_and_substitution() {
        let pc = PcFile::parse_str(SAMPLE);
        assert_eq!(pc.package(), "foo");
        assert_eq!(pc.version(), "1.2.3");
        assert_eq!(pc.libs(), "-L/opt/foo/lib -lfoo");
        assert_eq!(pc.cflags(), "-I/opt/foo/include");
        assert_eq!(pc.requires(), "bar >= 2.0");
        assert_eq!(pc.description(), "a test package # with a literal hash");
    }

    #[test]
    fn test_line_continuation() {
        let pc = PcFile::parse_str("Libs: -L/a \\\n  -lz\nName: z\n");
        assert_eq!(pc.libs(), "-L/a   -lz");
        assert_eq!(pc.package(), "z");
    }

    #[test]
    fn test_comments_stripped() {
        let pc = PcFile::parse_str("# whole line\nName: x # trailing\n");
        assert_eq!(pc.package(), "x");
    }

    #[test]
    fn test_duplicate_tag_keeps_first() {
        let pc = PcFile::parse_str("Version: 1.0\nVersion: 2.0\n");
        assert_eq!(pc.version(), "1.0");
    }

    #[test]
    fn test_cflags_spelling_normalized() {
        let a = PcFile::parse_str("CFlags: -DX\n");
        let b = PcFile::parse_str("Cflags: -DX\n");
        assert_eq!(a.cflags(), "-DX");
        assert_eq!(b.cflags(), "-DX");
    }

    #[test]
    fn test_round_trip_of_recognized_tags() {
        let pc = PcFile::parse_str(SAMPLE);
        for tag in ["Name", "Version", "Libs", "CFlags", "Requires"] {
            assert!(pc.values.contains_key(tag), "missing tag {tag}");
        }
    }
}
