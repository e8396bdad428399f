//! Ordered, list-valued build variables.

use std::collections::BTreeMap;

/// A named, ordered list of string values with rendering rules.
///
/// `inherit` splices a textual `${name}` reference at the head of the
/// rendering, so a generator can defer to an enclosing definition. A
/// per-system overlay appends extra values when rendering for that system.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Variable {
    name: String,
    values: Vec<String>,
    inherit: bool,
    tool_tag: Option<String>,
    system_overlays: BTreeMap<String, Vec<String>>,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Variable {
        Variable {
            name: name.into(),
            ..Variable::default()
        }
    }

    /// A variable seeded from the process environment value of the same
    /// name, when present and non-empty.
    pub fn from_env(name: impl Into<String>) -> Variable {
        let mut v = Variable::new(name);
        if let Ok(val) = std::env::var(&v.name) {
            if !val.is_empty() {
                v.values.push(val);
            }
        }
        v
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_inherit(&mut self, yes: bool) {
        self.inherit = yes;
    }

    pub fn inherit(&self) -> bool {
        self.inherit
    }

    /// Associate this variable with a tool tag; generators use this to pick
    /// the flag prefix of the right tool.
    pub fn set_tool_tag(&mut self, tag: impl Into<String>) {
        self.tool_tag = Some(tag.into());
    }

    pub fn tool_tag(&self) -> Option<&str> {
        self.tool_tag.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Append one value; empty strings are never stored.
    pub fn add(&mut self, v: impl Into<String>) {
        let v = v.into();
        if !v.is_empty() {
            self.values.push(v);
        }
    }

    pub fn add_many<I, S>(&mut self, vals: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for v in vals {
            self.add(v);
        }
    }

    /// Append, preserving order, skipping values already present.
    pub fn add_if_missing(&mut self, v: impl Into<String>) {
        let v = v.into();
        if !v.is_empty() && !self.values.contains(&v) {
            self.values.push(v);
        }
    }

    pub fn add_if_missing_many<I, S>(&mut self, vals: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for v in vals {
            self.add_if_missing(v);
        }
    }

    /// Replace the value list.
    pub fn reset<I, S>(&mut self, vals: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values.clear();
        self.add_many(vals);
    }

    /// Add values for one system only; they render after the common ones
    /// when that system is asked for.
    pub fn add_system(&mut self, system: impl Into<String>, v: impl Into<String>) {
        let v = v.into();
        if !v.is_empty() {
            self.system_overlays.entry(system.into()).or_default().push(v);
        }
    }

    /// Prepend `prefix` to every stored value that does not already carry
    /// it (values starting with `$` are left for later expansion).
    pub fn prepend_each(&mut self, prefix: &str) {
        for v in self.values.iter_mut() {
            if !v.starts_with('$') && !v.starts_with(prefix) {
                v.insert_str(0, prefix);
            }
        }
        for vals in self.system_overlays.values_mut() {
            for v in vals.iter_mut() {
                if !v.starts_with('$') && !v.starts_with(prefix) {
                    v.insert_str(0, prefix);
                }
            }
        }
    }

    /// Keep only the last occurrence of each duplicated value.
    pub fn remove_duplicates_keep_last(&mut self) {
        let mut out: Vec<String> = Vec::with_capacity(self.values.len());
        for (i, v) in self.values.iter().enumerate() {
            if !self.values[i + 1..].contains(v) {
                out.push(v.clone());
            }
        }
        self.values = out;
    }

    /// Append the other variable's values and overlays.
    pub fn merge(&mut self, other: &Variable) {
        for v in &other.values {
            self.add(v.clone());
        }
        for (sys, vals) in &other.system_overlays {
            for v in vals {
                self.add_system(sys.clone(), v.clone());
            }
        }
        self.inherit = self.inherit || other.inherit;
        if self.tool_tag.is_none() {
            self.tool_tag = other.tool_tag.clone();
        }
    }

    /// Space-joined rendering: the `${name}` head when inheriting, then the
    /// values, then the overlay for `system` when given.
    pub fn value(&self, system: Option<&str>) -> String {
        let mut out = String::new();
        if self.inherit {
            out.push_str("${");
            out.push_str(&self.name);
            out.push('}');
        }
        let overlay = system.and_then(|s| self.system_overlays.get(s));
        for v in self.values.iter().chain(overlay.into_iter().flatten()) {
            if v.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(v);
        }
        out
    }

    /// Like [`Variable::value`], with `prefix` prepended to every value that
    /// does not already start with it (or with `$`).
    pub fn prepended_value(&self, prefix: &str, system: Option<&str>) -> String {
        let mut out = String::new();
        if self.inherit {
            out.push_str("${");
            out.push_str(&self.name);
            out.push('}');
        }
        let overlay = system.and_then(|s| self.system_overlays.get(s));
        for v in self.values.iter().chain(overlay.into_iter().flatten()) {
            if v.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            if !v.starts_with('$') && !v.starts_with(prefix) {
                out.push_str(prefix);
            }
            out.push_str(v);
        }
        out
    }
}

/// Variables keyed by name; BTreeMap keeps output ordering stable.
pub type VariableSet = BTreeMap<String, Variable>;

/// Fetch-or-create a variable in a set.
pub fn entry<'a>(set: &'a mut VariableSet, name: &str) -> &'a mut Variable {
    set.entry(name.to_owned())
        .or_insert_with(|| Variable::new(name))
}

/// Overlay `other` onto `base`; same-named variables in `other` win.
pub fn overlay(base: &mut VariableSet, other: &VariableSet) {
    for (k, v) in other {
        base.insert(k.clone(), v.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_rendering_with_inherit() {
        let mut v = Variable::new("cflags");
        v.set_inherit(true);
        v.add("a");
        v.add("");
        v.add("b");
        assert_eq!(v.value(None), "${cflags} a b");
    }

    #[test]
    fn test_empty_values_never_stored() {
        let mut v = Variable::new("libs");
        v.add("");
        v.add_if_missing("");
        assert!(v.is_empty());
    }

    #[test]
    fn test_prepended_value() {
        let mut v = Variable::new("includes");
        v.add("/usr/include");
        v.add("-I/opt/include");
        v.add("$builddir");
        assert_eq!(
            v.prepended_value("-I", None),
            "-I/usr/include -I/opt/include $builddir"
        );
    }

    #[test]
    fn test_add_if_missing_preserves_order() {
        let mut v = Variable::new("libs");
        v.add("z");
        v.add_if_missing("a");
        v.add_if_missing("z");
        assert_eq!(v.values(), ["z", "a"]);
    }

    #[test]
    fn test_prepend_each() {
        let mut v = Variable::new("includes");
        v.add_many(["/usr/include", "-I/opt", "$builddir"]);
        v.prepend_each("-I");
        assert_eq!(v.values(), ["-I/usr/include", "-I/opt", "$builddir"]);
    }

    #[test]
    fn test_remove_duplicates_keep_last() {
        let mut v = Variable::new("libs");
        v.add_many(["a", "b", "a", "c", "b"]);
        v.remove_duplicates_keep_last();
        assert_eq!(v.values(), ["a", "c", "b"]);
    }

    #[test]
    fn test_system_overlay() {
        let mut v = Variable::new("defines");
        v.add("COMMON");
        v.add_system("Linux", "HAVE_EPOLL");
        assert_eq!(v.value(None), "COMMON");
        assert_eq!(v.value(Some("Linux")), "COMMON HAVE_EPOLL");
        assert_eq!(v.value(Some("Darwin")), "COMMON");
    }

    #[test]
    fn test_overlay_wins() {
        let mut base = VariableSet::new();
        entry(&mut base, "opt").add("base");
        let mut over = VariableSet::new();
        entry(&mut over, "opt").add("config");
        overlay(&mut base, &over);
        assert_eq!(base["opt"].value(None), "config");
    }

    #[test]
    fn test_env_seeding() {
        std::env::set_var("SLIPWAY_TEST_VAR_XYZ", "seeded");
        let v = Variable::from_env("SLIPWAY_TEST_VAR_XYZ");
        assert_eq!(v.values(), ["seeded"]);
        std::env::remove_var("SLIPWAY_TEST_VAR_XYZ");
        let v = Variable::from_env("SLIPWAY_TEST_VAR_XYZ");
        assert!(v.is_empty());
    }
}
