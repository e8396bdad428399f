//! Build configurations.
//!
//! A configuration is a named set of variable/option/toolset overrides held
//! in a private pseudo-scope and overlaid onto the real scope tree at
//! transform time.

use anyhow::Result;

use crate::core::error::BuildError;
use crate::core::scope::ScopeId;

#[derive(Debug)]
pub struct Configuration {
    name: String,
    /// target system override; the host system when absent
    system: Option<String>,
    /// overlay scope populated while the configuration is being defined
    pseudo_scope: ScopeId,
    /// let the driver continue with other configurations when this one
    /// fails to transform
    skip_on_error: bool,
}

impl Configuration {
    pub fn new(name: impl Into<String>, pseudo_scope: ScopeId) -> Result<Configuration> {
        let name = name.into();
        if name.is_empty() {
            return Err(BuildError::State(
                "build configuration definition requires a name".into(),
            )
            .into());
        }
        Ok(Configuration {
            name,
            system: None,
            pseudo_scope,
            skip_on_error: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pseudo_scope(&self) -> ScopeId {
        self.pseudo_scope
    }

    /// The effective target system, falling back to the host.
    pub fn system<'a>(&'a self, host: &'a str) -> &'a str {
        self.system.as_deref().unwrap_or(host)
    }

    pub fn set_system(&mut self, s: impl Into<String>) {
        self.system = Some(s.into());
    }

    pub fn skip_on_error(&self) -> bool {
        self.skip_on_error
    }

    pub fn set_skip_on_error(&mut self, b: bool) {
        self.skip_on_error = b;
    }
}

/// The set of configurations defined by the project, plus default gating.
#[derive(Debug, Default)]
pub struct ConfigurationSet {
    configs: Vec<Configuration>,
    default_name: Option<String>,
    /// nonzero while a configuration block is being created, so attachment
    /// redirection stays off during definition
    creating: u32,
}

impl ConfigurationSet {
    pub fn new() -> ConfigurationSet {
        <ConfigurationSet as Default>::default()
    }

    pub fn add(&mut self, conf: Configuration) -> Result<()> {
        if self.configs.iter().any(|c| c.name() == conf.name()) {
            return Err(BuildError::Duplicate {
                kind: "configuration",
                name: conf.name().to_owned(),
            }
            .into());
        }
        self.configs.push(conf);
        Ok(())
    }

    pub fn all(&self) -> &[Configuration] {
        &self.configs
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Configuration> {
        self.configs.iter_mut().find(|c| c.name() == name)
    }

    /// Any configurations defined (and not mid-definition)? Drives the
    /// current-scope redirection onto the newest pseudo-scope.
    pub fn have_any(&self) -> bool {
        self.creating == 0 && !self.configs.is_empty()
    }

    pub fn have_default(&self) -> bool {
        self.default_name.is_some()
    }

    pub fn set_default(&mut self, name: impl Into<String>) {
        self.default_name = Some(name.into());
    }

    /// The default configuration; the first one when no default was named.
    pub fn default(&self) -> Result<&Configuration> {
        if self.configs.is_empty() {
            return Err(BuildError::State(
                "no configurations specified, please define at least one".into(),
            )
            .into());
        }
        match &self.default_name {
            None => Ok(&self.configs[0]),
            Some(name) => self
                .configs
                .iter()
                .find(|c| c.name() == *name)
                .ok_or_else(|| {
                    BuildError::State(format!("configuration '{name}' not found")).into()
                }),
        }
    }

    /// Targets may only be declared once the default configuration is known.
    pub fn check_default(&self) -> Result<()> {
        if !self.configs.is_empty() && !self.have_default() {
            return Err(BuildError::State(
                "must specify default_configuration prior to specifying targets or recursing tree"
                    .into(),
            )
            .into());
        }
        Ok(())
    }

    pub fn last_mut(&mut self) -> Result<&mut Configuration> {
        self.configs.last_mut().ok_or_else(|| {
            BuildError::State("no configurations have been defined yet".into()).into()
        })
    }

    pub fn last(&self) -> Result<&Configuration> {
        self.configs.last().ok_or_else(|| {
            BuildError::State("no configurations have been defined yet".into()).into()
        })
    }

    pub fn begin_creating(&mut self) {
        self.creating += 1;
    }

    pub fn finish_creating(&mut self) {
        self.creating = self.creating.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_rejected() {
        let mut set = ConfigurationSet::new();
        set.add(Configuration::new("debug", ScopeId(1)).unwrap()).unwrap();
        let err = set
            .add(Configuration::new("debug", ScopeId(2)).unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("duplicate configuration"));
    }

    #[test]
    fn test_default_resolution() {
        let mut set = ConfigurationSet::new();
        assert!(set.default().is_err());
        set.add(Configuration::new("debug", ScopeId(1)).unwrap()).unwrap();
        set.add(Configuration::new("release", ScopeId(2)).unwrap()).unwrap();
        assert_eq!(set.default().unwrap().name(), "debug");
        set.set_default("release");
        assert_eq!(set.default().unwrap().name(), "release");
        set.set_default("nope");
        assert!(set.default().is_err());
    }

    #[test]
    fn test_check_default_gating() {
        let mut set = ConfigurationSet::new();
        set.check_default().unwrap();
        set.add(Configuration::new("debug", ScopeId(1)).unwrap()).unwrap();
        assert!(set.check_default().is_err());
        set.set_default("debug");
        set.check_default().unwrap();
    }

    #[test]
    fn test_creating_gate_suppresses_have_any() {
        let mut set = ConfigurationSet::new();
        set.begin_creating();
        set.add(Configuration::new("debug", ScopeId(1)).unwrap()).unwrap();
        assert!(!set.have_any());
        set.finish_creating();
        assert!(set.have_any());
    }

    #[test]
    fn test_system_fallback() {
        let conf = Configuration::new("debug", ScopeId(1)).unwrap();
        assert_eq!(conf.system("Linux"), "Linux");
        let mut conf = conf;
        conf.set_system("Darwin");
        assert_eq!(conf.system("Linux"), "Darwin");
    }
}
