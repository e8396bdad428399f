//! Job pools.
//!
//! A pool caps how many jobs of a heavyweight rule an executor may run at
//! once (ninja's `pool` concept; emulated with serialized recipes for make).

/// A named concurrency-limit token referenced from rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    name: String,
    max_jobs: u32,
}

impl Pool {
    pub fn new(name: impl Into<String>, max_jobs: u32) -> Pool {
        Pool {
            name: name.into(),
            max_jobs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_jobs(&self) -> u32 {
        self.max_jobs
    }
}
