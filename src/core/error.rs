//! Structured error kinds surfaced to project authors.
//!
//! Anything that can fail from a project description maps onto one of these
//! variants; I/O and parse failures picked up along the way are wrapped with
//! `anyhow` context at the call site.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    /// Adding a dependency edge would close a cycle.
    #[error("attempt to create a circular dependency between '{from}' and '{to}'")]
    Cycle { from: String, to: String },

    /// Two targets/configurations/pools/toolsets with the same name.
    #[error("duplicate {kind} definition '{name}'")]
    Duplicate { kind: &'static str, name: String },

    /// A named source file that does not exist in its directory.
    #[error("file '{name}' does not exist in directory '{dir}'")]
    MissingSource { name: String, dir: String },

    /// No tool resolves for a required extension or tag set.
    #[error("{0}")]
    NoTool(String),

    /// A required external library could not be resolved.
    #[error("unable to find required package '{name}' (version requirement: '{predicate}') - \
             please ensure it is installed or the package search path is set appropriately")]
    PackageNotFound { name: String, predicate: String },

    /// A named-only dependency that no registered item claims.
    #[error("item '{0}' has unresolved dependencies")]
    UnresolvedDependency(String),

    /// Out-of-order or missing driver state.
    #[error("{0}")]
    State(String),

    /// Malformed project file input.
    #[error("{0}")]
    Malformed(String),

    /// Malformed pkg-config or version syntax.
    #[error("{0}")]
    Parse(String),
}
