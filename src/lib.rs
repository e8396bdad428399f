//! slipway - a meta-build generator
//!
//! Resolves a tree of `construct` project files into a typed, acyclic build
//! graph and emits input for a downstream executor (Ninja or Make). It does
//! not run compilers itself; everything here happens before that.

pub mod core;
pub mod generator;
pub mod ops;
pub mod pkg;
pub mod script;
pub mod transform;
pub mod util;

pub use crate::core::{
    BuildError, Configuration, Context, DepKind, Item, ItemArena, ItemId, ItemKind, LibraryKind,
    Pool, Scope, ScopeId, Tool, ToolId, Toolset, ToolsetId,
};
pub use crate::script::BuildApi;
pub use crate::transform::{BuildId, BuildItem, TransformSet};
pub use crate::util::{DirStack, Directory};
