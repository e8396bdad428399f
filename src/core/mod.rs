//! The project object model: variables, tools, toolsets, pools, items,
//! scopes and configurations, tied together by a [`context::Context`].

pub mod configuration;
pub mod context;
pub mod defaults;
pub mod dependency;
pub mod error;
pub mod item;
pub mod pool;
pub mod scope;
pub mod tool;
pub mod toolset;
pub mod variable;

pub use configuration::{Configuration, ConfigurationSet};
pub use context::Context;
pub use dependency::DepKind;
pub use error::BuildError;
pub use item::{Item, ItemArena, ItemId, ItemKind, LibraryKind};
pub use pool::Pool;
pub use scope::{Scope, ScopeArena, ScopeId};
pub use tool::{Tool, ToolArena, ToolId};
pub use toolset::{Toolset, ToolsetArena, ToolsetId};
pub use variable::{Variable, VariableSet};
