//! Package resolution: pkg-config files, requires graphs, version
//! predicates, and the plain-library fallback probe.

pub mod config;
pub mod set;
pub mod version;

pub use config::PcFile;
pub use set::{PackageRegistry, PackageSet};
pub use version::VersionOp;
