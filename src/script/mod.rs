//! The project-file binding surface and the `construct` loader that
//! drives it.

pub mod api;
pub mod loader;

pub use api::{BuildApi, CodeFilterSpec, CodeGenSpec, OptionalSpec};
pub use loader::{load_construct, load_project};
