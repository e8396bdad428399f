//! Generator back-ends: serialize a resolved transform tree for a
//! downstream executor.

pub mod compile_db;
pub mod embed;
pub mod make;
pub mod ninja;
pub mod rule;

use anyhow::Result;

use crate::core::context::Context;
use crate::transform::set::TransformSet;
use crate::util::paths::Directory;

/// Which executor file format to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Ninja,
    Make,
}

impl Backend {
    pub fn parse(s: &str) -> Option<Backend> {
        match s {
            "ninja" => Some(Backend::Ninja),
            "make" => Some(Backend::Make),
            _ => None,
        }
    }

    /// Emit the executor input files for one transform tree into `dest`.
    pub fn emit(
        &self,
        ctx: &Context,
        xform: &TransformSet,
        dest: &Directory,
        regen_args: &[String],
    ) -> Result<()> {
        match self {
            Backend::Ninja => ninja::NinjaGenerator::new().emit(ctx, xform, dest, regen_args),
            Backend::Make => make::MakeGenerator::new().emit(ctx, xform, dest, regen_args),
        }
    }
}

pub use embed::{emit_code, EmbedSpec};
