//! `foundry_core`
//!
//! Preset and content-module registry for data-driven games.
//!
//! Design goals:
//! - Explicit registries instead of global state.
//! - Deterministic module load order and collision handling.
//! - Pooled preset instances behind owning guards.
//! - No `unsafe`.

pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod module;
pub mod pool;
pub mod preset;
pub mod reader;
pub mod registry;
pub mod stream;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::descriptor::*;
    pub use crate::module::*;
    pub use crate::preset::*;
    pub use crate::reader::*;
    pub use crate::registry::*;
    pub use crate::stream::*;
}
