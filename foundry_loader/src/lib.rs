//! `foundry_loader`
//!
//! Builds a content registry from the module packs in a data directory:
//! - Pack discovery, base module first and the rest in name order
//! - Batch loading with per-pack failure reporting
//! - Demo prop types that exercise the preset machinery end to end

pub mod loader;
pub mod props;

pub use loader::{load_all, scan_packs, LoadReport, ModuleReport};
