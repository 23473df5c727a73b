//! Content pack discovery and batch loading.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Serialize;
use tracing::{error, info};

use foundry_core::catalog;
use foundry_core::config::FoundryConfig;
use foundry_core::descriptor::TypeRegistry;
use foundry_core::registry::Registry;

use crate::props;

/// Suffix module pack folders carry.
pub const PACK_SUFFIX: &str = ".pack";

/// Summary of one successfully loaded module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    /// Pack name on disk.
    pub name: String,
    /// Display name from the module definition.
    pub friendly_name: String,
    /// Content format version.
    pub version: u32,
    /// Presets defined by the module.
    pub presets: usize,
    /// Group tags recorded for the module.
    pub groups: Vec<String>,
}

/// Outcome of a full data directory load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// Modules that loaded, in load order.
    pub modules: Vec<ModuleReport>,
    /// Packs that failed to load and were skipped.
    pub failed: Vec<String>,
    /// Presets across all loaded modules.
    pub total_presets: usize,
}

impl LoadReport {
    /// Serializes the report as pretty JSON.
    pub fn to_json_string(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Finds the module packs under `data_dir`.
///
/// Returns pack folder names with the base module first and the rest in name
/// order. A data directory without the base module is an error.
pub fn scan_packs(data_dir: &Path, base_module: &str) -> anyhow::Result<Vec<String>> {
    let mut packs = Vec::new();
    let entries = fs::read_dir(data_dir)
        .with_context(|| format!("read data directory {}", data_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(PACK_SUFFIX) {
            packs.push(name);
        }
    }
    packs.sort();
    match packs
        .iter()
        .position(|name| name.eq_ignore_ascii_case(base_module))
    {
        Some(pos) => {
            let base = packs.remove(pos);
            packs.insert(0, base);
        }
        None => bail!(
            "base module \"{}\" not found in {}",
            base_module,
            data_dir.display()
        ),
    }
    Ok(packs)
}

/// Loads every pack in the configured data directory.
///
/// The base module must load; a failure there is fatal. Any other pack that
/// fails is logged, recorded in the report and skipped, and loading moves on
/// so one broken third-party pack cannot take the whole set down.
pub fn load_all(cfg: &FoundryConfig) -> anyhow::Result<(Registry, LoadReport)> {
    let mut types = TypeRegistry::new().with_refill_batch(cfg.pool_refill_batch);
    catalog::install(&mut types)?;
    props::install(&mut types)?;

    let data_dir = PathBuf::from(&cfg.data_dir);
    let packs = scan_packs(&data_dir, &cfg.base_module)?;
    let mut registry = Registry::new(types, data_dir);

    let mut report = LoadReport::default();
    for (position, pack) in packs.iter().enumerate() {
        match registry.load_module(pack) {
            Ok(id) => {
                if let Some(module) = registry.get_module(id) {
                    report.modules.push(ModuleReport {
                        name: module.file_name().to_string(),
                        friendly_name: module.friendly_name().to_string(),
                        version: module.version(),
                        presets: module.preset_count(),
                        groups: module.groups().to_vec(),
                    });
                }
            }
            Err(err) if position == 0 => {
                return Err(err).with_context(|| format!("load base module \"{}\"", pack));
            }
            Err(err) => {
                error!(module = %pack, "failed to load content module: {:#}", err);
                report.failed.push(pack.clone());
            }
        }
    }
    report.total_presets = report.modules.iter().map(|module| module.presets).sum();
    info!(
        modules = report.modules.len(),
        failed = report.failed.len(),
        presets = report.total_presets,
        "content loading finished"
    );
    Ok((registry, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_puts_the_base_module_first() {
        let dir = tempfile::tempdir().unwrap();
        for pack in ["Zebra.pack", "Base.pack", "Alpha.pack"] {
            fs::create_dir(dir.path().join(pack)).unwrap();
        }
        fs::create_dir(dir.path().join("notes")).unwrap();

        let packs = scan_packs(dir.path(), "Base.pack").unwrap();
        assert_eq!(packs, vec!["Base.pack", "Alpha.pack", "Zebra.pack"]);
    }

    #[test]
    fn scan_fails_without_the_base_module() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Alpha.pack")).unwrap();

        let err = scan_packs(dir.path(), "Base.pack").unwrap_err();
        assert!(err.to_string().contains("Base.pack"));
    }
}
