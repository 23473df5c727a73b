//! Standalone content loader binary.
//!
//! Usage:
//!   cargo run -p foundry_loader -- [--data-dir Data] [--base-module Base.pack] [--config cfg.json] [--report report.json]
//!
//! Loads every module pack under the data directory, prints a summary, and
//! optionally writes a JSON load report.

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use foundry_core::config::FoundryConfig;
use foundry_loader::load_all;
use tracing::info;

fn parse_args() -> anyhow::Result<(FoundryConfig, Option<PathBuf>)> {
    let mut cfg = FoundryConfig::default();
    let mut report_path = None;
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                let text = fs::read_to_string(&args[i + 1])
                    .with_context(|| format!("read config file {}", args[i + 1]))?;
                cfg = FoundryConfig::from_json_str(&text)
                    .with_context(|| format!("parse config file {}", args[i + 1]))?;
                i += 2;
            }
            "--data-dir" if i + 1 < args.len() => {
                cfg.data_dir = args[i + 1].clone();
                i += 2;
            }
            "--base-module" if i + 1 < args.len() => {
                cfg.base_module = args[i + 1].clone();
                i += 2;
            }
            "--report" if i + 1 < args.len() => {
                report_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok((cfg, report_path))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let (cfg, report_path) = parse_args()?;
    info!(data_dir = %cfg.data_dir, base_module = %cfg.base_module, "Loading content packs");

    let (registry, report) = load_all(&cfg)?;

    for module in registry.modules() {
        info!(
            module = %module.file_name(),
            version = module.version(),
            presets = module.preset_count(),
            "module ready"
        );
    }

    println!(
        "Loaded {} modules with {} presets ({} packs failed).",
        report.modules.len(),
        report.total_presets,
        report.failed.len()
    );

    if let Some(path) = report_path {
        fs::write(&path, report.to_json_string()?)
            .with_context(|| format!("write report {}", path.display()))?;
        info!(path = %path.display(), "Wrote load report");
    }
    Ok(())
}
